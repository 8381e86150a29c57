//! Output formatting for slicectl

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use slice_core::{SliceMask, SlicePolicy};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Compact text format
    Text,
}

/// Trait for types that can be formatted for output
pub trait Formattable {
    /// Format as a table row
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Format as key-value pairs for detailed view
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

/// Output formatter
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format and print a single item
    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
            OutputFormat::Yaml => println!("{}", serde_yaml::to_string(item)?),
            OutputFormat::Table => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key.bold().cyan(), value);
                }
            }
            OutputFormat::Text => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key, value);
                }
            }
        }
        Ok(())
    }

    /// Format and print a list of items
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        if items.is_empty() {
            match self.format {
                OutputFormat::Json | OutputFormat::Yaml => println!("[]"),
                OutputFormat::Table | OutputFormat::Text => {
                    println!("{}", "Nothing to show".dimmed());
                }
            }
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Yaml => println!("{}", serde_yaml::to_string(items)?),
            OutputFormat::Table => println!("{}", render_table(items)),
            OutputFormat::Text => {
                for item in items {
                    println!("{}", item.table_row().join(" "));
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn print_success(&self, message: &str) -> Result<()> {
        self.print_status("success", message, |m| {
            println!("{} {}", "✓".green().bold(), m.green())
        })
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) -> Result<()> {
        self.print_status("warning", message, |m| {
            eprintln!("{} {}", "⚠".yellow().bold(), m.yellow())
        })
    }

    /// Print an info message
    pub fn print_info(&self, message: &str) -> Result<()> {
        self.print_status("info", message, |m| {
            println!("{} {}", "ℹ".blue().bold(), m.blue())
        })
    }

    fn print_status(&self, status: &str, message: &str, human: impl Fn(&str)) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "status": status,
                    "message": message
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Yaml => {
                println!("status: {}", status);
                println!("message: {}", message);
            }
            OutputFormat::Table | OutputFormat::Text => human(message),
        }
        Ok(())
    }
}

fn render_table<T: Formattable>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = T::table_headers()
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for item in items {
        table.add_row(item.table_row());
    }

    table
}

/// Claimed units as compact runs, e.g. `0-11,14`
pub fn format_runs(mask: &SliceMask) -> String {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for idx in mask.indices() {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == idx => *end = idx,
            _ => runs.push((idx, idx)),
        }
    }

    if runs.is_empty() {
        return "-".to_string();
    }

    runs.iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Helper function to colorize a policy name
pub fn colorize_policy(policy: Option<SlicePolicy>) -> ColoredString {
    match policy {
        Some(SlicePolicy::RoundRobin) => "round-robin".normal(),
        Some(SlicePolicy::Waterfilling) => "waterfilling".green(),
        Some(SlicePolicy::Proportional) => "proportional".yellow(),
        None => "unset".dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestItem {
        name: String,
        value: i32,
    }

    impl Formattable for TestItem {
        fn table_headers() -> Vec<String> {
            vec!["Name".to_string(), "Value".to_string()]
        }

        fn table_row(&self) -> Vec<String> {
            vec![self.name.clone(), self.value.to_string()]
        }

        fn key_value_pairs(&self) -> Vec<(String, String)> {
            vec![
                ("Name".to_string(), self.name.clone()),
                ("Value".to_string(), self.value.to_string()),
            ]
        }
    }

    #[test]
    fn test_output_format_enum() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        assert_eq!(formatter.format, OutputFormat::Json);
    }

    #[test]
    fn test_render_table() {
        let items = vec![TestItem {
            name: "slice-0".to_string(),
            value: 12,
        }];
        let rendered = render_table(&items).to_string();
        assert!(rendered.contains("slice-0"));
        assert!(rendered.contains("12"));
    }

    #[test]
    fn test_format_runs() {
        let mask: SliceMask = "1111000011010".parse().unwrap();
        assert_eq!(format_runs(&mask), "0-3,8-9,11");
        assert_eq!(format_runs(&SliceMask::new(5)), "-");
    }
}
