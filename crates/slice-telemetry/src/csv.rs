//! Per-user CSV metrics files
//!
//! The radio stack appends one row per reporting interval to
//! `<user_id>_metrics.csv`. Only the trailing window of each file is read.

use crate::window::{MetricsSource, MetricsWindow, UserRecord};
use crate::{Result, TelemetryConfig, TelemetryError, SLICE_ID_COLUMN, TIMESTAMP_COLUMN};
use slice_core::SliceId;
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, warn};

const FILE_SUFFIX: &str = "_metrics.csv";

/// Reads the metrics window from a directory of per-user CSV files
#[derive(Debug, Clone)]
pub struct CsvMetricsSource {
    config: TelemetryConfig,
}

impl CsvMetricsSource {
    pub fn new(config: TelemetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// User ids with a metrics file, sorted
    pub fn user_ids(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.config.dir).map_err(|e| {
            TelemetryError::Unavailable(format!("{}: {}", self.config.dir.display(), e))
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = user_id_from_file_name(name, self.config.min_user_id_len) {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Read the window of one user. `None` when the file is gone or has no
    /// data rows.
    pub fn read_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let path = self.config.dir.join(format!("{}{}", user_id, FILE_SUFFIX));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        parse_window(user_id, &contents, self.config.window_rows())
            .map_err(|e| TelemetryError::Malformed(format!("{}: {}", path.display(), e)))
    }
}

impl MetricsSource for CsvMetricsSource {
    fn collect(&mut self) -> Result<MetricsWindow> {
        let mut users = Vec::new();

        for user_id in self.user_ids()? {
            match self.read_user(&user_id) {
                Ok(Some(record)) => users.push(record),
                Ok(None) => debug!(user = %user_id, "No metrics rows for user"),
                Err(e) => warn!(user = %user_id, error = %e, "Skipping user metrics"),
            }
        }

        debug!(users = users.len(), "Collected metrics window");
        Ok(MetricsWindow::new(users))
    }
}

/// Extract the user id from a metrics file name. Dotfiles, non-metrics files
/// and temporary identifiers shorter than `min_len` yield `None`.
fn user_id_from_file_name(name: &str, min_len: usize) -> Option<&str> {
    if name.starts_with('.') {
        return None;
    }
    let id = name.strip_suffix(FILE_SUFFIX)?;
    (id.len() >= min_len).then_some(id)
}

fn parse_window(user_id: &str, contents: &str, rows: usize) -> std::result::Result<Option<UserRecord>, String> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let Some(header) = lines.next() else {
        return Ok(None);
    };
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let slice_col = columns
        .iter()
        .position(|c| *c == SLICE_ID_COLUMN)
        .ok_or_else(|| format!("missing '{}' column", SLICE_ID_COLUMN))?;

    let data: Vec<&str> = lines.collect();
    let window = &data[data.len().saturating_sub(rows)..];
    let Some(first) = window.first() else {
        return Ok(None);
    };

    let slice_cell = first.split(',').nth(slice_col).map(str::trim).unwrap_or("");
    let slice = parse_slice_id(slice_cell).ok_or_else(|| format!("invalid slice id '{}'", slice_cell))?;

    let mut record = UserRecord::new(user_id, slice);
    for row in window {
        for (idx, cell) in row.split(',').enumerate() {
            let Some(name) = columns.get(idx) else {
                break;
            };
            if name.is_empty() || idx == slice_col || *name == TIMESTAMP_COLUMN {
                continue;
            }
            // non-numeric cells carry no sample
            if let Ok(value) = cell.trim().parse::<f64>() {
                if value.is_finite() {
                    record.push(name, value);
                }
            }
        }
    }

    Ok(Some(record))
}

fn parse_slice_id(cell: &str) -> Option<SliceId> {
    if let Ok(id) = cell.parse::<SliceId>() {
        return Some(id);
    }
    // pandas-style writers emit "1.0"
    let value = cell.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as SliceId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DL_BUFFER_BYTES, DL_THROUGHPUT_MBPS};
    use tempfile::TempDir;

    const HEADER: &str = "Timestamp,num_ues,IMSI,slice_id,dl_buffer [bytes],tx_brate downlink [Mbps],";

    fn source(dir: &TempDir, window_seconds: u64, rows_per_second: u64) -> CsvMetricsSource {
        CsvMetricsSource::new(TelemetryConfig {
            dir: dir.path().to_path_buf(),
            window_seconds,
            rows_per_second,
            min_user_id_len: 10,
        })
        .unwrap()
    }

    fn write_user(dir: &TempDir, user: &str, rows: &[&str]) {
        let mut contents = format!("{}\n", HEADER);
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        fs::write(dir.path().join(format!("{}_metrics.csv", user)), contents).unwrap();
    }

    #[test]
    fn test_file_name_filtering() {
        assert_eq!(user_id_from_file_name("1010123456002_metrics.csv", 10), Some("1010123456002"));
        assert_eq!(user_id_from_file_name("70_metrics.csv", 10), None);
        assert_eq!(user_id_from_file_name(".1010123456002_metrics.csv", 10), None);
        assert_eq!(user_id_from_file_name("1010123456002_metrics.txt", 10), None);
        assert_eq!(user_id_from_file_name("user_db.csv", 10), None);
    }

    #[test]
    fn test_reads_trailing_window() {
        let dir = TempDir::new().unwrap();
        write_user(
            &dir,
            "1010123456002",
            &[
                "1,1,1010123456002,1,9000,9.0,",
                "2,1,1010123456002,0,1000,0.5,",
                "3,1,1010123456002,0,3000,1.5,",
            ],
        );

        let record = source(&dir, 1, 2).read_user("1010123456002").unwrap().unwrap();
        // slice from the first row of the window, not of the file
        assert_eq!(record.slice, 0);
        assert_eq!(record.mean(DL_BUFFER_BYTES), Some(2000.0));
        assert_eq!(record.mean(DL_THROUGHPUT_MBPS), Some(1.0));
        assert!(!record.samples.contains_key(TIMESTAMP_COLUMN));
        assert!(!record.samples.contains_key(SLICE_ID_COLUMN));
    }

    #[test]
    fn test_non_numeric_cells_are_ignored() {
        let dir = TempDir::new().unwrap();
        write_user(
            &dir,
            "1010123456003",
            &["1,1,1010123456003,1.0,n/a,0.25,", "2,1,1010123456003,1.0,500,,"],
        );

        let record = source(&dir, 10, 4).read_user("1010123456003").unwrap().unwrap();
        assert_eq!(record.slice, 1);
        assert_eq!(record.mean(DL_BUFFER_BYTES), Some(500.0));
        assert_eq!(record.mean(DL_THROUGHPUT_MBPS), Some(0.25));
    }

    #[test]
    fn test_header_only_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        write_user(&dir, "1010123456004", &[]);
        let source = source(&dir, 10, 4);

        assert!(source.read_user("1010123456004").unwrap().is_none());
        assert!(source.read_user("1010123456999").unwrap().is_none());
    }

    #[test]
    fn test_missing_slice_column_is_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1010123456005_metrics.csv"), "Timestamp,dl_buffer [bytes]\n1,100\n").unwrap();

        let err = source(&dir, 10, 4).read_user("1010123456005").unwrap_err();
        assert!(matches!(err, TelemetryError::Malformed(_)));
    }

    #[test]
    fn test_collect_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        write_user(&dir, "1010123456002", &["1,1,1010123456002,0,2500,1.0,"]);
        write_user(&dir, "1010123456003", &["1,1,1010123456003,0,2500,1.0,"]);
        write_user(&dir, "70", &["1,1,70,1,100,1.0,"]);
        fs::write(dir.path().join("1010123456005_metrics.csv"), "Timestamp\n1\n").unwrap();

        let window = source(&dir, 10, 4).collect().unwrap();
        let ids: Vec<_> = window.users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["1010123456002", "1010123456003"]);

        let snapshot = window.aggregate();
        assert_eq!(snapshot[&0].user_count, 2);
        assert_eq!(snapshot[&0].average(DL_BUFFER_BYTES), Some(2500.0));
        assert!(!snapshot.contains_key(&1));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut source = CsvMetricsSource::new(TelemetryConfig {
            dir: dir.path().join("absent"),
            ..Default::default()
        })
        .unwrap();

        let err = source.collect().unwrap_err();
        assert!(matches!(err, TelemetryError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}
