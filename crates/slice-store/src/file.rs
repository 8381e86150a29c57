//! File-backed slice store
//!
//! Record formats, as read by the radio stack:
//! - mask record: a single line of `0`/`1` characters, one per unit
//! - policy record: one `slice::code` line per slice, `#` starts a comment
//!
//! Every write goes to a temporary file in the record directory which is then
//! renamed over the record, so readers never observe a torn file.

use crate::StoreStats;
use slice_core::{
    Error, ErrorContext, ResourcePool, Result, SliceConfig, SliceId, SliceMask, SlicePolicies,
    SlicePolicy, SliceStore, StoreConfig,
};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

const POLICY_SEPARATOR: &str = "::";

/// Disk-based storage implementation
#[derive(Debug)]
pub struct FileStore {
    config: StoreConfig,
    pool: ResourcePool,
    tenants: usize,
    stats: StoreStats,
}

impl FileStore {
    pub fn new(config: StoreConfig, pool: ResourcePool, tenants: usize) -> Self {
        Self {
            config,
            pool,
            tenants,
            stats: StoreStats::default(),
        }
    }

    pub fn from_config(config: &SliceConfig) -> Self {
        Self::new(config.store.clone(), config.pool, config.tenants)
    }

    /// Create the record directory if it does not exist
    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.config.dir).with_context_fn(|| {
            format!("Failed to create record directory {}", self.config.dir.display())
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.clone()
    }

    fn write_record(&mut self, path: &Path, contents: &str) -> Result<()> {
        match write_atomic(path, contents) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.failed_writes += 1;
                Err(e)
            }
        }
    }
}

impl SliceStore for FileStore {
    fn read_mask(&self, slice: SliceId) -> Result<SliceMask> {
        let path = self.config.mask_path(slice);
        let Some(contents) = read_optional(&path)? else {
            debug!(slice, path = %path.display(), "No mask record, slice is unassigned");
            return Ok(self.pool.empty_mask());
        };

        let line = contents.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(self.pool.empty_mask());
        }

        let mask: SliceMask = line
            .parse()
            .map_err(|e| Error::invalid_mask(format!("{}: {}", path.display(), e)))?;

        if mask.width() != self.pool.size {
            warn!(
                slice,
                found = mask.width(),
                expected = self.pool.size,
                "Mask record width does not match the pool, resizing"
            );
            return Ok(mask.resized(self.pool.size));
        }

        Ok(mask)
    }

    fn mask_exists(&self, slice: SliceId) -> Result<bool> {
        Ok(self.config.mask_path(slice).is_file())
    }

    fn write_mask(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()> {
        let path = self.config.mask_path(slice);
        self.write_record(&path, &format!("{}\n", mask))?;
        self.stats.mask_writes += 1;
        debug!(slice, mask = %mask, path = %path.display(), "Mask record written");
        Ok(())
    }

    fn read_policies(&self) -> Result<SlicePolicies> {
        let path = self.config.policy_path();
        let Some(contents) = read_optional(&path)? else {
            debug!(path = %path.display(), "No policy record, using round-robin");
            return Ok(SlicePolicies::uniform(self.tenants, SlicePolicy::RoundRobin));
        };

        let mut policies = SlicePolicies::new();
        for (lineno, line) in contents.lines().enumerate() {
            if let Some((slice, policy)) = parse_policy_line(line)
                .map_err(|e| Error::invalid_policy(format!("{}:{}: {}", path.display(), lineno + 1, e)))?
            {
                policies.set(slice, policy);
            }
        }

        for slice in 0..self.tenants {
            if policies.get(slice).is_none() {
                debug!(slice, "Slice missing from policy record, using round-robin");
                policies.set(slice, SlicePolicy::RoundRobin);
            }
        }

        Ok(policies)
    }

    fn write_policies(&mut self, policies: &SlicePolicies) -> Result<()> {
        let path = self.config.policy_path();
        let existing = read_optional(&path)?.unwrap_or_default();
        let contents = render_policies(&existing, policies);

        self.write_record(&path, &contents)?;
        self.stats.policy_writes += 1;
        debug!(path = %path.display(), "Policy record written");
        Ok(())
    }
}

/// Parse one policy line. Blank and comment lines yield `None`.
fn parse_policy_line(line: &str) -> Result<Option<(SliceId, SlicePolicy)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (slice, code) = line
        .split_once(POLICY_SEPARATOR)
        .ok_or_else(|| Error::invalid_policy(format!("expected `slice::code`, got '{}'", line)))?;

    let slice: SliceId = slice
        .trim()
        .parse()
        .map_err(|_| Error::invalid_policy(format!("invalid slice id '{}'", slice.trim())))?;
    let code: u8 = code
        .trim()
        .parse()
        .map_err(|_| Error::invalid_policy(format!("invalid policy code '{}'", code.trim())))?;

    Ok(Some((slice, SlicePolicy::from_code(code)?)))
}

/// Rewrite `existing` with the codes from `policies`. Comments and lines for
/// slices not in `policies` are kept, slices absent from `existing` are
/// appended.
fn render_policies(existing: &str, policies: &SlicePolicies) -> String {
    let mut out = String::new();
    let mut written = Vec::new();

    for line in existing.lines() {
        match parse_policy_line(line) {
            Ok(Some((slice, _))) => match policies.get(slice) {
                Some(policy) if !written.contains(&slice) => {
                    out.push_str(&format_policy(slice, policy));
                    written.push(slice);
                }
                // duplicate records collapse into the first one
                Some(_) => continue,
                None => out.push_str(line),
            },
            Ok(None) => out.push_str(line),
            Err(e) => {
                warn!(line, error = %e, "Keeping unparseable policy line");
                out.push_str(line);
            }
        }
        out.push('\n');
    }

    for (slice, policy) in policies.iter() {
        if !written.contains(&slice) {
            out.push_str(&format_policy(slice, policy));
            out.push('\n');
        }
    }

    out
}

fn format_policy(slice: SliceId, policy: SlicePolicy) -> String {
    format!("{}{}{}", slice, POLICY_SEPARATOR, policy.code())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let persist_err =
        |e: std::io::Error| Error::persistence(format!("Failed to write {}: {}", path.display(), e));

    let mut tmp = tempfile::Builder::new()
        .prefix(".slice-record")
        .tempfile_in(dir)
        .map_err(persist_err)?;
    tmp.write_all(contents.as_bytes()).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;

    // records are read by the radio stack, which may run as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(persist_err)?;
    }

    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}
