use crate::core::model::{DEFAULT_EXTENSIONS, FileRecord, NameGroups, normalize_name, retain_duplicates};
use crate::core::progress;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// What to scan for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Lower-case extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Path components that exclude a file when any of them matches exactly.
    pub filters: Vec<String>,
}

impl ScanOptions {
    pub fn new<E, F>(extensions: E, filters: F) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            filters: filters.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied(), Vec::<String>::new())
    }
}

/// A walked entry that could not be read or keyed.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub path: Option<PathBuf>,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Normalized name -> size-sorted files, only names seen at least twice.
    pub groups: NameGroups,
    pub skipped: Vec<SkippedEntry>,
    /// Files that passed the extension and exclusion checks.
    pub files_seen: usize,
}

/// Walks source roots and groups candidate files by normalized name.
pub struct Scanner {
    options: ScanOptions,
    show_progress: bool,
    cancellation_token: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            show_progress: false,
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Share a flag that aborts the walk once set.
    pub fn with_cancellation(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn scan(&self, roots: &[PathBuf]) -> Result<ScanOutcome, ScanError> {
        let roots = Self::validate_roots(roots)?;
        let spinner = progress::spinner(self.show_progress, "Scanning for files…");

        let mut outcome = ScanOutcome::default();
        let mut groups = NameGroups::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for root in &roots {
            log::info!("Scanning {}", root.display());

            for entry in WalkDir::new(root).follow_links(false) {
                if self.cancellation_token.load(Ordering::Relaxed) {
                    spinner.finish_and_clear();
                    return Err(ScanError::Cancelled);
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unreadable entry: {}", e);
                        outcome.skipped.push(SkippedEntry {
                            path: e.path().map(Path::to_path_buf),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                if !self.matches_extension(path) || self.is_excluded(path) {
                    continue;
                }

                // Nested or repeated roots reach the same file twice.
                if !seen.insert(path.to_path_buf()) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        log::warn!("Could not stat {}: {}", path.display(), e);
                        outcome.skipped.push(SkippedEntry {
                            path: Some(path.to_path_buf()),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                match candidate(path, entry.file_name(), metadata.len(), metadata.modified()) {
                    Ok((key, record)) => groups.entry(key).or_default().push(record),
                    Err(skipped) => {
                        log::warn!("Skipping {}: {}", path.display(), skipped.reason);
                        outcome.skipped.push(skipped);
                        continue;
                    }
                }

                outcome.files_seen += 1;
                spinner.inc(1);
            }
        }
        spinner.finish_and_clear();

        outcome.groups = retain_duplicates(groups);
        log::info!(
            "Scanned {} files, {} names occur more than once",
            outcome.files_seen,
            outcome.groups.len()
        );
        Ok(outcome)
    }

    /// Case-insensitive extension check against the allow-list.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy())
            .is_some_and(|ext| self.options.extensions.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
    }

    /// True when any filter equals one of the path's components.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.options.filters.is_empty() {
            return false;
        }
        path.components().any(|component| {
            let component = component.as_os_str().to_string_lossy();
            self.options.filters.iter().any(|filter| *filter == component)
        })
    }

    fn validate_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
        roots
            .iter()
            .map(|root| {
                if !root.is_dir() {
                    return Err(ScanError::InvalidPath {
                        path: format!("{} is not a directory", root.display()),
                    });
                }
                Ok(fs::canonicalize(root)?)
            })
            .collect()
    }
}

/// Grouping key and record for a walked file. Names that are not valid
/// UTF-8 and files without a modification time cannot be keyed reliably.
fn candidate(
    path: &Path,
    file_name: &OsStr,
    len: u64,
    modified: io::Result<SystemTime>,
) -> Result<(String, FileRecord), SkippedEntry> {
    let skipped = |reason: String| SkippedEntry {
        path: Some(path.to_path_buf()),
        reason,
    };

    let name = file_name
        .to_str()
        .ok_or_else(|| skipped("file name is not valid UTF-8".to_string()))?;
    let modified = modified.map_err(|e| skipped(format!("no modification time: {}", e)))?;

    Ok((normalize_name(name), FileRecord::new(path.to_path_buf(), len, modified)))
}
