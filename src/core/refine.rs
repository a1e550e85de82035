use crate::core::exif::{MetadataReader, parse_capture_date};
use crate::core::model::{
    Capture, CaptureDate, DateSource, DuplicateGroups, FileRecord, GroupKey, NameGroups, retain_duplicates,
};
use crate::core::progress;
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Operation cancelled")]
    Cancelled,
}

/// A file dropped from duplicate consideration because its metadata could not be decoded.
#[derive(Debug, Clone, Serialize)]
pub struct DecodeFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RefineOutcome {
    pub groups: DuplicateGroups,
    pub failures: Vec<DecodeFailure>,
}

/// Splits name groups by capture date so only same-day copies stay grouped.
pub struct Refiner<R> {
    reader: R,
    show_progress: bool,
    cancellation_token: Arc<AtomicBool>,
}

impl<R: MetadataReader> Refiner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            show_progress: false,
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Share a flag that aborts the decode pass once set.
    pub fn with_cancellation(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn refine(&self, groups: NameGroups) -> Result<RefineOutcome, RefineError> {
        let candidates: Vec<(String, FileRecord)> = groups
            .into_iter()
            .flat_map(|(name, files)| files.into_iter().map(move |file| (name.clone(), file)))
            .collect();

        let bar = progress::bar(candidates.len() as u64, self.show_progress, "Reading capture dates");

        // Decoding fans out; grouping below stays on this thread.
        let resolved: Vec<(String, FileRecord, Result<Capture, String>)> = candidates
            .into_par_iter()
            .filter_map(|(name, record)| {
                if self.cancellation_token.load(Ordering::Relaxed) {
                    return None;
                }
                let capture = self.resolve_capture(&record);
                bar.inc(1);
                Some((name, record, capture))
            })
            .collect();
        bar.finish_and_clear();

        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(RefineError::Cancelled);
        }

        let mut refined = DuplicateGroups::new();
        let mut failures = Vec::new();
        for (name, mut record, capture) in resolved {
            match capture {
                Ok(capture) => {
                    let key = GroupKey {
                        name,
                        date: capture.date,
                    };
                    record.capture = Some(capture);
                    refined.entry(key).or_default().push(record);
                }
                Err(reason) => {
                    log::warn!("Failed to read: {} ({})", record.path.display(), reason);
                    failures.push(DecodeFailure {
                        path: record.path,
                        reason,
                    });
                }
            }
        }

        let groups = retain_duplicates(refined);
        log::info!(
            "{} duplicate groups after date refinement, {} files unreadable",
            groups.len(),
            failures.len()
        );
        Ok(RefineOutcome { groups, failures })
    }

    /// Embedded timestamp first, then the file's modification day.
    pub fn resolve_capture(&self, record: &FileRecord) -> Result<Capture, String> {
        let timestamp = self
            .reader
            .capture_timestamp(&record.path)
            .map_err(|e| e.to_string())?;

        if let Some(date) = timestamp.as_deref().and_then(parse_capture_date) {
            return Ok(Capture {
                date: CaptureDate(date),
                source: DateSource::Exif,
            });
        }

        let modified: DateTime<Local> = record.modified.into();
        Ok(Capture {
            date: CaptureDate(modified.date_naive()),
            source: DateSource::Modified,
        })
    }
}
