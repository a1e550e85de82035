use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::SystemTime;

/// Extensions scanned when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "png", "jpeg", "gif", "mp4", "webp", "heic", "raf"];

/// Matches a "save as copy" marker such as `(1)`. Only single digits are
/// recognised, so `(10)` is left in place.
static DUPLICATE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([0-9]\)").expect("Invalid duplicate marker regex"));

/// Strip parenthesized single-digit duplicate markers from a file name.
pub fn normalize_name(file_name: &str) -> String {
    DUPLICATE_MARKER.replace_all(file_name, "").into_owned()
}

/// Where a capture date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateSource {
    Exif,
    Modified,
}

/// Calendar day a file was captured on, rendered EXIF-style (`YYYY:MM:DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct CaptureDate(pub NaiveDate);

impl fmt::Display for CaptureDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0.format("%Y:%m:%d").to_string())
    }
}

impl From<CaptureDate> for String {
    fn from(date: CaptureDate) -> Self {
        date.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub date: CaptureDate,
    pub source: DateSource,
}

/// A candidate file. `capture` stays empty until the refiner resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    #[serde(skip)]
    pub modified: SystemTime,
    pub capture: Option<Capture>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            capture: None,
        }
    }
}

/// Refined grouping key: both the normalized name and the capture day agree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub name: String,
    pub date: CaptureDate,
}

/// Files sharing a normalized name.
pub type NameGroups = BTreeMap<String, Vec<FileRecord>>;

/// Files sharing a normalized name and a capture date.
pub type DuplicateGroups = BTreeMap<GroupKey, Vec<FileRecord>>;

/// Order a group size-ascending; ties fall back to the path so reruns agree.
pub fn sort_group(files: &mut [FileRecord]) {
    files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
}

/// Drop singleton groups and size-sort the rest.
pub fn retain_duplicates<K: Ord>(groups: BTreeMap<K, Vec<FileRecord>>) -> BTreeMap<K, Vec<FileRecord>> {
    groups
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(key, mut files)| {
            sort_group(&mut files);
            (key, files)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Number of duplicate groups.
    pub groups: usize,
    /// Files across all groups, kept copies included.
    pub total_files: usize,
    pub max_group_size: usize,
}

impl Stats {
    pub fn from_groups<K>(groups: &BTreeMap<K, Vec<FileRecord>>) -> Self {
        groups.values().fold(Stats::default(), |mut stats, files| {
            stats.groups += 1;
            stats.total_files += files.len();
            stats.max_group_size = stats.max_group_size.max(files.len());
            stats
        })
    }
}
