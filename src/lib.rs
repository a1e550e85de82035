//! Find photos and videos that were saved more than once under the same name
//! on the same day, keep the largest copy and move the rest aside.

pub mod config;
pub mod core;

pub use crate::core::exif::{ExifError, ExifService, MetadataReader};
pub use crate::core::model::{DuplicateGroups, FileRecord, GroupKey, NameGroups, Stats, normalize_name};
pub use crate::core::refine::{RefineError, RefineOutcome, Refiner};
pub use crate::core::relocate::{RelocationPlan, RelocationReport, execute, execute_with, plan_relocation};
pub use crate::core::scanner::{ScanError, ScanOptions, ScanOutcome, Scanner};
