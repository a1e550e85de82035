use chrono::NaiveDate;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),

    #[error("Unsupported format: {}", .0.display())]
    Unsupported(PathBuf),
}

/// Source of embedded capture timestamps.
///
/// `Ok(None)` means the file carries no timestamp and the caller should fall
/// back to another signal. `Err` means the file could not be decoded at all.
pub trait MetadataReader: Sync {
    fn capture_timestamp(&self, path: &Path) -> Result<Option<String>, ExifError>;
}

/// Containers `kamadak-exif` can pull an EXIF block out of.
const EXIF_CONTAINERS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic", "heif", "tif", "tiff"];

/// Reads the EXIF `DateTime` tag (0x0132) from image files.
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Whether the container is one the EXIF reader can open. Anything else
    /// (video, raw) is a decode failure, not a missing timestamp.
    pub fn supports(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .map(|ext| ext.to_string_lossy())
            .is_some_and(|ext| EXIF_CONTAINERS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
    }

    /// Convert EXIF field value to string
    fn field_to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Ascii(vec) => vec.first().map(|ascii_val| {
                String::from_utf8_lossy(ascii_val)
                    .trim_end_matches('\0')
                    .to_string()
            }),
            Value::Undefined(data, _) => Some(
                String::from_utf8_lossy(data)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl MetadataReader for ExifService {
    fn capture_timestamp(&self, file_path: &Path) -> Result<Option<String>, ExifError> {
        if !self.supports(file_path) {
            return Err(ExifError::Unsupported(file_path.to_path_buf()));
        }

        let file = File::open(file_path)?;
        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            // Well-formed container without an EXIF block
            Err(exif::Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(exif_reader
            .get_field(Tag::DateTime, In::PRIMARY)
            .and_then(|field| self.field_to_string(&field.value))
            .filter(|timestamp| !timestamp.trim().is_empty()))
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate an EXIF timestamp (`YYYY:MM:DD HH:MM:SS`) to its date.
pub fn parse_capture_date(timestamp: &str) -> Option<NaiveDate> {
    let date = timestamp.split_whitespace().next()?;
    NaiveDate::parse_from_str(date, "%Y:%m:%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .map_err(|e| log::debug!("Unparseable EXIF timestamp {:?}: {}", timestamp, e))
        .ok()
}
