use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use syno_dedupe::core::generate::generate_dummy_data;
use syno_dedupe::{
    DuplicateGroups, ExifError, ExifService, MetadataReader, Refiner, ScanOptions, Scanner, Stats, execute,
    plan_relocation,
};
use tempfile::TempDir;

/// Answers every lookup with a fixed timestamp unless a path is overridden.
struct FixedDateReader {
    default: String,
    overrides: HashMap<PathBuf, String>,
}

impl FixedDateReader {
    fn new(timestamp: &str) -> Self {
        Self {
            default: timestamp.to_string(),
            overrides: HashMap::new(),
        }
    }

    fn with(mut self, path: PathBuf, timestamp: &str) -> Self {
        self.overrides.insert(path, timestamp.to_string());
        self
    }
}

impl MetadataReader for FixedDateReader {
    fn capture_timestamp(&self, path: &Path) -> Result<Option<String>, ExifError> {
        Ok(Some(self.overrides.get(path).unwrap_or(&self.default).clone()))
    }
}

fn canonical_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    (temp_dir, root)
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

fn find_groups<R: MetadataReader>(roots: &[PathBuf], options: ScanOptions, reader: R) -> DuplicateGroups {
    let scan = Scanner::new(options).scan(roots).unwrap();
    Refiner::new(reader).refine(scan.groups).unwrap().groups
}

/// JPEG with an IFD0 `DateTime`, padded with `padding` bytes after EOI.
fn jpeg_with_datetime(datetime: &str, padding: usize) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0132u16.to_be_bytes());
    tiff.extend_from_slice(&2u16.to_be_bytes());
    tiff.extend_from_slice(&20u32.to_be_bytes());
    tiff.extend_from_slice(&26u32.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(datetime.as_bytes());
    tiff.push(0);

    let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
    jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    jpeg.extend_from_slice(b"Exif\x00\x00");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xff, 0xd9]);
    jpeg.extend(std::iter::repeat_n(0u8, padding));
    jpeg
}

#[test]
fn test_largest_copy_survives_relocation() {
    let (_guard, root) = canonical_temp_dir();
    let first = root.join("backup1");
    let second = root.join("backup2");
    let dest = root.join("dest");
    write(&first.join("photo.jpg"), &[1u8; 500]);
    write(&second.join("photo(1).jpg"), &[2u8; 300]);

    let groups = find_groups(
        &[first.clone(), second.clone()],
        ScanOptions::default(),
        FixedDateReader::new("2024:01:01 09:30:00"),
    );
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.values().next().unwrap().len(), 2);

    let plan = plan_relocation(&groups, &dest);
    let report = execute(&plan, &AtomicBool::new(false)).unwrap();

    assert_eq!(report.moved_count(), 1);
    assert_eq!(fs::read(first.join("photo.jpg")).unwrap(), vec![1u8; 500]);
    assert!(!second.join("photo(1).jpg").exists());
    assert_eq!(fs::read(dest.join("0").join("photo(1).jpg")).unwrap(), vec![2u8; 300]);
}

#[test]
fn test_identical_bytes_under_different_names_are_not_duplicates() {
    let (_guard, root) = canonical_temp_dir();
    write(&root.join("x/a.jpg"), b"identical");
    write(&root.join("y/b.jpg"), b"identical");

    let groups = find_groups(&[root], ScanOptions::default(), FixedDateReader::new("2024:01:01 00:00:00"));
    assert!(groups.is_empty());
}

#[test]
fn test_date_disagreement_prevents_grouping() {
    let (_guard, root) = canonical_temp_dir();
    write(&root.join("x/IMG_0001.jpg"), &[0u8; 10]);
    write(&root.join("y/IMG_0001(1).jpg"), &[0u8; 20]);

    let reader = FixedDateReader::new("2024:01:01 00:00:00").with(root.join("y/IMG_0001(1).jpg"), "2019:03:03 00:00:00");
    let groups = find_groups(&[root], ScanOptions::default(), reader);
    assert!(groups.is_empty());
}

#[test]
fn test_groups_are_complete_and_size_sorted() {
    let (_guard, root) = canonical_temp_dir();
    let sizes = [70usize, 10, 40, 25];
    for (i, size) in sizes.iter().enumerate() {
        let name = if i == 0 { "IMG_7.heic".to_string() } else { format!("IMG_7({i}).heic") };
        write(&root.join(format!("copy{i}")).join(name), &vec![0u8; *size]);
    }

    let groups = find_groups(&[root], ScanOptions::default(), FixedDateReader::new("2022:08:15 18:00:00"));
    assert_eq!(groups.len(), 1);
    let found: Vec<u64> = groups.values().next().unwrap().iter().map(|f| f.size).collect();
    assert_eq!(found, vec![10, 25, 40, 70]);
}

#[test]
fn test_scan_and_refine_are_repeatable() {
    let (_guard, root) = canonical_temp_dir();
    let data = root.join("data");
    generate_dummy_data(&data, 40, Some(3)).unwrap();
    let options = ScanOptions::new(["txt"], Vec::<String>::new());

    let first = find_groups(&[data.clone()], options.clone(), FixedDateReader::new("2024:01:01 00:00:00"));
    let second = find_groups(&[data], options, FixedDateReader::new("2024:01:01 00:00:00"));
    assert_eq!(first, second);
}

#[test]
fn test_dry_run_writes_nothing() {
    let (_guard, root) = canonical_temp_dir();
    let data = root.join("data");
    let dest = root.join("dest");
    let summary = generate_dummy_data(&data, 25, Some(11)).unwrap();
    let options = ScanOptions::new(["txt"], Vec::<String>::new());

    let groups = find_groups(&[data.clone()], options.clone(), FixedDateReader::new("2024:01:01 00:00:00"));
    let plan = plan_relocation(&groups, &dest);
    assert_eq!(plan.move_count(), summary.second);

    // Planning alone must leave the tree exactly as it was.
    assert!(!dest.exists());
    let again = find_groups(&[data], options, FixedDateReader::new("2024:01:01 00:00:00"));
    assert_eq!(Stats::from_groups(&groups), Stats::from_groups(&again));
}

#[test]
fn test_every_group_keeps_its_largest_member() {
    let (_guard, root) = canonical_temp_dir();
    let data = root.join("data");
    let dest = root.join("dest");
    let summary = generate_dummy_data(&data, 30, Some(5)).unwrap();

    let groups = find_groups(
        &[data.join("dir1"), data.join("dir2")],
        ScanOptions::new(["txt"], Vec::<String>::new()),
        FixedDateReader::new("2024:01:01 00:00:00"),
    );
    assert_eq!(groups.len(), summary.second);

    let plan = plan_relocation(&groups, &dest);
    let report = execute(&plan, &AtomicBool::new(false)).unwrap();
    assert_eq!(report.moved_count(), summary.second);
    assert!(report.failed.is_empty());

    for files in groups.values() {
        let (kept, moved) = files.split_last().unwrap();
        assert!(moved.iter().all(|f| f.size <= kept.size));
        assert!(kept.path.exists());
        for file in moved {
            assert!(!file.path.exists());
            assert!(dest.join("0").join(file.path.file_name().unwrap()).exists());
        }
    }
}

#[test]
fn test_exif_dates_drive_grouping() {
    let (_guard, root) = canonical_temp_dir();
    write(&root.join("a/photo.jpg"), &jpeg_with_datetime("2024:01:01 12:00:00", 400));
    write(&root.join("b/photo(1).jpg"), &jpeg_with_datetime("2024:01:01 12:00:03", 100));
    write(&root.join("a/IMG_0002.jpg"), &jpeg_with_datetime("2024:01:01 12:00:00", 10));
    write(&root.join("b/IMG_0002.jpg"), &jpeg_with_datetime("2021:06:30 12:00:00", 20));
    write(&root.join("c/photo.jpg"), b"definitely not a jpeg");

    let scan = Scanner::new(ScanOptions::default()).scan(&[root.clone()]).unwrap();
    let refined = Refiner::new(ExifService::new()).refine(scan.groups).unwrap();

    assert_eq!(refined.failures.len(), 1);
    assert_eq!(refined.failures[0].path, root.join("c/photo.jpg"));
    assert_eq!(refined.groups.len(), 1);

    let (key, files) = refined.groups.iter().next().unwrap();
    assert_eq!(key.name, "photo.jpg");
    assert_eq!(key.date.to_string(), "2024:01:01");
    assert_eq!(files[0].path, root.join("b/photo(1).jpg"));
    assert_eq!(files[1].path, root.join("a/photo.jpg"));
}
