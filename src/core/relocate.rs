use crate::core::model::DuplicateGroups;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Appended to inside the destination root, one line per group.
pub const HISTORY_FILE: &str = ".history.jsonl";

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("Copy of {0} does not match the original")]
    VerifyFailed(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Position in the group's size order; also the subfolder name.
    pub rank: usize,
    pub size: u64,
}

/// A member whose target slot was already claimed by another group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub source: PathBuf,
    pub target: PathBuf,
    pub claimed_by: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupPlan {
    pub name: String,
    pub date: String,
    /// Largest member, left where it is.
    pub kept: PathBuf,
    pub moves: Vec<PlannedMove>,
}

/// Every move a run would make, computed without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationPlan {
    pub destination: PathBuf,
    /// Number of rank subfolders: largest group size minus one.
    pub rank_dirs: usize,
    pub groups: Vec<GroupPlan>,
    pub collisions: Vec<Collision>,
}

impl RelocationPlan {
    pub fn move_count(&self) -> usize {
        self.groups.iter().map(|group| group.moves.len()).sum()
    }

    pub fn rank_directories(&self) -> Vec<PathBuf> {
        (0..self.rank_dirs)
            .map(|rank| self.destination.join(rank.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveFailure {
    pub source: PathBuf,
    pub target: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct RelocationReport {
    pub moved: Vec<PlannedMove>,
    pub failed: Vec<MoveFailure>,
    /// Set when an interrupt stopped the batch part way.
    pub cancelled: bool,
}

impl RelocationReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

#[derive(Serialize)]
struct HistoryRecord<'a> {
    timestamp: String,
    kept: &'a Path,
    moved: Vec<HistoryMove<'a>>,
}

#[derive(Serialize)]
struct HistoryMove<'a> {
    from: &'a Path,
    to: &'a Path,
}

/// Decide where every non-kept member goes.
///
/// The i-th smallest member of a group lands in `destination/i/<file name>`;
/// the last (largest) member is kept. A target already claimed earlier in the
/// plan is reported as a collision and left in place.
pub fn plan_relocation(groups: &DuplicateGroups, destination: &Path) -> RelocationPlan {
    let max_group_size = groups.values().map(Vec::len).max().unwrap_or(0);
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut collisions = Vec::new();
    let mut group_plans = Vec::with_capacity(groups.len());

    for (key, files) in groups {
        let Some((kept, rest)) = files.split_last() else {
            continue;
        };

        let mut moves = Vec::with_capacity(rest.len());
        for (rank, file) in rest.iter().enumerate() {
            let Some(file_name) = file.path.file_name() else {
                log::warn!("Skipping {}: no file name", file.path.display());
                continue;
            };
            let target = destination.join(rank.to_string()).join(file_name);

            if let Some(owner) = claimed.get(&target) {
                log::warn!(
                    "{} would overwrite {} at {}; leaving it in place",
                    file.path.display(),
                    owner.display(),
                    target.display()
                );
                collisions.push(Collision {
                    source: file.path.clone(),
                    target,
                    claimed_by: owner.clone(),
                });
                continue;
            }

            claimed.insert(target.clone(), file.path.clone());
            moves.push(PlannedMove {
                source: file.path.clone(),
                target,
                rank,
                size: file.size,
            });
        }

        group_plans.push(GroupPlan {
            name: key.name.clone(),
            date: key.date.to_string(),
            kept: kept.path.clone(),
            moves,
        });
    }

    RelocationPlan {
        destination: destination.to_path_buf(),
        rank_dirs: max_group_size.saturating_sub(1),
        groups: group_plans,
        collisions,
    }
}

/// Carry out a plan. Moves run one at a time; a failed move is recorded and
/// the batch continues. `cancel` is checked before anything is written and
/// again before every move.
pub fn execute(plan: &RelocationPlan, cancel: &AtomicBool) -> Result<RelocationReport, RelocateError> {
    execute_with(plan, cancel, |_| {})
}

/// Like [`execute`], calling `on_move` after each move that succeeded.
pub fn execute_with<F>(plan: &RelocationPlan, cancel: &AtomicBool, mut on_move: F) -> Result<RelocationReport, RelocateError>
where
    F: FnMut(&PlannedMove),
{
    if cancel.load(Ordering::SeqCst) {
        return Err(RelocateError::Cancelled);
    }

    let mut report = RelocationReport::default();
    if plan.move_count() == 0 {
        return Ok(report);
    }

    create_dir(&plan.destination)?;
    for dir in plan.rank_directories() {
        create_dir(&dir)?;
    }

    let history_path = plan.destination.join(HISTORY_FILE);
    let mut history = OpenOptions::new().create(true).append(true).open(&history_path)?;

    for group in &plan.groups {
        let mut moved_here = Vec::new();
        for planned in &group.moves {
            if cancel.load(Ordering::SeqCst) {
                log::warn!("Interrupted; stopping before {}", planned.source.display());
                report.cancelled = true;
                break;
            }

            match move_file(&planned.source, &planned.target) {
                Ok(()) => {
                    log::info!("Moved {} → {}", planned.source.display(), planned.target.display());
                    on_move(planned);
                    moved_here.push(planned);
                }
                Err(e) => {
                    log::warn!("Failed to move {}: {}", planned.source.display(), e);
                    report.failed.push(MoveFailure {
                        source: planned.source.clone(),
                        target: planned.target.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        write_history(&mut history, &history_path, group, &moved_here);
        report.moved.extend(moved_here.into_iter().cloned());
        if report.cancelled {
            break;
        }
    }

    Ok(report)
}

fn create_dir(path: &Path) -> Result<(), RelocateError> {
    fs::create_dir_all(path).map_err(|source| RelocateError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn write_history(history: &mut File, history_path: &Path, group: &GroupPlan, moved: &[&PlannedMove]) {
    if moved.is_empty() {
        return;
    }
    let record = HistoryRecord {
        timestamp: Utc::now().to_rfc3339(),
        kept: &group.kept,
        moved: moved
            .iter()
            .map(|m| HistoryMove {
                from: &m.source,
                to: &m.target,
            })
            .collect(),
    };
    let written = serde_json::to_string(&record)
        .map_err(io::Error::from)
        .and_then(|line| writeln!(history, "{}", line));
    if let Err(e) = written {
        log::warn!("Failed to record history in {}: {}", history_path.display(), e);
    }
}

/// Rename `source` to `target`, never overwriting. Falls back to
/// copy, verify, delete when the rename crosses filesystems.
pub fn move_file(source: &Path, target: &Path) -> Result<(), RelocateError> {
    if target.symlink_metadata().is_ok() {
        return Err(RelocateError::DestinationExists(target.to_path_buf()));
    }

    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            log::debug!("{} is on another device; copying", source.display());
            copy_verify_delete(source, target)
        }
        Err(e) => Err(e.into()),
    }
}

fn copy_verify_delete(source: &Path, target: &Path) -> Result<(), RelocateError> {
    copy_or_clean_up(source, target, |from, to| fs::copy(from, to))?;

    if content_hash(source)? != content_hash(target)? {
        let _ = fs::remove_file(target);
        return Err(RelocateError::VerifyFailed(source.to_path_buf()));
    }

    fs::remove_file(source)?;
    Ok(())
}

/// Run `copy`, removing whatever it left at `target` if it fails.
fn copy_or_clean_up<F>(source: &Path, target: &Path, copy: F) -> io::Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<u64>,
{
    if let Err(e) = copy(source, target) {
        if let Err(cleanup) = fs::remove_file(target) {
            if cleanup.kind() != ErrorKind::NotFound {
                log::warn!("Could not remove partial copy {}: {}", target.display(), cleanup);
            }
        }
        return Err(e);
    }
    Ok(())
}

fn content_hash(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize())
}
