use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dupes::DuplicateSet;
use crate::index::{Digest, ScannedTree};

// ── Per-path decision ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Delete,
    Undecided,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Keep => "keep",
            Decision::Delete => "delete",
            Decision::Undecided => "undecided",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a path marked [`Decision::Delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Deletion disabled, or the path is not marked for deletion.
    NotAttempted,
    Removed,
    /// Not removed: none of the set's kept copies is still on disk.
    Withheld,
    /// Not removed: the path lies outside the repository root.
    OutsideRoot,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    pub path: PathBuf,
    pub decision: Decision,
    pub removal: Removal,
}

/// The outcome for one repository duplicate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub digest: Digest,
    pub size: u64,
    /// First candidate file with this digest, if any.
    pub reference: Option<PathBuf>,
    pub entries: Vec<PathDecision>,
}

impl Reconciliation {
    pub fn is_decided(&self) -> bool {
        self.entries.iter().any(|e| e.decision == Decision::Keep)
    }

    #[cfg(test)]
    pub fn decision_for(&self, path: &Path) -> Option<Decision> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.decision)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub results: Vec<Reconciliation>,
    pub decided: usize,
    pub undecided: usize,
    pub removed: usize,
    pub failed: usize,
    /// Stopped early; sets after the last result were not looked at.
    pub interrupted: bool,
}

// ── Reconciler ───────────────────────────────────────────────────────────────

/// Decides which copy of each repository duplicate set to keep, using the
/// candidate tree's layout as the arbiter.
pub struct Reconciler<'a> {
    candidate: &'a ScannedTree,
    repository_root: &'a Path,
    delete: bool,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Reconciler<'a> {
    pub fn new(candidate: &'a ScannedTree, repository_root: &'a Path, delete: bool) -> Self {
        Self {
            candidate,
            repository_root,
            delete,
            cancel: None,
        }
    }

    /// Stop between sets once `cancel` is set.
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Decide every set in order; with deletion enabled each set's
    /// `Delete` paths are removed before the next set is looked at.
    pub fn run(&self, sets: &[DuplicateSet]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for set in sets {
            if self.cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                summary.interrupted = true;
                break;
            }
            let mut rec = self.decide(set);
            if rec.is_decided() {
                summary.decided += 1;
                if self.delete {
                    self.apply(&mut rec);
                }
            } else {
                summary.undecided += 1;
            }
            for entry in &rec.entries {
                match entry.removal {
                    Removal::Removed => summary.removed += 1,
                    Removal::Failed(_) => summary.failed += 1,
                    Removal::NotAttempted | Removal::Withheld | Removal::OutsideRoot => {}
                }
            }
            summary.results.push(rec);
        }
        summary
    }

    /// Pure decision for one set; touches nothing on disk.
    pub fn decide(&self, set: &DuplicateSet) -> Reconciliation {
        let undecided = |reference: Option<PathBuf>| Reconciliation {
            digest: set.digest.clone(),
            size: set.size,
            reference,
            entries: set
                .paths
                .iter()
                .map(|p| PathDecision {
                    path: p.clone(),
                    decision: Decision::Undecided,
                    removal: Removal::NotAttempted,
                })
                .collect(),
        };

        let Some(candidates) = self.candidate.index.get(&set.digest) else {
            tracing::debug!(digest = %set.digest, "not in candidate tree, undecided");
            return undecided(None);
        };
        let reference = candidates.first().map(|r| r.path.clone());

        let locations: HashSet<&Path> = candidates
            .iter()
            .filter_map(|r| self.candidate.relative(&r.path))
            .collect();
        let keep: Vec<bool> = set
            .paths
            .iter()
            .map(|p| {
                p.strip_prefix(self.repository_root)
                    .map(|rel| locations.contains(rel))
                    .unwrap_or(false)
            })
            .collect();

        if !keep.contains(&true) {
            tracing::debug!(digest = %set.digest, "no copy at a candidate location, undecided");
            return undecided(reference);
        }

        Reconciliation {
            digest: set.digest.clone(),
            size: set.size,
            reference,
            entries: set
                .paths
                .iter()
                .zip(keep)
                .map(|(p, keep)| PathDecision {
                    path: p.clone(),
                    decision: if keep { Decision::Keep } else { Decision::Delete },
                    removal: Removal::NotAttempted,
                })
                .collect(),
        }
    }

    fn apply(&self, rec: &mut Reconciliation) {
        let kept_exists = rec
            .entries
            .iter()
            .filter(|e| e.decision == Decision::Keep)
            .any(|e| e.path.is_file());
        if !kept_exists {
            tracing::warn!(
                "kept copy of {} is missing on disk, not deleting its duplicates",
                rec.digest
            );
        }

        for entry in rec
            .entries
            .iter_mut()
            .filter(|e| e.decision == Decision::Delete)
        {
            if !kept_exists {
                entry.removal = Removal::Withheld;
                continue;
            }
            if !entry.path.starts_with(self.repository_root) {
                tracing::warn!(
                    "{} lies outside the repository root, not deleting it",
                    entry.path.display()
                );
                entry.removal = Removal::OutsideRoot;
                continue;
            }
            entry.removal = match std::fs::remove_file(&entry.path) {
                Ok(()) => {
                    tracing::debug!("deleted '{}'", entry.path.display());
                    Removal::Removed
                }
                Err(e) => {
                    tracing::warn!("failed to delete {}: {}", entry.path.display(), e);
                    Removal::Failed(e.to_string())
                }
            };
        }
    }
}

/// Repository files whose content does not occur anywhere in the candidate.
pub fn new_files(candidate: &ScannedTree, repository: &ScannedTree) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = repository
        .index
        .buckets()
        .filter(|(digest, _)| !candidate.index.contains(digest))
        .flat_map(|(_, records)| records.iter().map(|r| r.path.clone()))
        .collect();
    paths.sort();
    paths
}
