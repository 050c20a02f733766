use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{Mode, Settings, TreeSource};
use crate::dupes;
use crate::error::{Error, Result};
use crate::progress::ScanProgress;
use crate::reconcile::{self, Reconciler};
use crate::report::Reporter;
use crate::scan::{self, LogObserver, ScanOutcome};
use crate::snapshot;

/// Totals reported once the run is over.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub warnings: usize,
}

/// Execute the single mode `settings` selects, writing the report to `out`.
pub fn run<W: Write>(settings: &Settings, cancel: &AtomicBool, out: W) -> Result<RunSummary> {
    let mut reporter = Reporter::new(out, settings.format);

    match settings.mode() {
        Mode::ComputeHashes => compute_hashes(settings, cancel, &mut reporter),
        Mode::FindDuplicates => find_duplicates(settings, cancel, &mut reporter),
        Mode::FindNewFiles => find_new_files(settings, cancel, &mut reporter),
        Mode::Deduplicate => deduplicate(settings, cancel, &mut reporter),
        Mode::Unknown => Err(Error::config(
            "this combination of trees and actions does not select anything to do",
        )),
    }
}

fn compute_hashes<W: Write>(
    settings: &Settings,
    cancel: &AtomicBool,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary> {
    let Some(target) = settings.save_snapshot.as_deref() else {
        return Err(Error::config("no snapshot file to save to"));
    };
    let outcome = obtain(&settings.candidate, "candidate", settings, cancel)?;
    snapshot::save(target, &outcome.tree)?;

    let tree = &outcome.tree;
    tracing::info!(
        "saved {} files ({} digests) of '{}' to '{}'",
        tree.index.file_count(),
        tree.index.digest_count(),
        tree.root.display(),
        target.display()
    );
    reporter.snapshot_saved(tree, target)?;
    Ok(RunSummary {
        warnings: outcome.warnings.len(),
    })
}

fn find_duplicates<W: Write>(
    settings: &Settings,
    cancel: &AtomicBool,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary> {
    let outcome = obtain(&settings.candidate, "candidate", settings, cancel)?;
    let detection = dupes::detect(&outcome.tree.index);

    reporter.duplicates("candidate", &detection)?;
    reporter.trees(&outcome.tree.root, None)?;
    Ok(RunSummary {
        warnings: outcome.warnings.len(),
    })
}

fn find_new_files<W: Write>(
    settings: &Settings,
    cancel: &AtomicBool,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary> {
    let (candidate, repository) = obtain_both(settings, cancel)?;
    let paths = reconcile::new_files(&candidate.tree, &repository.tree);

    reporter.new_files(&paths)?;
    reporter.trees(&candidate.tree.root, Some(&repository.tree.root))?;
    Ok(RunSummary {
        warnings: candidate.warnings.len() + repository.warnings.len(),
    })
}

fn deduplicate<W: Write>(
    settings: &Settings,
    cancel: &AtomicBool,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary> {
    let (candidate, repository) = obtain_both(settings, cancel)?;

    let candidate_dups = dupes::detect(&candidate.tree.index);
    reporter.duplicates("candidate", &candidate_dups)?;
    let repository_dups = dupes::detect(&repository.tree.index);
    reporter.duplicates("repository", &repository_dups)?;

    let summary = Reconciler::new(&candidate.tree, &repository.tree.root, settings.delete)
        .with_cancel(cancel)
        .run(&repository_dups.sets);
    reporter.reconciliation(&summary, settings.delete)?;
    reporter.trees(&candidate.tree.root, Some(&repository.tree.root))?;

    if summary.interrupted {
        return Err(Error::Interrupted);
    }
    Ok(RunSummary {
        warnings: candidate.warnings.len() + repository.warnings.len() + summary.failed,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Digest a directory or load a snapshot.
fn obtain(
    source: &TreeSource,
    label: &str,
    settings: &Settings,
    cancel: &AtomicBool,
) -> Result<ScanOutcome> {
    let dir = match source {
        TreeSource::Snapshot(path) => {
            return Ok(ScanOutcome {
                tree: snapshot::load(path)?,
                warnings: Vec::new(),
            })
        }
        TreeSource::Directory(dir) => dir,
    };
    tracing::debug!("processing {label} directory '{}'", dir.display());

    if settings.progress && std::io::stdout().is_terminal() {
        match ScanProgress::start(label) {
            Ok(mut progress) => {
                let outcome = scan::digest_tree(dir, &settings.scan, cancel, &mut progress);
                if let Err(e) = progress.finish() {
                    tracing::warn!("could not restore the terminal: {e}");
                }
                return outcome;
            }
            Err(e) => tracing::debug!("progress display unavailable: {e}"),
        }
    }
    scan::digest_tree(dir, &settings.scan, cancel, &mut LogObserver)
}

/// Candidate and repository, digested side by side unless the progress
/// display needs the terminal to itself.
fn obtain_both(settings: &Settings, cancel: &AtomicBool) -> Result<(ScanOutcome, ScanOutcome)> {
    let Some(repository_source) = settings.repository.as_ref() else {
        return Err(Error::config("no repository tree given"));
    };

    let (candidate, repository) = if settings.progress {
        let candidate = obtain(&settings.candidate, "candidate", settings, cancel)?;
        let repository = obtain(repository_source, "repository", settings, cancel)?;
        (candidate, repository)
    } else {
        std::thread::scope(|s| {
            let repository =
                s.spawn(|| obtain(repository_source, "repository", settings, cancel));
            let candidate = obtain(&settings.candidate, "candidate", settings, cancel);
            let repository = repository
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            Ok::<_, Error>((candidate?, repository?))
        })?
    };

    if cancel.load(Ordering::SeqCst) {
        return Err(Error::Interrupted);
    }
    if candidate.tree.algorithm != repository.tree.algorithm {
        return Err(Error::config(format!(
            "candidate tree was digested with {} but repository tree with {}",
            candidate.tree.algorithm, repository.tree.algorithm
        )));
    }
    if candidate.tree.root == repository.tree.root {
        return Err(Error::config(format!(
            "candidate and repository are the same tree ({})",
            candidate.tree.root.display()
        )));
    }
    Ok((candidate, repository))
}
