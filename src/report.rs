use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::dupes::Detection;
use crate::error::Result;
use crate::index::ScannedTree;
use crate::reconcile::{ReconcileSummary, Removal};
use crate::tui::fmt_size;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Csv,
}

/// Formats results onto any writer. No I/O other than `out`.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Duplicate sets of one tree plus its hash-collision count.
    /// `label` names the tree ("candidate", "repository").
    pub fn duplicates(&mut self, label: &str, detection: &Detection) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                writeln!(
                    self.out,
                    "\n*** {} tree: {} hash collisions ***",
                    capitalize(label),
                    detection.collisions
                )?;
                for set in &detection.sets {
                    write!(self.out, "{} DUPLICATE ({}):", label.to_uppercase(), fmt_size(set.size))?;
                    for path in &set.paths {
                        write!(self.out, " '{}'", path.display())?;
                    }
                    writeln!(self.out)?;
                }
                writeln!(
                    self.out,
                    "\n*** {} tree: {} duplicate sets detected, {} redundant files, {} ***",
                    capitalize(label),
                    detection.sets.len(),
                    detection.redundant_files(),
                    fmt_size(detection.redundant_bytes())
                )?;
            }
            OutputFormat::Csv => {
                let mut csv = csv_writer(&mut self.out);
                let kind = format!("{} DUPLICATE", label.to_uppercase());
                for set in &detection.sets {
                    let mut row = vec![kind.clone(), set.digest.to_string(), set.size.to_string()];
                    row.extend(set.paths.iter().map(|p| p.display().to_string()));
                    csv.write_record(&row)?;
                }
                csv.write_record([
                    format!("{} HASH COLLISIONS", label.to_uppercase()),
                    detection.collisions.to_string(),
                ])?;
                csv.flush()?;
            }
        }
        Ok(())
    }

    /// Keep / delete / undecided per repository duplicate set.
    pub fn reconciliation(&mut self, summary: &ReconcileSummary, delete: bool) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                for rec in &summary.results {
                    writeln!(self.out, "--- Duplicates: ---")?;
                    match &rec.reference {
                        Some(reference) => writeln!(self.out, "REF: {}", reference.display())?,
                        None => writeln!(self.out, "REF: (not in candidate tree)")?,
                    }
                    for entry in &rec.entries {
                        write!(self.out, "{} : {}", entry.path.display(), entry.decision)?;
                        match &entry.removal {
                            Removal::NotAttempted => {}
                            Removal::Removed => write!(self.out, " (deleted)")?,
                            Removal::Withheld => write!(self.out, " (kept copy missing, not deleted)")?,
                            Removal::OutsideRoot => {
                                write!(self.out, " (outside repository root, not deleted)")?
                            }
                            Removal::Failed(e) => write!(self.out, " (delete failed: {e})")?,
                        }
                        writeln!(self.out)?;
                    }
                }
                writeln!(
                    self.out,
                    "\nduplicate sets decided: {}  undecided: {}",
                    summary.decided, summary.undecided
                )?;
                if delete {
                    writeln!(
                        self.out,
                        "files deleted: {}  failed: {}",
                        summary.removed, summary.failed
                    )?;
                } else {
                    writeln!(self.out, "(dry run: nothing deleted, use --delete to remove)")?;
                }
                if summary.interrupted {
                    writeln!(self.out, "(interrupted: remaining duplicate sets not examined)")?;
                }
            }
            OutputFormat::Csv => {
                let mut csv = csv_writer(&mut self.out);
                for rec in &summary.results {
                    let reference = rec
                        .reference
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    for entry in &rec.entries {
                        let removal = match &entry.removal {
                            Removal::NotAttempted => String::new(),
                            Removal::Removed => "deleted".to_string(),
                            Removal::Withheld => "withheld".to_string(),
                            Removal::OutsideRoot => "outside root".to_string(),
                            Removal::Failed(e) => format!("failed: {e}"),
                        };
                        csv.write_record([
                            entry.decision.as_str().to_string(),
                            entry.path.display().to_string(),
                            rec.digest.to_string(),
                            reference.clone(),
                            removal,
                        ])?;
                    }
                }
                csv.flush()?;
            }
        }
        Ok(())
    }

    /// Repository files whose content the candidate does not have.
    pub fn new_files(&mut self, paths: &[PathBuf]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                writeln!(self.out, "\n***** Files existing only in repository tree: *****")?;
                for path in paths {
                    writeln!(self.out, "{}", path.display())?;
                }
                writeln!(self.out, "\n{} new files", paths.len())?;
            }
            OutputFormat::Csv => {
                let mut csv = csv_writer(&mut self.out);
                for path in paths {
                    csv.write_record(["NEW FILE".to_string(), path.display().to_string()])?;
                }
                csv.flush()?;
            }
        }
        Ok(())
    }

    /// One-line confirmation after a snapshot was written.
    pub fn snapshot_saved(&mut self, tree: &ScannedTree, target: &Path) -> Result<()> {
        if self.format == OutputFormat::Csv {
            return Ok(());
        }
        writeln!(
            self.out,
            "saved {} files ({} digests, {}) of '{}' to '{}'",
            tree.index.file_count(),
            tree.index.digest_count(),
            tree.algorithm,
            tree.root.display(),
            target.display()
        )?;
        Ok(())
    }

    /// Trailing summary naming the trees that were compared.
    pub fn trees(&mut self, candidate: &Path, repository: Option<&Path>) -> Result<()> {
        if self.format == OutputFormat::Csv {
            return Ok(());
        }
        writeln!(self.out, "\ncandidate tree : {}", candidate.display())?;
        if let Some(repository) = repository {
            writeln!(self.out, "repository tree : {}", repository.display())?;
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn csv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dupes::DuplicateSet;
    use crate::index::Digest;
    use crate::reconcile::{Decision, PathDecision, Reconciliation};

    fn detection() -> Detection {
        Detection {
            sets: vec![DuplicateSet {
                digest: Digest::new("abcd"),
                size: 12,
                paths: vec![PathBuf::from("/d/a.txt"), PathBuf::from("/d/b.txt")],
            }],
            collisions: 2,
        }
    }

    fn render(format: OutputFormat, f: impl FnOnce(&mut Reporter<Vec<u8>>)) -> String {
        let mut reporter = Reporter::new(Vec::new(), format);
        f(&mut reporter);
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn human_duplicates() {
        let text = render(OutputFormat::Human, |r| r.duplicates("candidate", &detection()).unwrap());
        assert!(text.contains("*** Candidate tree: 2 hash collisions ***"));
        assert!(text.contains("CANDIDATE DUPLICATE (12 B): '/d/a.txt' '/d/b.txt'"));
        assert!(text.contains("1 duplicate sets detected"));
    }

    #[test]
    fn csv_duplicates_one_field_per_path() {
        let text = render(OutputFormat::Csv, |r| r.duplicates("repository", &detection()).unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                r#""REPOSITORY DUPLICATE","abcd","12","/d/a.txt","/d/b.txt""#,
                r#""REPOSITORY HASH COLLISIONS","2""#,
            ]
        );
    }

    #[test]
    fn csv_quotes_awkward_paths() {
        let mut det = detection();
        det.sets[0].paths[0] = PathBuf::from("/d/with \"quote\", comma.txt");
        let text = render(OutputFormat::Csv, |r| r.duplicates("candidate", &det).unwrap());
        assert!(text.contains(r#""/d/with ""quote"", comma.txt""#));
    }

    fn summary() -> ReconcileSummary {
        ReconcileSummary {
            results: vec![
                Reconciliation {
                    digest: Digest::new("ff"),
                    size: 4,
                    reference: Some(PathBuf::from("/cand/x/f.txt")),
                    entries: vec![
                        PathDecision {
                            path: PathBuf::from("/repo/x/f.txt"),
                            decision: Decision::Keep,
                            removal: Removal::NotAttempted,
                        },
                        PathDecision {
                            path: PathBuf::from("/repo/y/f.txt"),
                            decision: Decision::Delete,
                            removal: Removal::Removed,
                        },
                    ],
                },
                Reconciliation {
                    digest: Digest::new("ee"),
                    size: 4,
                    reference: None,
                    entries: vec![PathDecision {
                        path: PathBuf::from("/repo/z/g.txt"),
                        decision: Decision::Undecided,
                        removal: Removal::NotAttempted,
                    }],
                },
            ],
            decided: 1,
            undecided: 1,
            removed: 1,
            failed: 0,
            interrupted: false,
        }
    }

    #[test]
    fn human_reconciliation() {
        let text = render(OutputFormat::Human, |r| r.reconciliation(&summary(), true).unwrap());
        assert!(text.contains("REF: /cand/x/f.txt"));
        assert!(text.contains("/repo/x/f.txt : keep\n"));
        assert!(text.contains("/repo/y/f.txt : delete (deleted)"));
        assert!(text.contains("/repo/z/g.txt : undecided"));
        assert!(text.contains("decided: 1  undecided: 1"));
        assert!(text.contains("files deleted: 1"));
        assert!(!text.contains("interrupted"));
    }

    #[test]
    fn interrupted_reconciliation_says_so() {
        let mut partial = summary();
        partial.results.truncate(1);
        partial.undecided = 0;
        partial.interrupted = true;
        let text = render(OutputFormat::Human, |r| r.reconciliation(&partial, true).unwrap());
        assert!(text.contains("/repo/y/f.txt : delete (deleted)"));
        assert!(text.contains("(interrupted: remaining duplicate sets not examined)"));
    }

    #[test]
    fn removal_reasons_are_distinct() {
        let mut s = summary();
        s.results[0].entries[1].removal = Removal::OutsideRoot;
        let text = render(OutputFormat::Human, |r| r.reconciliation(&s, true).unwrap());
        assert!(text.contains("/repo/y/f.txt : delete (outside repository root, not deleted)"));

        s.results[0].entries[1].removal = Removal::Withheld;
        let text = render(OutputFormat::Human, |r| r.reconciliation(&s, true).unwrap());
        assert!(text.contains("/repo/y/f.txt : delete (kept copy missing, not deleted)"));
    }

    #[test]
    fn csv_reconciliation() {
        let text = render(OutputFormat::Csv, |r| r.reconciliation(&summary(), false).unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            r#""delete","/repo/y/f.txt","ff","/cand/x/f.txt","deleted""#
        );
        assert_eq!(lines[2], r#""undecided","/repo/z/g.txt","ee","","""#);
    }

    #[test]
    fn new_files_listing() {
        let paths = vec![PathBuf::from("/repo/a"), PathBuf::from("/repo/b")];
        let text = render(OutputFormat::Human, |r| r.new_files(&paths).unwrap());
        assert!(text.contains("Files existing only in repository tree"));
        assert!(text.contains("/repo/a\n/repo/b\n"));
        assert!(text.contains("2 new files"));

        let text = render(OutputFormat::Csv, |r| r.new_files(&paths).unwrap());
        assert_eq!(text, "\"NEW FILE\",\"/repo/a\"\n\"NEW FILE\",\"/repo/b\"\n");
    }

    #[test]
    fn tree_summary_is_human_only() {
        let text = render(OutputFormat::Human, |r| {
            r.trees(Path::new("/cand"), Some(Path::new("/repo"))).unwrap()
        });
        assert!(text.contains("candidate tree : /cand"));
        assert!(text.contains("repository tree : /repo"));
        let text = render(OutputFormat::Csv, |r| r.trees(Path::new("/cand"), None).unwrap());
        assert!(text.is_empty());
    }
}
