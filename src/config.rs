use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::report::OutputFormat;
use crate::scan::ScanOptions;

const CONFIG_FILE: &str = "dircmp_options.yaml";

/// Options file contents. Every field is optional; CLI flags win.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub hash: Option<HashAlgorithm>,
    pub jobs: Option<usize>,
    pub follow_symlinks: bool,
    pub hidden: bool,
    pub skip_empty: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub format: Option<OutputFormat>,
    pub progress: bool,
}

impl Config {
    /// Load `explicit` if given, otherwise dircmp_options.yaml from the CWD
    /// or the executable's directory, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        for path in config_candidates() {
            if path.exists() {
                return Self::read(&path);
            }
        }
        Ok(Config::default())
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::path_access(path, e))?;
        Self::parse(&text).map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }
}

fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(CONFIG_FILE));
        }
    }
    candidates
}

// ── Validated settings ───────────────────────────────────────────────────────

/// Where a tree's digests come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
    Directory(PathBuf),
    Snapshot(PathBuf),
}

impl TreeSource {
    fn pick(dir: Option<&PathBuf>, snapshot: Option<&PathBuf>, what: &str) -> Result<Option<Self>> {
        match (dir, snapshot) {
            (Some(_), Some(_)) => Err(Error::config(format!(
                "both a directory and a snapshot given for the {what} tree"
            ))),
            (Some(d), None) => Ok(Some(TreeSource::Directory(d.clone()))),
            (None, Some(s)) => Ok(Some(TreeSource::Snapshot(s.clone()))),
            (None, None) => Ok(None),
        }
    }
}

/// What one invocation does, decided once from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Digest one tree, save a snapshot, stop.
    ComputeHashes,
    /// Report duplicates inside one tree.
    FindDuplicates,
    /// List candidate files missing from the repository.
    FindNewFiles,
    /// Report duplicates of both trees and reconcile the repository's.
    Deduplicate,
    Unknown,
}

/// Everything a run needs, merged from CLI and options file and checked
/// for contradictions. Built once, passed down explicitly.
pub struct Settings {
    pub candidate: TreeSource,
    pub repository: Option<TreeSource>,
    pub save_snapshot: Option<PathBuf>,
    pub new_files: bool,
    pub delete: bool,
    pub format: OutputFormat,
    pub progress: bool,
    pub scan: ScanOptions,
}

impl Settings {
    /// Validate and merge. Performs no filesystem access.
    pub fn from_args_and_config(args: &Cli, config: &Config) -> Result<Self> {
        let candidate = TreeSource::pick(args.dir.as_ref(), args.load_snapshot.as_ref(), "candidate")?
            .ok_or_else(|| Error::config("nothing to scan: give a directory or --load-snapshot"))?;
        let repository = TreeSource::pick(
            args.repository.as_ref(),
            args.load_repository_snapshot.as_ref(),
            "repository",
        )?;

        if args.delete && repository.is_none() {
            return Err(Error::config("--delete needs a repository tree"));
        }
        if args.delete && args.new_files {
            return Err(Error::config("--delete cannot be combined with --new-files"));
        }
        if args.save_snapshot.is_some() {
            if repository.is_some() || args.new_files || args.delete {
                return Err(Error::config(
                    "--save-snapshot only digests one tree; it cannot be combined with analysis",
                ));
            }
            if matches!(candidate, TreeSource::Snapshot(_)) {
                return Err(Error::config(
                    "--save-snapshot and --load-snapshot both given, make up your mind",
                ));
            }
        }

        let format = match (args.csv, args.format, config.format) {
            (true, Some(OutputFormat::Human), _) => {
                return Err(Error::config("--csv contradicts --format human"))
            }
            (true, _, _) => OutputFormat::Csv,
            (false, Some(f), _) | (false, None, Some(f)) => f,
            (false, None, None) => OutputFormat::default(),
        };

        let settings = Self {
            candidate,
            repository,
            save_snapshot: args.save_snapshot.clone(),
            new_files: args.new_files,
            delete: args.delete,
            format,
            progress: args.progress || config.progress,
            scan: ScanOptions::from_args_and_config(args, config)?,
        };
        if settings.mode() == Mode::Unknown {
            return Err(Error::config(
                "this combination of trees and actions does not select anything to do",
            ));
        }
        Ok(settings)
    }

    pub fn mode(&self) -> Mode {
        let saving = self.save_snapshot.is_some();
        let scanned_dir = matches!(self.candidate, TreeSource::Directory(_));
        match (self.repository.is_some(), saving, self.new_files) {
            (false, true, false) if scanned_dir => Mode::ComputeHashes,
            (false, false, false) => Mode::FindDuplicates,
            (true, false, true) => Mode::FindNewFiles,
            (true, false, false) => Mode::Deduplicate,
            _ => Mode::Unknown,
        }
    }
}
