use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use walkdir::{DirEntry, WalkDir};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::index::{FileRecord, HashIndex, ScannedTree};

/// Results in flight between the hashing workers and the accumulating thread.
const CHANNEL_CAPACITY: usize = 1024;

pub struct ScanOptions {
    pub algorithm: HashAlgorithm,
    pub jobs: usize,
    pub follow_symlinks: bool,
    pub hidden: bool,
    pub skip_empty: bool,
    pub include: GlobSet,
    pub exclude: GlobSet,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            jobs: default_jobs(),
            follow_symlinks: false,
            hidden: false,
            skip_empty: false,
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
        }
    }
}

impl ScanOptions {
    pub fn from_args_and_config(args: &Cli, config: &Config) -> Result<Self> {
        let algorithm = args.hash.or(config.hash).unwrap_or_default();
        let jobs = args.jobs.or(config.jobs).unwrap_or_else(default_jobs);
        if jobs == 0 {
            return Err(Error::config("--jobs must be at least 1"));
        }

        // CLI include/exclude take priority; fall back to config
        let include_globs: &[String] = if !args.include.is_empty() {
            &args.include
        } else {
            &config.include
        };
        let exclude_globs: &[String] = if !args.exclude.is_empty() {
            &args.exclude
        } else {
            &config.exclude
        };

        Ok(Self {
            algorithm,
            jobs,
            follow_symlinks: args.follow_symlinks || config.follow_symlinks,
            hidden: args.hidden || config.hidden,
            skip_empty: args.skip_empty || config.skip_empty,
            include: build_globset(include_globs)?,
            exclude: build_globset(exclude_globs)?,
        })
    }

    fn file_included(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.is_match(name) {
            return false;
        }
        !self.exclude.is_match(name)
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }
}

// ── Warnings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A directory below the root could not be listed.
    UnlistableDir,
    /// A file could not be opened or read to the end.
    ReadFailed,
    /// A followed symlink leads back to one of its ancestors.
    SymlinkLoop,
    /// A followed symlink points at nothing.
    BrokenSymlink,
}

/// A per-entry problem. The entry is skipped and the walk continues.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub kind: WarningKind,
    pub message: String,
}

impl ScanWarning {
    fn from_walk_error(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let is_symlink = err
            .path()
            .and_then(|p| p.symlink_metadata().ok())
            .is_some_and(|m| m.file_type().is_symlink());
        let kind = if err.loop_ancestor().is_some() {
            WarningKind::SymlinkLoop
        } else if is_symlink && err.path().is_some_and(|p| !p.exists()) {
            WarningKind::BrokenSymlink
        } else {
            WarningKind::UnlistableDir
        };
        Self {
            path,
            kind,
            message: err.to_string(),
        }
    }

    fn read_failed(path: &Path, err: &std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: WarningKind::ReadFailed,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            WarningKind::UnlistableDir => "cannot list directory",
            WarningKind::ReadFailed => "cannot read file",
            WarningKind::SymlinkLoop => "symlink loop at",
            WarningKind::BrokenSymlink => "dangling symlink",
        };
        write!(f, "{} {}, skipping: {}", what, self.path.display(), self.message)
    }
}

// ── Observers ────────────────────────────────────────────────────────────────

/// Receives scan events on the accumulating thread.
pub trait ScanObserver {
    fn enter_dir(&mut self, _dir: &Path) {}
    fn file_digested(&mut self, _record: &FileRecord) {}
    fn warning(&mut self, _warning: &ScanWarning) {}
}

/// Reports through `tracing`: descent and digests at debug, problems at warn.
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn enter_dir(&mut self, dir: &Path) {
        tracing::debug!("descending into directory '{}'", dir.display());
    }

    fn file_digested(&mut self, record: &FileRecord) {
        tracing::debug!(
            "file '{}': hash = {}, {} bytes",
            record.path.display(),
            record.digest,
            record.size
        );
    }

    fn warning(&mut self, warning: &ScanWarning) {
        tracing::warn!("{warning}");
    }
}

pub struct ScanOutcome {
    pub tree: ScannedTree,
    pub warnings: Vec<ScanWarning>,
}

// ── Digest engine ────────────────────────────────────────────────────────────

enum Event {
    Dir(PathBuf),
    Record(FileRecord),
    Warning(ScanWarning),
}

/// Digest every regular file under `root`.
///
/// The directory walk feeds a pool of `opts.jobs` hashing threads; their
/// results are funneled through a bounded channel back to the calling
/// thread, which alone builds the index and talks to `observer`. Setting
/// `cancel` stops the walk and discards everything with
/// [`Error::Interrupted`].
pub fn digest_tree<O: ScanObserver>(
    root: &Path,
    opts: &ScanOptions,
    cancel: &AtomicBool,
    observer: &mut O,
) -> Result<ScanOutcome> {
    let root = open_root(root)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .thread_name(|i| format!("dircmp-hash-{i}"))
        .build()
        .map_err(|e| Error::config(format!("cannot start {} hashing threads: {e}", opts.jobs)))?;

    let mut index = HashIndex::new();
    let mut warnings = Vec::new();
    let (tx, rx) = mpsc::sync_channel::<Event>(CHANNEL_CAPACITY);

    std::thread::scope(|s| {
        let walk_root = root.clone();
        s.spawn(move || {
            pool.install(|| {
                walk(&walk_root, opts)
                    .take_while(|_| !cancel.load(Ordering::Relaxed))
                    .par_bridge()
                    .for_each_with(tx, |tx, entry| {
                        if cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        if let Some(event) = process_entry(entry, opts) {
                            // The receiver only hangs up once every sender is gone.
                            let _ = tx.send(event);
                        }
                    });
            });
        });

        for event in rx {
            match event {
                Event::Dir(dir) => observer.enter_dir(&dir),
                Event::Record(record) => {
                    observer.file_digested(&record);
                    index.insert(record);
                }
                Event::Warning(warning) => {
                    observer.warning(&warning);
                    warnings.push(warning);
                }
            }
        }
    });

    if cancel.load(Ordering::SeqCst) {
        return Err(Error::Interrupted);
    }

    Ok(ScanOutcome {
        tree: ScannedTree {
            root,
            algorithm: opts.algorithm,
            index,
        },
        warnings,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Canonical root, or a fatal error when the tree cannot be scanned at all.
fn open_root(root: &Path) -> Result<PathBuf> {
    let canonical = root
        .canonicalize()
        .map_err(|e| Error::path_access(root, e))?;
    let meta = std::fs::metadata(&canonical).map_err(|e| Error::path_access(&canonical, e))?;
    if !meta.is_dir() {
        return Err(Error::path_access(
            &canonical,
            std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
        ));
    }
    std::fs::read_dir(&canonical).map_err(|e| Error::path_access(&canonical, e))?;
    Ok(canonical)
}

fn walk<'a>(
    root: &Path,
    opts: &'a ScanOptions,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + Send + 'a {
    WalkDir::new(root)
        .follow_links(opts.follow_symlinks)
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0 || opts.hidden || !ScanOptions::is_hidden(&e.file_name().to_string_lossy())
        })
}

fn process_entry(entry: walkdir::Result<DirEntry>, opts: &ScanOptions) -> Option<Event> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => return Some(Event::Warning(ScanWarning::from_walk_error(e))),
    };

    // With follow_symlinks the file type is the link target's.
    let ft = entry.file_type();
    if ft.is_dir() {
        return Some(Event::Dir(entry.into_path()));
    }
    if !ft.is_file() {
        // Unfollowed symlinks, devices, sockets, FIFOs.
        tracing::debug!("skipping non-regular entry '{}'", entry.path().display());
        return None;
    }
    if !opts.file_included(&entry.file_name().to_string_lossy()) {
        return None;
    }

    match hash::digest_file(entry.path(), opts.algorithm) {
        Ok((_, 0)) if opts.skip_empty => None,
        Ok((digest, size)) => Some(Event::Record(FileRecord {
            path: entry.into_path(),
            size,
            digest,
        })),
        Err(e) => Some(Event::Warning(ScanWarning::read_failed(entry.path(), &e))),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let glob = Glob::new(p).map_err(|e| Error::config(format!("bad glob '{p}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("bad glob set: {e}")))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn scan(root: &Path) -> ScanOutcome {
        let cancel = AtomicBool::new(false);
        digest_tree(root, &ScanOptions::default(), &cancel, &mut LogObserver).unwrap()
    }

    fn create_tree() -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let d = tmp.path();
        fs::write(d.join("a.txt"), b"hello world\n").unwrap();
        fs::write(d.join("b.txt"), b"hello world\n").unwrap();
        fs::create_dir_all(d.join("nested/deeper")).unwrap();
        fs::write(d.join("nested/c.txt"), b"hello world\n").unwrap();
        fs::write(d.join("nested/deeper/unique.txt"), b"only once").unwrap();
        fs::write(d.join(".hidden.txt"), b"hello world\n").unwrap();
        fs::write(d.join("empty1"), b"").unwrap();
        fs::write(d.join("empty2"), b"").unwrap();
        tmp
    }

    #[derive(Default)]
    struct Recorder {
        dirs: usize,
        files: usize,
        warnings: usize,
    }

    impl ScanObserver for Recorder {
        fn enter_dir(&mut self, _dir: &Path) {
            self.dirs += 1;
        }
        fn file_digested(&mut self, _record: &FileRecord) {
            self.files += 1;
        }
        fn warning(&mut self, _warning: &ScanWarning) {
            self.warnings += 1;
        }
    }

    #[test]
    fn digests_every_visible_file() {
        let tmp = create_tree();
        let mut recorder = Recorder::default();
        let cancel = AtomicBool::new(false);
        let outcome =
            digest_tree(tmp.path(), &ScanOptions::default(), &cancel, &mut recorder).unwrap();

        let tree = &outcome.tree;
        assert_eq!(tree.root, tmp.path().canonicalize().unwrap());
        assert_eq!(tree.index.file_count(), 6);
        assert_eq!(recorder.files, 6);
        assert_eq!(recorder.dirs, 3);
        assert_eq!(recorder.warnings, 0);
        assert!(outcome.warnings.is_empty());
        assert!(tree.index.records().all(|r| r.path.starts_with(&tree.root)));

        let (hello, _) = hash::digest_reader(&b"hello world\n"[..], HashAlgorithm::Xxh64).unwrap();
        let bucket = tree.index.get(&hello).unwrap();
        assert_eq!(bucket.len(), 3);
        assert!(bucket.iter().all(|r| r.size == 12));
    }

    #[test]
    fn hidden_and_empty_policies() {
        let tmp = create_tree();
        let cancel = AtomicBool::new(false);
        let opts = ScanOptions {
            hidden: true,
            skip_empty: true,
            ..ScanOptions::default()
        };
        let outcome = digest_tree(tmp.path(), &opts, &cancel, &mut LogObserver).unwrap();
        assert_eq!(outcome.tree.index.file_count(), 5);
        assert!(outcome.tree.index.records().all(|r| r.size > 0));
    }

    #[test]
    fn include_and_exclude_globs() {
        let tmp = create_tree();
        let cancel = AtomicBool::new(false);
        let opts = ScanOptions {
            include: build_globset(&["*.txt".to_string()]).unwrap(),
            exclude: build_globset(&["unique*".to_string()]).unwrap(),
            ..ScanOptions::default()
        };
        let outcome = digest_tree(tmp.path(), &opts, &cancel, &mut LogObserver).unwrap();
        assert_eq!(outcome.tree.index.file_count(), 3);
        assert_eq!(outcome.tree.index.digest_count(), 1);
    }

    #[test]
    fn bad_glob_is_a_configuration_error() {
        let err = build_globset(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn same_result_regardless_of_pool_size() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..60 {
            let dir = tmp.path().join(format!("d{}", i % 7));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("f{i}")), format!("content {}", i % 11)).unwrap();
        }
        let cancel = AtomicBool::new(false);
        let single = ScanOptions {
            jobs: 1,
            ..ScanOptions::default()
        };
        let many = ScanOptions {
            jobs: 8,
            ..ScanOptions::default()
        };
        let a = digest_tree(tmp.path(), &single, &cancel, &mut LogObserver).unwrap();
        let b = digest_tree(tmp.path(), &many, &cancel, &mut LogObserver).unwrap();
        let c = digest_tree(tmp.path(), &many, &cancel, &mut LogObserver).unwrap();
        assert_eq!(a.tree, b.tree);
        assert_eq!(b.tree, c.tree);
        assert_eq!(a.tree.index.digest_count(), 11);
    }

    #[test]
    fn missing_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let err = digest_tree(
            &tmp.path().join("nope"),
            &ScanOptions::default(),
            &cancel,
            &mut LogObserver,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::PathAccess { .. }));
    }

    #[test]
    fn file_as_root_is_fatal() {
        let tmp = create_tree();
        let cancel = AtomicBool::new(false);
        let err = digest_tree(
            &tmp.path().join("a.txt"),
            &ScanOptions::default(),
            &cancel,
            &mut LogObserver,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::PathAccess { .. }));
    }

    #[test]
    fn cancelled_scan_returns_nothing() {
        let tmp = create_tree();
        let cancel = AtomicBool::new(true);
        let err = digest_tree(tmp.path(), &ScanOptions::default(), &cancel, &mut LogObserver)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Interrupted));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped_unless_followed() {
        let tmp = create_tree();
        std::os::unix::fs::symlink(tmp.path().join("a.txt"), tmp.path().join("link.txt"))
            .unwrap();
        let cancel = AtomicBool::new(false);

        let plain = digest_tree(tmp.path(), &ScanOptions::default(), &cancel, &mut LogObserver)
            .unwrap();
        assert_eq!(plain.tree.index.file_count(), 6);

        let opts = ScanOptions {
            follow_symlinks: true,
            ..ScanOptions::default()
        };
        let followed = digest_tree(tmp.path(), &opts, &cancel, &mut LogObserver).unwrap();
        assert_eq!(followed.tree.index.file_count(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_a_warning() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = create_tree();
        let locked = tmp.path().join("locked.txt");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // Running as root: permissions are not enforced.
            return;
        }

        let mut recorder = Recorder::default();
        let cancel = AtomicBool::new(false);
        let outcome =
            digest_tree(tmp.path(), &ScanOptions::default(), &cancel, &mut recorder).unwrap();
        assert_eq!(outcome.tree.index.file_count(), 6);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::ReadFailed);
        assert_eq!(recorder.warnings, 1);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_its_own_warning() {
        let tmp = create_tree();
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), tmp.path().join("dangling"))
            .unwrap();
        let cancel = AtomicBool::new(false);
        let opts = ScanOptions {
            follow_symlinks: true,
            ..ScanOptions::default()
        };
        let outcome = digest_tree(tmp.path(), &opts, &cancel, &mut LogObserver).unwrap();
        assert_eq!(outcome.tree.index.file_count(), 6);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::BrokenSymlink);
        assert!(outcome.warnings[0].to_string().starts_with("dangling symlink"));
    }
}
