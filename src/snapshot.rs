//! Snapshot store: one tree's digest results in an SQLite file.
//!
//! Layout (version 1):
//!
//! ```text
//! snapshot(format, version, root, algorithm, created_at)   -- exactly one row
//! records(digest, path, size)
//! ```
//!
//! `root` and `path` are BLOBs holding the raw bytes of the OS path, so
//! names that are not valid UTF-8 survive a round trip.
//!
//! A snapshot is written to a `.partial` sibling and renamed into place only
//! once complete, so a reader sees either a whole snapshot or none.

use rusqlite::{params, Connection, OpenFlags};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::index::{Digest, FileRecord, HashIndex, ScannedTree};

const FORMAT: &str = "dircmp-snapshot";
const VERSION: i64 = 1;

/// Write `tree` to `path`, replacing any previous snapshot there.
pub fn save(path: &Path, tree: &ScannedTree) -> Result<()> {
    let partial = partial_path(path);
    if partial.exists() {
        std::fs::remove_file(&partial)?;
    }

    let written = write_partial(&partial, tree).and_then(|()| {
        std::fs::rename(&partial, path).map_err(|e| Error::path_access(path, e))
    });
    if written.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    written?;

    tracing::debug!(
        "saved snapshot of '{}' ({} files) to '{}'",
        tree.root.display(),
        tree.index.file_count(),
        path.display()
    );
    Ok(())
}

/// Read a snapshot written by [`save`]. Either the whole tree comes back or
/// the call fails; nothing partial is ever returned.
pub fn load(path: &Path) -> Result<ScannedTree> {
    std::fs::metadata(path).map_err(|e| Error::path_access(path, e))?;
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| Error::snapshot_format(path, e.to_string()))?;

    let (root, algorithm) = read_header(&conn).map_err(|e| e.at(path))?;
    let index = read_records(&conn, &root).map_err(|e| e.at(path))?;

    tracing::debug!(
        "loaded snapshot '{}': root '{}', {} files",
        path.display(),
        root.display(),
        index.file_count()
    );
    Ok(ScannedTree {
        root,
        algorithm,
        index,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_partial(partial: &Path, tree: &ScannedTree) -> Result<()> {
    let mut conn = Connection::open(partial).map_err(|e| match e {
        rusqlite::Error::SqliteFailure(..) => Error::path_access(
            partial,
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        ),
        other => other.into(),
    })?;
    conn.execute_batch(
        "
        CREATE TABLE snapshot (
            format     TEXT    NOT NULL,
            version    INTEGER NOT NULL,
            root       BLOB    NOT NULL,
            algorithm  TEXT    NOT NULL,
            created_at TEXT    NOT NULL
        );

        CREATE TABLE records (
            digest TEXT    NOT NULL,
            path   BLOB    NOT NULL UNIQUE,
            size   INTEGER NOT NULL
        );

        CREATE INDEX idx_records_digest ON records(digest);
        ",
    )?;

    let root = path_bytes(&tree.root, partial)?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO snapshot(format, version, root, algorithm, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            FORMAT,
            VERSION,
            root,
            tree.algorithm.name(),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO records(digest, path, size) VALUES(?1, ?2, ?3)")?;
        for record in tree.index.records() {
            let size = i64::try_from(record.size).map_err(|_| {
                Error::snapshot_format(partial, format!("size of {} too large", record.path.display()))
            })?;
            let path = path_bytes(&record.path, partial)?;
            stmt.execute(params![record.digest.as_str(), path, size])?;
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| Error::from(e))?;
    Ok(())
}

#[cfg(unix)]
fn path_bytes(path: &Path, _snapshot: &Path) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes().to_vec())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path, snapshot: &Path) -> Result<Vec<u8>> {
    path.to_str().map(|s| s.as_bytes().to_vec()).ok_or_else(|| {
        Error::snapshot_format(
            snapshot,
            format!("path {} is not valid UTF-8", path.display()),
        )
    })
}

#[cfg(unix)]
fn bytes_path(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn bytes_path(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(OsString::from(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Why a snapshot's tables could not be read back.
enum ReadError {
    Sql(rusqlite::Error),
    Invalid(String),
}

impl ReadError {
    fn at(self, path: &Path) -> Error {
        match self {
            ReadError::Sql(e) => Error::snapshot_format(path, e.to_string()),
            ReadError::Invalid(reason) => Error::snapshot_format(path, reason),
        }
    }
}

impl From<rusqlite::Error> for ReadError {
    fn from(e: rusqlite::Error) -> Self {
        ReadError::Sql(e)
    }
}

fn read_header(conn: &Connection) -> Result<(PathBuf, HashAlgorithm), ReadError> {
    let mut stmt = conn.prepare("SELECT format, version, root, algorithm FROM snapshot")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Vec<u8>>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let [(format, version, root, algorithm)] = <[_; 1]>::try_from(rows).map_err(|rows| {
        ReadError::Invalid(format!("expected one header row, found {}", rows.len()))
    })?;
    if format != FORMAT {
        return Err(ReadError::Invalid(format!("not a {FORMAT} file ('{format}')")));
    }
    if version != VERSION {
        return Err(ReadError::Invalid(format!("unsupported version {version}")));
    }
    let algorithm = algorithm.parse::<HashAlgorithm>().map_err(ReadError::Invalid)?;
    let root = bytes_path(root);
    if !root.is_absolute() {
        return Err(ReadError::Invalid(format!(
            "root '{}' is not absolute",
            root.display()
        )));
    }
    Ok((root, algorithm))
}

fn read_records(conn: &Connection, root: &Path) -> Result<HashIndex, ReadError> {
    let mut stmt = conn.prepare("SELECT digest, path, size FROM records")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Vec<u8>>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut index = HashIndex::new();
    for (digest, path, size) in rows {
        let path = bytes_path(path);
        if !path.starts_with(root) {
            return Err(ReadError::Invalid(format!(
                "record '{}' lies outside root '{}'",
                path.display(),
                root.display()
            )));
        }
        let size = u64::try_from(size).map_err(|_| {
            ReadError::Invalid(format!("negative size for '{}'", path.display()))
        })?;
        if digest.is_empty() {
            return Err(ReadError::Invalid(format!("empty digest for '{}'", path.display())));
        }
        index.insert(FileRecord {
            path,
            size,
            digest: Digest::new(digest),
        });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;

    fn sample_tree() -> ScannedTree {
        ScannedTree {
            root: PathBuf::from("/data/photos"),
            algorithm: HashAlgorithm::Blake3,
            index: [
                record("/data/photos/a.jpg", 10, "aa"),
                record("/data/photos/x/a.jpg", 10, "aa"),
                record("/data/photos/b.jpg", 20, "bb"),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn save_then_load_gives_the_same_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("photos.snapshot");
        let tree = sample_tree();

        save(&file, &tree).unwrap();
        assert!(!partial_path(&file).exists());
        assert_eq!(load(&file).unwrap(), tree);
    }

    #[test]
    fn save_replaces_existing_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("s.db");
        save(&file, &sample_tree()).unwrap();

        let mut smaller = sample_tree();
        smaller.index = [record("/data/photos/only.jpg", 1, "cc")].into_iter().collect();
        save(&file, &smaller).unwrap();
        assert_eq!(load(&file).unwrap(), smaller);
    }

    #[test]
    fn failed_save_leaves_no_file_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("missing-dir").join("s.db");
        assert!(save(&file, &sample_tree()).is_err());
        assert!(!file.exists());
        assert!(!partial_path(&file).exists());
    }

    #[test]
    fn missing_file_is_a_path_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(&tmp.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, Error::PathAccess { .. }));
    }

    #[test]
    fn foreign_file_is_a_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "this is not a snapshot, just some text\n".repeat(50)).unwrap();
        let err = load(&file).unwrap_err();
        assert!(matches!(err, Error::SnapshotFormat { .. }), "{err}");
    }

    #[test]
    fn other_sqlite_database_is_a_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("other.db");
        let conn = Connection::open(&file).unwrap();
        conn.execute_batch("CREATE TABLE files (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        drop(conn);
        let err = load(&file).unwrap_err();
        assert!(matches!(err, Error::SnapshotFormat { .. }));
    }

    #[test]
    fn wrong_version_or_duplicate_header_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("s.db");
        save(&file, &sample_tree()).unwrap();

        let conn = Connection::open(&file).unwrap();
        conn.execute("UPDATE snapshot SET version = 99", []).unwrap();
        drop(conn);
        assert!(matches!(load(&file).unwrap_err(), Error::SnapshotFormat { .. }));

        save(&file, &sample_tree()).unwrap();
        let conn = Connection::open(&file).unwrap();
        conn.execute(
            "INSERT INTO snapshot SELECT format, version, root, algorithm, created_at FROM snapshot",
            [],
        )
        .unwrap();
        drop(conn);
        assert!(matches!(load(&file).unwrap_err(), Error::SnapshotFormat { .. }));
    }

    #[test]
    fn record_outside_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("s.db");
        save(&file, &sample_tree()).unwrap();

        let conn = Connection::open(&file).unwrap();
        conn.execute(
            "INSERT INTO records(digest, path, size) VALUES('dd', CAST('/elsewhere/f' AS BLOB), 1)",
            [],
        )
        .unwrap();
        drop(conn);
        assert!(matches!(load(&file).unwrap_err(), Error::SnapshotFormat { .. }));
    }

    #[test]
    fn text_path_column_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("s.db");
        save(&file, &sample_tree()).unwrap();

        let conn = Connection::open(&file).unwrap();
        conn.execute(
            "INSERT INTO records(digest, path, size) VALUES('dd', '/data/photos/t', 1)",
            [],
        )
        .unwrap();
        drop(conn);
        assert!(matches!(load(&file).unwrap_err(), Error::SnapshotFormat { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_survive_a_round_trip() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("d");
        std::fs::create_dir(&dir).unwrap();
        let name = std::ffi::OsStr::from_bytes(b"caf\xE9.txt");
        if std::fs::write(dir.join(name), b"bytes").is_err() {
            // Filesystem insists on UTF-8 names.
            return;
        }

        let tree = crate::scan::tests::scan(&dir).tree;
        let file = tmp.path().join("s.db");
        save(&file, &tree).unwrap();
        let loaded = load(&file).unwrap();
        assert_eq!(loaded, tree);
        let path = &loaded.index.records().next().unwrap().path;
        assert_eq!(path.file_name(), Some(name));
        assert!(path.is_file());
    }
}
