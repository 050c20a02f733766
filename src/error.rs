use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Anything that only affects a single file is a
/// [`crate::scan::ScanWarning`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Contradictory or incomplete settings, detected before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tree root or snapshot file that cannot be used at all.
    #[error("cannot access {}: {source}", path.display())]
    PathAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {} has an unexpected format: {reason}", path.display())]
    SnapshotFormat { path: PathBuf, reason: String },

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn path_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathAccess {
            path: path.into(),
            source,
        }
    }

    pub fn snapshot_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::SnapshotFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Interrupted => crate::signal::EXIT_CODE_INTERRUPTED,
            _ => 1,
        }
    }
}
