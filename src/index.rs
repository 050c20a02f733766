use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::hash::HashAlgorithm;

/// Lowercase hex content digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn new(hex: impl Into<String>) -> Self {
        Digest(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub digest: Digest,
}

/// Digest → records sharing it.
///
/// Digests iterate in ascending order and each bucket is kept sorted by
/// path, so the same set of records always produces the same index no
/// matter in which order they were inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    buckets: BTreeMap<Digest, Vec<FileRecord>>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: FileRecord) {
        let bucket = self.buckets.entry(record.digest.clone()).or_default();
        match bucket.binary_search_by(|r| r.path.cmp(&record.path)) {
            // Same path seen twice (e.g. via a followed symlink): keep the first.
            Ok(_) => {}
            Err(pos) => bucket.insert(pos, record),
        }
    }

    pub fn get(&self, digest: &Digest) -> Option<&[FileRecord]> {
        self.buckets.get(digest).map(Vec::as_slice)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.buckets.contains_key(digest)
    }

    /// Buckets in ascending digest order.
    pub fn buckets(&self) -> impl Iterator<Item = (&Digest, &[FileRecord])> {
        self.buckets.iter().map(|(d, v)| (d, v.as_slice()))
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.buckets.values().flatten()
    }

    pub fn digest_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn file_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl FromIterator<FileRecord> for HashIndex {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut index = HashIndex::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

/// One tree's digest results: where it was taken and with which algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedTree {
    pub root: PathBuf,
    pub algorithm: HashAlgorithm,
    pub index: HashIndex,
}

impl ScannedTree {
    /// `path` relative to this tree's root, if it lies under it.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }
}
