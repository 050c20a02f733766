use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::index::{Digest, HashIndex};

/// Files sharing both digest and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    pub digest: Digest,
    pub size: u64,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub sets: Vec<DuplicateSet>,
    /// Digests whose files have more than one distinct size.
    pub collisions: usize,
}

impl Detection {
    /// Number of files that could go away if every set kept one copy.
    pub fn redundant_files(&self) -> usize {
        self.sets.iter().map(|s| s.paths.len() - 1).sum()
    }

    pub fn redundant_bytes(&self) -> u64 {
        self.sets
            .iter()
            .map(|s| s.size * (s.paths.len() as u64 - 1))
            .sum()
    }
}

/// Partition every digest bucket by size. Size partitions with at least two
/// files are duplicate sets; a bucket with several sizes counts as one
/// hash collision and never yields a set spanning sizes.
pub fn detect(index: &HashIndex) -> Detection {
    let mut detection = Detection::default();

    for (digest, records) in index.buckets() {
        if records.len() < 2 {
            continue;
        }
        let mut by_size: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();
        for record in records {
            by_size.entry(record.size).or_default().push(record.path.clone());
        }
        tracing::debug!(%digest, sizes = by_size.len(), files = records.len(), "digest bucket");

        if by_size.len() > 1 {
            tracing::debug!(%digest, "hash collision: same digest, different sizes");
            detection.collisions += 1;
        }
        for (size, paths) in by_size {
            if paths.len() > 1 {
                detection.sets.push(DuplicateSet {
                    digest: digest.clone(),
                    size,
                    paths,
                });
            }
        }
    }

    detection
}
