use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher as _;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use twox_hash::XxHash64;

use crate::index::Digest;

const CHUNK_BYTES: usize = 64 * 1024; // 64 KB

/// Content digest used for every file of a tree.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// 64-bit xxHash: fast, not collision resistant.
    #[default]
    Xxh64,
    /// BLAKE3: slower, cryptographically strong.
    Blake3,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xxh64" => Ok(HashAlgorithm::Xxh64),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}

enum Engine {
    Xxh64(XxHash64),
    Blake3(Box<blake3::Hasher>),
}

impl Engine {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh64 => Engine::Xxh64(XxHash64::with_seed(0)),
            HashAlgorithm::Blake3 => Engine::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Engine::Xxh64(h) => h.write(data),
            Engine::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish(self) -> Digest {
        match self {
            Engine::Xxh64(h) => Digest::new(format!("{:016x}", h.finish())),
            Engine::Blake3(h) => Digest::new(h.finalize().to_hex().to_string()),
        }
    }
}

/// Digest of everything readable from `reader`, plus the number of bytes read.
pub fn digest_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> std::io::Result<(Digest, u64)> {
    let mut engine = Engine::new(algorithm);
    let mut buf = vec![0u8; CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        engine.update(&buf[..n]);
        total += n as u64;
    }
    Ok((engine.finish(), total))
}

/// Hash the entire file content in 64 KB chunks.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> std::io::Result<(Digest, u64)> {
    let file = std::fs::File::open(path)?;
    digest_reader(file, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_gives_equal_digest() {
        let a = digest_reader(&b"hello world\n"[..], HashAlgorithm::Xxh64).unwrap();
        let b = digest_reader(&b"hello world\n"[..], HashAlgorithm::Xxh64).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.1, 12);
        assert_eq!(a.0.as_str().len(), 16);
    }

    #[test]
    fn blake3_matches_one_shot_hash() {
        let data = vec![0xABu8; 3 * CHUNK_BYTES + 17];
        let (digest, size) = digest_reader(&data[..], HashAlgorithm::Blake3).unwrap();
        assert_eq!(size, data.len() as u64);
        assert_eq!(digest.as_str(), blake3::hash(&data).to_hex().as_str());
    }

    #[test]
    fn algorithms_disagree() {
        let (x, _) = digest_reader(&b"abc"[..], HashAlgorithm::Xxh64).unwrap();
        let (b, _) = digest_reader(&b"abc"[..], HashAlgorithm::Blake3).unwrap();
        assert_ne!(x, b);
    }

    #[test]
    fn empty_input() {
        let (_, size) = digest_reader(&b""[..], HashAlgorithm::Blake3).unwrap();
        assert_eq!(size, 0);
    }

    #[test]
    fn names_round_trip() {
        for algo in [HashAlgorithm::Xxh64, HashAlgorithm::Blake3] {
            assert_eq!(algo.name().parse::<HashAlgorithm>().unwrap(), algo);
        }
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
