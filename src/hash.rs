//! Streaming digests over evidence content.
//!
//! Content is consumed in fixed 5120-byte blocks so arbitrarily large
//! files never need to be resident in memory. Timing is reported per call
//! and aggregated into a per-run [`HashStats`] instead of any shared
//! mutable state.

use std::io::Read;
use std::time::{Duration, Instant};

use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Block size used when feeding a stream to a digest.
pub const HASH_BLOCK_SIZE: usize = 5120;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Name used for the `type` attribute of provenance hash nodes.
    pub fn label(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Result of hashing one stream: lowercase hex digest plus wall-clock time
/// spent reading and digesting.
#[derive(Debug, Clone)]
pub struct HashOutput {
    pub hex_digest: String,
    pub elapsed: Duration,
}

enum StreamHasher {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => StreamHasher::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => StreamHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, block: &[u8]) {
        match self {
            StreamHasher::Md5(ctx) => ctx.consume(block),
            StreamHasher::Sha1(hasher) => hasher.update(block),
            StreamHasher::Sha256(hasher) => hasher.update(block),
        }
    }

    fn finalize(self) -> String {
        match self {
            StreamHasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            StreamHasher::Sha1(hasher) => hex::encode(hasher.finalize()),
            StreamHasher::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Digest a stream in [`HASH_BLOCK_SIZE`] blocks until EOF.
pub fn hash_stream<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> Result<HashOutput, HashError> {
    let start = Instant::now();
    let mut hasher = StreamHasher::new(algorithm);
    let mut block = [0u8; HASH_BLOCK_SIZE];

    loop {
        let n = reader.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(HashOutput {
        hex_digest: hasher.finalize(),
        elapsed: start.elapsed(),
    })
}

/// Cumulative hash timing for one run, aggregated at the end instead of
/// being kept in process-wide accumulators.
#[derive(Debug, Default, Clone)]
pub struct HashStats {
    pub md5: Duration,
    pub sha1: Duration,
    pub sha256: Duration,
}

impl HashStats {
    pub fn record(&mut self, algorithm: HashAlgorithm, elapsed: Duration) {
        match algorithm {
            HashAlgorithm::Md5 => self.md5 += elapsed,
            HashAlgorithm::Sha1 => self.sha1 += elapsed,
            HashAlgorithm::Sha256 => self.sha256 += elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hashes_known_vectors() {
        let md5 = hash_stream(Cursor::new(b"abc"), HashAlgorithm::Md5).expect("md5");
        assert_eq!(md5.hex_digest, "900150983cd24fb0d6963f7d28e17f72");

        let sha1 = hash_stream(Cursor::new(b"abc"), HashAlgorithm::Sha1).expect("sha1");
        assert_eq!(sha1.hex_digest, "a9993e364706816aba3e25717850c26c9cd0d89d");

        let sha256 = hash_stream(Cursor::new(b"abc"), HashAlgorithm::Sha256).expect("sha256");
        assert_eq!(
            sha256.hex_digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hashes_empty_stream() {
        let out = hash_stream(Cursor::new(b""), HashAlgorithm::Md5).expect("md5");
        assert_eq!(out.hex_digest, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn multi_block_stream_matches_one_shot() {
        // Longer than one 5120-byte block so the loop runs more than once.
        let data = vec![0x5au8; HASH_BLOCK_SIZE * 3 + 17];
        let streamed = hash_stream(Cursor::new(&data), HashAlgorithm::Sha256).expect("stream");

        let mut hasher = Sha256::new();
        hasher.update(&data);
        assert_eq!(streamed.hex_digest, hex::encode(hasher.finalize()));
    }

    #[test]
    fn stats_accumulate_per_algorithm() {
        let mut stats = HashStats::default();
        stats.record(HashAlgorithm::Md5, Duration::from_millis(5));
        stats.record(HashAlgorithm::Md5, Duration::from_millis(7));
        stats.record(HashAlgorithm::Sha1, Duration::from_millis(3));
        assert_eq!(stats.md5, Duration::from_millis(12));
        assert_eq!(stats.sha1, Duration::from_millis(3));
        assert_eq!(stats.sha256, Duration::ZERO);
    }
}
