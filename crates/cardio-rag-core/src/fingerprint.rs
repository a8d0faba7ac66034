//! Content fingerprints for change detection.
//!
//! A fingerprint is the hex SHA-256 digest of a file's full contents plus
//! its byte length. Collisions are out of scope; the digest is only used to
//! decide whether a file changed since it was last indexed.

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub hash: String,
    pub size: u64,
}

/// Incremental fingerprint builder for streamed reads.
#[derive(Default)]
pub struct Fingerprinter {
    hasher: Sha256,
    size: u64,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.size += bytes.len() as u64;
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint {
            hash: hex::encode(self.hasher.finalize()),
            size: self.size,
        }
    }
}

/// Fingerprint an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut fp = Fingerprinter::new();
    fp.update(bytes);
    fp.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let fp = fingerprint_bytes(b"abc");
        assert_eq!(
            fp.hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.size, 3);
    }

    #[test]
    fn streamed_matches_whole() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut fp = Fingerprinter::new();
        for part in data.chunks(777) {
            fp.update(part);
        }
        assert_eq!(fp.finish(), fingerprint_bytes(&data));
    }

    #[test]
    fn one_byte_change_changes_hash() {
        let a = fingerprint_bytes(b"systolic 120");
        let b = fingerprint_bytes(b"systolic 121");
        assert_ne!(a.hash, b.hash);
        assert_eq!(a.size, b.size);
    }
}
