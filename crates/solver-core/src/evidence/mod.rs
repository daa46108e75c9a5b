//! Evidence bundles: manifest assembly, hashing, and verification.
//!
//! An evidence bundle is a run directory holding the job's artifacts plus a
//! canonical-JSON manifest listing each artifact with its streamed SHA-256.
//! The manifest digest excludes `createdAt`, so the same artifact bytes
//! yield the same digest on any host at any time.
//!
//! [`builder`] produces bundles; [`validator`] is the independent verifier a
//! third party runs against a bundle it did not produce.

mod builder;
mod manifest;
mod validator;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest as _, Sha256};

pub use builder::{build_evidence, EvidenceError, EvidenceOutput, RunDescriptor};
pub use manifest::{
    content_type_for, manifest_digest, ArtifactEntry, EvidenceManifest, ExecStatus,
    ExecutionSummary, SolverInfo, MANIFEST_VERSION,
};
pub use validator::{validate_evidence, EvidenceReport, IntegrityError, IntegrityErrorCode};

/// Streaming read chunk size for artifact hashing.
const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Computes the SHA-256 and size of a file by streaming fixed-size chunks.
///
/// The file is never materialized in memory; bundles far larger than RAM
/// hash in constant space.
///
/// # Errors
///
/// Returns [`io::Error`] if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_file_matches_one_shot_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blob");
        // Larger than one chunk so the loop actually iterates.
        let content = vec![0xabu8; HASH_CHUNK_BYTES * 3 + 17];
        std::fs::write(&path, &content).unwrap();

        let (digest, size) = sha256_file(&path).unwrap();
        assert_eq!(size, content.len() as u64);
        assert_eq!(digest, hex::encode(Sha256::digest(&content)));
    }

    #[test]
    fn test_sha256_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        let (digest, size) = sha256_file(&path).unwrap();
        assert_eq!(size, 0);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
