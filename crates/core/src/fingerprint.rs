//! BLAKE3 content fingerprints
//!
//! Destinations use fingerprints to decide whether the remote copy already
//! matches the local file, so unchanged content is never transferred twice.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// A BLAKE3 digest of file content (32 bytes)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Short prefix for log lines
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint an in-memory buffer
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_bytes(*blake3::hash(data).as_bytes())
}

/// Fingerprint a file, streaming it through the hasher
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(Fingerprint::from_bytes(*hasher.finalize().as_bytes()))
}

/// Fingerprint a file that may still be written to
///
/// Stats the file before and after hashing; if size or mtime moved, the read
/// raced a writer and is retried with a short backoff (50ms, 100ms, ...).
/// Fails once `max_attempts` reads all raced.
pub fn fingerprint_file_stable(path: &Path, max_attempts: u8) -> Result<Fingerprint> {
    let attempts = max_attempts.max(1);

    for attempt in 0..attempts {
        let before = fs::metadata(path)
            .with_context(|| format!("Failed to stat (pre): {}", path.display()))?;

        let fingerprint = fingerprint_file(path)?;

        let after = fs::metadata(path)
            .with_context(|| format!("Failed to stat (post): {}", path.display()))?;

        if before.len() == after.len() && before.modified()? == after.modified()? {
            return Ok(fingerprint);
        }

        if attempt + 1 < attempts {
            sleep(Duration::from_millis(50 << attempt));
        }
    }

    anyhow::bail!(
        "File {} is unstable after {} read attempts (still being written)",
        path.display(),
        attempts
    )
}
