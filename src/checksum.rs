//! Pluggable integrity digest strategies.
//!
//! The engine stores a digest of each value's serialized bytes in the record
//! metadata and recomputes it on read. It only relies on determinism: equal
//! inputs must produce equal digests, and digest equality is treated as
//! sufficient for integrity.

/// Deterministic digest over a byte sequence.
pub trait Checksum {
    /// Compute the digest of `bytes`.
    fn digest(&self, bytes: &[u8]) -> u32;
}

/// CRC32 digest via `crc32fast`. The default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl Checksum for Crc32 {
    fn digest(&self, bytes: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(bytes);
        hasher.finalize()
    }
}
