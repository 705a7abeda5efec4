//! Checksum utility used for handoff verification on `Append`/`PositionedAppend`.
//!
//! Mirrors the shape of the teacher's `codec::traits::StorageCodec` seam — a
//! small, stateless, `Send + Sync`-free conversion keyed off a typed tag —
//! but here the tag selects a checksum algorithm instead of an encryption
//! scheme.

/// Checksum algorithm used for a handoff checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumType {
    /// No checksum requested; `compute` returns an empty digest.
    None,
    /// CRC32C (Castagnoli), the variant storage engines typically use.
    Crc32c,
    /// 32-bit xxHash.
    XxHash,
}

/// Compute a little-endian 4-byte digest of `bytes` under `ty`.
///
/// Returns an empty vector for [`ChecksumType::None`].
pub fn compute(ty: ChecksumType, bytes: &[u8]) -> Vec<u8> {
    match ty {
        ChecksumType::None => Vec::new(),
        ChecksumType::Crc32c => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(bytes);
            hasher.finalize().to_le_bytes().to_vec()
        }
        ChecksumType::XxHash => xxhash_rust::xxh32::xxh32(bytes, 0).to_le_bytes().to_vec(),
    }
}

/// Verify a caller-supplied checksum against the digest recomputed over `bytes`.
///
/// Returns `true` when `ty` is [`ChecksumType::None`] (nothing to verify) or
/// when the recomputed digest matches `caller_checksum` exactly.
pub fn verify(ty: ChecksumType, bytes: &[u8], caller_checksum: &[u8]) -> bool {
    if matches!(ty, ChecksumType::None) {
        return true;
    }
    compute(ty, bytes) == caller_checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_always_empty() {
        assert!(compute(ChecksumType::None, b"payload").is_empty());
    }

    #[test]
    fn crc32c_is_deterministic() {
        let a = compute(ChecksumType::Crc32c, b"payload");
        let b = compute(ChecksumType::Crc32c, b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn xxhash_is_deterministic() {
        let a = compute(ChecksumType::XxHash, b"payload");
        let b = compute(ChecksumType::XxHash, b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn different_algorithms_diverge() {
        let crc = compute(ChecksumType::Crc32c, b"payload");
        let xxh = compute(ChecksumType::XxHash, b"payload");
        assert_ne!(crc, xxh);
    }

    #[test]
    fn verify_accepts_matching_checksum() {
        let sum = compute(ChecksumType::Crc32c, b"payload");
        assert!(verify(ChecksumType::Crc32c, b"payload", &sum));
    }

    #[test]
    fn verify_rejects_mismatched_checksum() {
        assert!(!verify(ChecksumType::Crc32c, b"payload", &[0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn verify_ignores_mismatch_for_none_type() {
        assert!(verify(ChecksumType::None, b"payload", &[0xDE, 0xAD, 0xBE, 0xEF]));
    }
}
