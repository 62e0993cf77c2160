//! PRF[n] and BlockHash/MultiHash primitives (§4.1), concretely instantiated
//! as HMAC-SHA-256 and a truncated SHA-256 compression function — mirroring
//! the teacher workspace's own `crypto/internal/crypto_lib/hmac` member.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// A keyed pseudorandom function. Deterministic and pseudorandom under the
/// key; output lengths used by the engine are 16 and 32 bytes (§4.1), but
/// `prf_bytes` supports arbitrary output length via counter-mode expansion.
#[derive(Clone)]
pub struct Prf {
    key: Vec<u8>,
}

impl Prf {
    /// Panics if `key` is empty — a programmer error, not a runtime one
    /// (§4.1's "primitives are infallible on valid-length inputs").
    pub fn new(key: &[u8]) -> Self {
        assert!(!key.is_empty(), "PRF key must not be empty");
        Prf { key: key.to_vec() }
    }

    /// 16-byte PRF output.
    pub fn prf16(&self, data: &[u8]) -> [u8; 16] {
        let full = self.prf32(data);
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    }

    /// 32-byte PRF output: one HMAC-SHA-256 evaluation.
    pub fn prf32(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(data);
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    /// Arbitrary-length PRF output via counter-mode expansion:
    /// `out = HMAC(key, data || 0) || HMAC(key, data || 1) || ...`, truncated
    /// to `len` bytes.
    pub fn prf_bytes(&self, data: &[u8], len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u32 = 0;
        while out.len() < len {
            let mut mac =
                HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.update(&counter.to_be_bytes());
            out.extend_from_slice(&mac.finalize().into_bytes());
            counter += 1;
        }
        out.truncate(len);
        out
    }
}

/// A fixed 16-byte collision-resistant hash used for `h(w)`, update tokens,
/// and masks — SHA-256 truncated to its first 16 bytes.
pub fn block_hash(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// A 128-bit collision-resistant hash of a keyword, `h(w)`.
pub fn keyword_index(keyword: &[u8]) -> [u8; 16] {
    block_hash(keyword)
}

/// A multi-block hash producing `n_blocks * 16` bytes without truncation
/// bias: each block re-hashes the previous digest together with a domain
/// separation tag and its block index, rather than truncating one wide hash
/// (which would let an attacker correlate adjacent blocks with a single
/// SHA-256 evaluation).
pub fn multi_hash(data: &[u8], n_blocks: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n_blocks * 16);
    let mut prev = block_hash(data);
    for i in 0..n_blocks {
        let mut hasher = Sha256::new();
        hasher.update(prev);
        hasher.update(b"sse-multi-hash");
        hasher.update((i as u32).to_be_bytes());
        let digest = hasher.finalize();
        let mut block = [0u8; 16];
        block.copy_from_slice(&digest[..16]);
        out.extend_from_slice(&block);
        prev = block;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prf_is_deterministic() {
        let prf = Prf::new(b"a secret key");
        assert_eq!(prf.prf16(b"hello"), prf.prf16(b"hello"));
        assert_eq!(prf.prf32(b"hello"), prf.prf32(b"hello"));
    }

    #[test]
    fn prf_differs_across_keys() {
        let a = Prf::new(b"key-a");
        let b = Prf::new(b"key-b");
        assert_ne!(a.prf32(b"same input"), b.prf32(b"same input"));
    }

    #[test]
    fn prf_bytes_truncates_to_requested_length() {
        let prf = Prf::new(b"key");
        let out = prf.prf_bytes(b"data", 50);
        assert_eq!(out.len(), 50);
        // deterministic prefix regardless of requested length
        let shorter = prf.prf_bytes(b"data", 20);
        assert_eq!(&out[..20], &shorter[..]);
    }

    #[test]
    fn block_hash_is_16_bytes_and_deterministic() {
        assert_eq!(block_hash(b"kw").len(), 16);
        assert_eq!(block_hash(b"kw"), block_hash(b"kw"));
        assert_ne!(block_hash(b"kw1"), block_hash(b"kw2"));
    }

    #[test]
    fn multi_hash_blocks_are_distinct() {
        let blocks = multi_hash(b"seed", 4);
        assert_eq!(blocks.len(), 64);
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(&blocks[i * 16..i * 16 + 16], &blocks[j * 16..j * 16 + 16]);
            }
        }
    }
}
