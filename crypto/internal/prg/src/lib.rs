//! PRG: expand a 32-byte key into an arbitrary pseudorandom stream.
//!
//! Built on `rand_chacha`'s `ChaCha20Rng` (the same crate the teacher's
//! `ic-crypto` pins as `rand_chacha = "0.3"`). `ChaCha20Rng` lets us seek to
//! an arbitrary word position in the keystream, which gives `derive(key,
//! offset, dst)` — a byte-offset read into the stream — without having to
//! materialize and discard a prefix.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Number of bytes in one ChaCha20 keystream word.
const WORD_BYTES: u64 = 4;

/// A 32-byte key keying a deterministic pseudorandom stream.
pub type PrgKey = [u8; 32];

/// Fills `dst` with `dst.len()` pseudorandom bytes drawn from the stream
/// keyed by `key`, starting at byte offset `offset`.
///
/// Panics if `key` is not exactly 32 bytes — a programmer error per the
/// primitives' infallibility contract (§4.1).
pub fn derive(key: &PrgKey, offset: u64, dst: &mut [u8]) {
    let word_pos = offset / WORD_BYTES;
    let skip = (offset % WORD_BYTES) as usize;

    let mut rng = ChaCha20Rng::from_seed(*key);
    rng.set_word_pos((word_pos as u128) * 4);

    if skip == 0 {
        rng.fill_bytes(dst);
        return;
    }
    let mut scratch = vec![0u8; skip + dst.len()];
    rng.fill_bytes(&mut scratch);
    dst.copy_from_slice(&scratch[skip..]);
}

/// Convenience: derive `N` bytes starting at stream offset 0.
pub fn expand<const N: usize>(key: &PrgKey) -> [u8; N] {
    let mut out = [0u8; N];
    derive(key, 0, &mut out);
    out
}

/// Deterministically samples a `len`-byte value from an external stream,
/// used by `TDP::generate_array(prg, seed)` (§4.1): rather than reading
/// directly off a raw PRG key, the scheme seeds a fresh stream from an
/// arbitrary `seed` blended with the `key`, so two different keywords never
/// collide even if the underlying PRG key is shared engine-wide.
pub fn derive_seeded(key: &PrgKey, seed: &[u8], dst: &mut [u8]) {
    let mut combined = [0u8; 32];
    let mut tmp_key = *key;
    for (i, b) in seed.iter().enumerate() {
        tmp_key[i % 32] ^= *b;
    }
    combined.copy_from_slice(&tmp_key);
    derive(&combined, 0, dst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_key_and_offset() {
        let key = [7u8; 32];
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        derive(&key, 32, &mut a);
        derive(&key, 32, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn different_offsets_differ() {
        let key = [7u8; 32];
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        derive(&key, 0, &mut a);
        derive(&key, 16, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn expand_matches_derive_from_zero() {
        let key = [3u8; 32];
        let expanded: [u8; 64] = expand(&key);
        let mut direct = [0u8; 64];
        derive(&key, 0, &mut direct);
        assert_eq!(expanded, direct);
    }

    #[test]
    fn unaligned_offset_is_consistent_with_aligned_prefix() {
        let key = [9u8; 32];
        let mut whole = [0u8; 40];
        derive(&key, 0, &mut whole);
        let mut tail = [0u8; 8];
        derive(&key, 32, &mut tail);
        assert_eq!(&whole[32..40], &tail[..]);
    }
}
