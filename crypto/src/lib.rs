//! Facade over the engine's cryptographic primitives (§4.1): re-exports the
//! individual `ic-sse-crypto-internal-*` and `ic-sse-token-tree` crates, and
//! adds the one thing none of them own individually — a zeroizing root
//! secret from which per-scheme subkeys are derived by domain-separated PRF.

pub mod prf {
    pub use ic_sse_crypto_internal_prf::*;
}
pub mod prg {
    pub use ic_sse_crypto_internal_prg::*;
}
pub mod tdp {
    pub use ic_sse_crypto_internal_tdp::*;
}
pub mod punct {
    pub use ic_sse_crypto_internal_punct::*;
}
pub mod tree {
    pub use ic_sse_token_tree::*;
}

use prf::Prf;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// A 32-byte root secret. Every scheme's long-term key material is derived
/// from one of these via [`RootSecret::derive_subkey`], never used directly
/// as a PRF/PRG/TDP key itself.
#[derive(Clone)]
pub struct RootSecret([u8; 32]);

impl RootSecret {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        RootSecret(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        RootSecret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives a 32-byte subkey for a named purpose (e.g. `b"sophos-root"`,
    /// `b"diana-add"`, `b"janus-punct"`) via `PRF(root, label)`. Distinct
    /// labels yield independent-looking subkeys.
    pub fn derive_subkey(&self, label: &[u8]) -> [u8; 32] {
        Prf::new(&self.0).prf32(label)
    }
}

impl Drop for RootSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn subkeys_differ_by_label() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let root = RootSecret::generate(&mut rng);
        assert_ne!(root.derive_subkey(b"sophos"), root.derive_subkey(b"diana"));
    }

    #[test]
    fn subkeys_are_deterministic() {
        let root = RootSecret::from_bytes([7u8; 32]);
        assert_eq!(root.derive_subkey(b"x"), root.derive_subkey(b"x"));
    }
}
