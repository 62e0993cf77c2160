//! [`MaskedPayload`](crate::diana_core::MaskedPayload) implementations for
//! the two payload types *Janus*'s inner cores store: puncturable-encryption
//! ciphertexts (insertions) and key shares (deletions).

use crate::diana_core::MaskedPayload;
use ic_sse_crypto_internal_punct::{Ciphertext, KeyShare};
use ic_sse_token_tree::Node;

impl MaskedPayload for Ciphertext {
    const WIDTH: usize = 16;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.masked.to_be_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[0..8]);
        let mut masked = [0u8; 8];
        masked.copy_from_slice(&bytes[8..16]);
        Ciphertext {
            index: u64::from_be_bytes(index),
            masked: u64::from_be_bytes(masked),
        }
    }
}

/// Width accommodates the larger `Anchor(Node)` variant even though the
/// deletion store only ever persists `Puncture` shares in practice (the
/// anchor travels fresh on every search request, never through storage).
const KEY_SHARE_WIDTH: usize = 1 + ic_sse_token_tree::NODE_BYTES;

impl MaskedPayload for KeyShare {
    const WIDTH: usize = KEY_SHARE_WIDTH;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; KEY_SHARE_WIDTH];
        match self {
            KeyShare::Anchor(root) => {
                out[0] = 0;
                out[1..1 + ic_sse_token_tree::NODE_BYTES].copy_from_slice(root);
            }
            KeyShare::Puncture { excluded_index } => {
                out[0] = 1;
                out[1..9].copy_from_slice(&excluded_index.to_be_bytes());
            }
        }
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        if bytes[0] == 0 {
            let mut root: Node = [0u8; ic_sse_token_tree::NODE_BYTES];
            root.copy_from_slice(&bytes[1..1 + ic_sse_token_tree::NODE_BYTES]);
            KeyShare::Anchor(root)
        } else {
            let mut index = [0u8; 8];
            index.copy_from_slice(&bytes[1..9]);
            KeyShare::Puncture {
                excluded_index: u64::from_be_bytes(index),
            }
        }
    }
}
