//! §6 external interfaces for *Sophos*, modeled as in-process structs a
//! transport layer out-of-tree would serialize.

use ic_sse_crypto_internal_tdp::DOMAIN_BYTES;
use serde::{Deserialize, Serialize};

/// Setup message: the server learns the client's TDP public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupMessage {
    pub tdp_public_key: Vec<u8>,
}

/// `update_token: 16B, index: u64` (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub update_token: [u8; 16],
    pub index: u64,
}

/// `add_count: u32, derivation_key: 16B, search_token: 256B` (§6). An
/// `add_count` of 0 denotes an empty request (keyword never updated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub add_count: u32,
    pub derivation_key: [u8; 16],
    pub search_token: Vec<u8>,
}

impl SearchRequest {
    pub fn empty() -> Self {
        SearchRequest {
            add_count: 0,
            derivation_key: [0u8; 16],
            search_token: vec![0u8; DOMAIN_BYTES],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add_count == 0
    }
}
