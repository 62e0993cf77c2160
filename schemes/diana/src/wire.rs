//! §6 external interfaces for *Diana*.

use ic_sse_token_tree::CoveringEntry;
use serde::{Deserialize, Serialize};

/// Setup message: a key the server uses if a compact wire encoding of the
/// covering list is in play (§6). This engine implements the canonical
/// explicit-entry-list encoding and never needs to unwrap the compact form,
/// but the field is carried so the wire shape matches the spec exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupMessage {
    pub wrapping_key: [u8; 32],
}

/// `update_token: 16B, index: u64` (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub update_token: [u8; 16],
    pub index: u64,
}

/// `add_count: u32, kw_token: 16B, constrained_rcprf` (§6). This engine
/// uses the canonical explicit-entry-list encoding for the covering set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub add_count: u32,
    pub kw_token: [u8; 16],
    pub covering_set: Vec<CoveringEntry>,
}

impl SearchRequest {
    pub fn empty() -> Self {
        SearchRequest {
            add_count: 0,
            kw_token: [0u8; 16],
            covering_set: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add_count == 0
    }
}
