//! §6 external interfaces for *Janus*. Setup carries no public material
//! (§6: "Janus: setup is implicit"); search requests wrap a pair of Diana
//! search requests plus one key share.

use crate::diana_core::InnerUpdateRequest;
use ic_sse_crypto_internal_punct::{Ciphertext, KeyShare};
use ic_sse_diana::SearchRequest as InnerSearchRequest;
use serde::{Deserialize, Serialize};

pub type InsertRequest = InnerUpdateRequest<Ciphertext>;
pub type DeleteRequest = InnerUpdateRequest<KeyShare>;

/// Pair of *Diana* search requests plus one initial key share (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword_hash: [u8; 16],
    pub s_add: InnerSearchRequest,
    pub s_del: InnerSearchRequest,
    pub first_share: KeyShare,
}

impl SearchRequest {
    pub fn is_empty(&self) -> bool {
        self.s_add.is_empty()
    }
}
