//! A *Diana* core (§4.5) generalized to an arbitrary fixed-width payload
//! instead of a 64-bit posting, so *Janus* can run two independent copies —
//! one storing puncturable-encryption ciphertexts (insertions), one storing
//! puncturable key shares (deletions) — over the same tree-derivation and
//! counter-map machinery as the standalone `ic-sse-diana` crate.
//!
//! The mask is generalized from a single `BlockHash`-truncated-to-8-bytes
//! output to `MultiHash` (§4.1: "a multi-block variant outputs a multiple
//! of 16 bytes without truncation bias"), expanded to the payload's width.

use ic_sse_crypto_internal_prf::{block_hash, keyword_index, multi_hash, Prf};
use ic_sse_diana::{SearchRequest, TREE_DEPTH};
use ic_sse_errors::EngineResult;
use ic_sse_kv::{CounterMap, EncryptedStore};
use ic_sse_logger::{info, EngineLogger};
use ic_sse_token_tree::{covering_list, derive_all_leaves, derive_node, Node};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// A payload a `DianaCore` can mask and store: fixed-width, symmetric under
/// XOR (`to_bytes`/`from_bytes` round-trip any byte string of `WIDTH`).
pub trait MaskedPayload: Clone + Send + Sync + 'static {
    const WIDTH: usize;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Self;
}

fn derive_u(leaf: &Node) -> [u8; 16] {
    let mut data = leaf.to_vec();
    data.push(0x00);
    block_hash(&data)
}

fn mask_stream(leaf: &Node, width: usize) -> Vec<u8> {
    let mut data = leaf.to_vec();
    data.push(0x01);
    let blocks = (width + 15) / 16;
    let mut stream = multi_hash(&data, blocks);
    stream.truncate(width);
    stream
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct InnerUpdateRequest<V> {
    pub update_token: [u8; 16],
    pub payload: V,
}

/// Client half: counter map plus a per-core tree-root derivation key.
pub struct DianaCoreClient {
    k_root: [u8; 32],
    counters: CounterMap,
}

impl DianaCoreClient {
    pub fn new(k_root: [u8; 32], counters: CounterMap) -> Self {
        DianaCoreClient { k_root, counters }
    }

    fn root_for(&self, seed: &[u8; 16]) -> Node {
        Prf::new(&self.k_root).prf32(seed)
    }

    pub fn update_request<V: MaskedPayload>(
        &self,
        keyword: &[u8],
        payload: V,
    ) -> EngineResult<InnerUpdateRequest<V>> {
        let seed = keyword_index(keyword);
        let c = self.counters.get_and_increment(keyword)?;
        let root_w = self.root_for(&seed);
        let leaf = derive_node(&root_w, c, TREE_DEPTH);
        let mask = mask_stream(&leaf, V::WIDTH);
        let masked = xor(&payload.to_bytes(), &mask);
        Ok(InnerUpdateRequest {
            update_token: derive_u(&leaf),
            payload: V::from_bytes(&masked),
        })
    }

    /// Current counter value for `keyword` — the count of prior updates to
    /// this core (used directly as the deletion ordinal, §4.6 step 1).
    pub fn counter(&self, keyword: &[u8]) -> u64 {
        self.counters.get(keyword)
    }

    pub fn root_for_keyword(&self, keyword: &[u8]) -> Node {
        self.root_for(&keyword_index(keyword))
    }

    pub fn search_request_with(&self, keyword: &[u8], log_absent: bool, logger: &EngineLogger) -> SearchRequest {
        let seed = keyword_index(keyword);
        let add_count = self.counters.get(keyword);
        if add_count == 0 {
            if log_absent {
                info!(logger, "search on a keyword with no recorded updates in this core");
            }
            return SearchRequest::empty();
        }
        let root_w = self.root_for(&seed);
        let covering_set = covering_list(&root_w, add_count, TREE_DEPTH);
        SearchRequest {
            add_count: add_count as u32,
            kw_token: [0u8; 16],
            covering_set,
        }
    }
}

/// Server half: a store of masked payloads, expanded by covering-set walk.
pub struct DianaCoreServer<V> {
    store: Arc<EncryptedStore<V>>,
    logger: EngineLogger,
}

impl<V: MaskedPayload + Serialize + DeserializeOwned> DianaCoreServer<V> {
    pub fn new(store: Arc<EncryptedStore<V>>, logger: EngineLogger) -> Self {
        DianaCoreServer { store, logger }
    }

    pub fn update(&self, req: InnerUpdateRequest<V>) -> EngineResult<()> {
        self.store.insert(req.update_token.to_vec(), req.payload)
    }

    fn lookup(&self, leaf: &Node) -> Option<V> {
        let u = derive_u(leaf);
        self.store.get(&u).map(|stored| {
            let mask = mask_stream(leaf, V::WIDTH);
            V::from_bytes(&xor(&stored.to_bytes(), &mask))
        })
    }

    pub fn search(&self, req: &SearchRequest) -> EngineResult<Vec<V>> {
        if req.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = Vec::with_capacity(req.add_count as usize);
        for entry in &req.covering_set {
            derive_all_leaves(&entry.node, entry.node_depth, &mut |leaf| match self.lookup(&leaf) {
                Some(v) => results.push(v),
                None => info!(self.logger, "missing token in an inner Diana core during Janus search"),
            });
        }
        Ok(results)
    }
}
