//! Diana client (§4.5): counter map + tree-root derivation key + per-keyword
//! opaque token key.

use crate::derive::{derive_mask, derive_u};
use crate::wire::{SearchRequest, SetupMessage, UpdateRequest};
use ic_sse_config::{check_dir_has_required_permissions, create_state_dir};
use ic_sse_crypto_internal_prf::{keyword_index, Prf};
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::CounterMap;
use ic_sse_logger::{info, EngineLogger};
use ic_sse_token_tree::{covering_list, derive_node, Node};
use rand::{CryptoRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};

/// Depth of the per-keyword token tree (§4.5: "depth 48").
pub const TREE_DEPTH: u8 = 48;

const MASTER_DERIVATION_FILE: &str = "master_derivation.key";
const KW_TOKEN_MASTER_FILE: &str = "kw_token_master.key";
const COUNTERS_FILE: &str = "counters.dat";

pub struct DianaClient {
    dir: PathBuf,
    counters: CounterMap,
    k_root: [u8; 32],
    k_kw: [u8; 32],
    logger: EngineLogger,
}

fn read_exact_file(path: &Path, expected_len: usize) -> EngineResult<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::missing_state(path)
        } else {
            EngineError::StorageUnavailable(e.to_string())
        }
    })?;
    if bytes.len() != expected_len {
        return Err(EngineError::corrupt_state(
            path,
            format!("expected {} bytes, found {}", expected_len, bytes.len()),
        ));
    }
    Ok(bytes)
}

impl DianaClient {
    pub fn setup<R: RngCore + CryptoRng>(
        dir: &Path,
        rng: &mut R,
        logger: EngineLogger,
    ) -> EngineResult<(Self, SetupMessage)> {
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let mut k_root = [0u8; 32];
        rng.fill_bytes(&mut k_root);
        let mut k_kw = [0u8; 32];
        rng.fill_bytes(&mut k_kw);
        let mut wrapping_key = [0u8; 32];
        rng.fill_bytes(&mut wrapping_key);

        fs::write(dir.join(MASTER_DERIVATION_FILE), k_root)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::write(dir.join(KW_TOKEN_MASTER_FILE), k_kw)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;

        let counters = CounterMap::open(dir, COUNTERS_FILE, logger.clone())?;
        let client = DianaClient {
            dir: dir.to_path_buf(),
            counters,
            k_root,
            k_kw,
            logger,
        };
        Ok((client, SetupMessage { wrapping_key }))
    }

    pub fn open(dir: &Path, logger: EngineLogger) -> EngineResult<Self> {
        check_dir_has_required_permissions(dir);
        let k_root_bytes = read_exact_file(&dir.join(MASTER_DERIVATION_FILE), 32)?;
        let mut k_root = [0u8; 32];
        k_root.copy_from_slice(&k_root_bytes);
        let k_kw_bytes = read_exact_file(&dir.join(KW_TOKEN_MASTER_FILE), 32)?;
        let mut k_kw = [0u8; 32];
        k_kw.copy_from_slice(&k_kw_bytes);

        let counters = CounterMap::open(dir, COUNTERS_FILE, logger.clone())?;
        Ok(DianaClient {
            dir: dir.to_path_buf(),
            counters,
            k_root,
            k_kw,
            logger,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn root_for(&self, seed: &[u8; 16]) -> Node {
        Prf::new(&self.k_root).prf32(seed)
    }

    fn kw_token_for(&self, seed: &[u8; 16]) -> [u8; 16] {
        Prf::new(&self.k_kw).prf16(seed)
    }

    /// §4.5 client update: derives the tree leaf for the next free slot.
    pub fn update_request(&self, keyword: &[u8], ix: u64) -> EngineResult<UpdateRequest> {
        let seed = keyword_index(keyword);
        let c = self.counters.get_and_increment(keyword)?;
        let root_w = self.root_for(&seed);
        let leaf = derive_node(&root_w, c, TREE_DEPTH);
        let u = derive_u(&leaf);
        let m = derive_mask(&leaf);
        Ok(UpdateRequest {
            update_token: u,
            index: ix ^ m,
        })
    }

    /// A batch of `(w, ix)` insertions, incrementing every keyword's counter
    /// under a single lock (§4.5 "Bulk update") before deriving any tokens.
    pub fn bulk_update_request(&self, items: &[(Vec<u8>, u64)]) -> EngineResult<Vec<UpdateRequest>> {
        let keys: Vec<Vec<u8>> = items.iter().map(|(w, _)| w.clone()).collect();
        let olds = self.counters.get_and_increment_batch(&keys)?;
        items
            .iter()
            .zip(olds)
            .map(|((w, ix), c)| {
                let seed = keyword_index(w);
                let root_w = self.root_for(&seed);
                let leaf = derive_node(&root_w, c, TREE_DEPTH);
                Ok(UpdateRequest {
                    update_token: derive_u(&leaf),
                    index: ix ^ derive_mask(&leaf),
                })
            })
            .collect()
    }

    /// §4.5 client search. `log_absent` controls whether an unknown keyword
    /// is logged at INFO (suppressed when Janus drives its inner deletion
    /// core, which legitimately has no deletions yet for most keywords).
    pub fn search_request_with(&self, keyword: &[u8], log_absent: bool) -> SearchRequest {
        let seed = keyword_index(keyword);
        let add_count = self.counters.get(keyword);
        if add_count == 0 {
            if log_absent {
                info!(self.logger, "search on a keyword with no recorded updates"; "keyword_hash" => hex::encode(seed));
            }
            return SearchRequest::empty();
        }
        let root_w = self.root_for(&seed);
        let covering_set = covering_list(&root_w, add_count, TREE_DEPTH);
        let kw_token = self.kw_token_for(&seed);
        SearchRequest {
            add_count: add_count as u32,
            kw_token,
            covering_set,
        }
    }

    pub fn search_request(&self, keyword: &[u8]) -> SearchRequest {
        self.search_request_with(keyword, true)
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }
}
