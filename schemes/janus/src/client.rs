//! *Janus* client (§4.6): one master key, from which the tag key, the
//! puncturable-encryption seed, and the two inner *Diana* cores' root keys
//! are all derived.

use crate::diana_core::DianaCoreClient;
use crate::wire::{DeleteRequest, InsertRequest, SearchRequest};
use ic_sse_config::{check_dir_has_required_permissions, create_state_dir};
use ic_sse_crypto_internal_prf::{keyword_index, Prf};
use ic_sse_crypto_internal_punct as punct;
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::CounterMap;
use ic_sse_logger::EngineLogger;
use rand::{CryptoRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};

const JANUS_MASTER_FILE: &str = "janus_master.key";
const ADD_COUNTERS_FILE: &str = "add_counters.dat";
const DEL_COUNTERS_FILE: &str = "del_counters.dat";

pub struct JanusClient {
    dir: PathBuf,
    k_tag: [u8; 32],
    k_pe: [u8; 32],
    add_core: DianaCoreClient,
    del_core: DianaCoreClient,
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

fn tag_input(keyword: &[u8], ix: u64) -> Vec<u8> {
    let mut data = ix.to_be_bytes().to_vec();
    data.extend_from_slice(keyword);
    data
}

impl JanusClient {
    pub fn setup<R: RngCore + CryptoRng>(
        dir: &Path,
        rng: &mut R,
        logger: EngineLogger,
    ) -> EngineResult<Self> {
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let mut k_j = [0u8; 32];
        rng.fill_bytes(&mut k_j);
        fs::write(dir.join(JANUS_MASTER_FILE), k_j)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        Self::from_master_key(dir, &k_j, logger)
    }

    pub fn open(dir: &Path, logger: EngineLogger) -> EngineResult<Self> {
        check_dir_has_required_permissions(dir);
        let k_j_bytes = read_exact_file(&dir.join(JANUS_MASTER_FILE), 32)?;
        let mut k_j = [0u8; 32];
        k_j.copy_from_slice(&k_j_bytes);
        Self::from_master_key(dir, &k_j, logger)
    }

    fn from_master_key(dir: &Path, k_j: &[u8; 32], logger: EngineLogger) -> EngineResult<Self> {
        let k_tag = Prf::new(k_j).prf32(b"tag_derivation");
        let k_pe = Prf::new(k_j).prf32(b"punct_enc");
        let k_root_add = Prf::new(k_j).prf32(b"diana_add_root");
        let k_root_del = Prf::new(k_j).prf32(b"diana_del_root");
        let add_counters = CounterMap::open(dir, ADD_COUNTERS_FILE, logger.clone())?;
        let del_counters = CounterMap::open(dir, DEL_COUNTERS_FILE, logger.clone())?;
        Ok(JanusClient {
            dir: dir.to_path_buf(),
            k_tag,
            k_pe,
            add_core: DianaCoreClient::new(k_root_add, add_counters),
            del_core: DianaCoreClient::new(k_root_del, del_counters),
            logger,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn punct_root(&self, keyword: &[u8]) -> ic_sse_token_tree::Node {
        Prf::new(&self.k_pe).prf32(keyword)
    }

    /// §4.6 insertion: encrypts `ix` under a per-keyword puncturable root
    /// bound to a tag derived from `(ix, w)`, then submits the ciphertext
    /// as an update to the insertion core.
    pub fn insert_request(&self, keyword: &[u8], ix: u64) -> EngineResult<InsertRequest> {
        let root = self.punct_root(keyword);
        let tag = Prf::new(&self.k_tag).prf32(&tag_input(keyword, ix));
        let ct = punct::encrypt(&root, ix, &tag);
        self.add_core.update_request(keyword, ct)
    }

    /// §4.6 deletion: derives the same tag the matching insertion used,
    /// then submits an incremental puncture share to the deletion core.
    pub fn delete_request(&self, keyword: &[u8], ix: u64) -> EngineResult<DeleteRequest> {
        let tag = Prf::new(&self.k_tag).prf32(&tag_input(keyword, ix));
        let d = self.del_core.counter(keyword);
        let ks = punct::inc_puncture((d + 1) as u32, &tag);
        self.del_core.update_request(keyword, ks)
    }

    /// §4.6 search: a pair of inner search requests plus the fresh anchor
    /// share (the server never retains the puncturable root out-of-band).
    pub fn search_request(&self, keyword: &[u8]) -> SearchRequest {
        let s_add = self.add_core.search_request_with(keyword, true, &self.logger);
        let s_del = self.del_core.search_request_with(keyword, false, &self.logger);
        let root = self.punct_root(keyword);
        let first_share = punct::initial_keyshare(&root, s_del.add_count);
        SearchRequest {
            keyword_hash: keyword_index(keyword),
            s_add,
            s_del,
            first_share,
        }
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }
}
