//! Diana server (§4.5): encrypted store + covering-set expansion, with
//! fused-pool parallel search (derivation is cheap, §4.7).

use crate::derive::{derive_mask, derive_u};
use crate::wire::{SearchRequest, SetupMessage, UpdateRequest};
use ic_sse_config::create_state_dir;
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::EncryptedStore;
use ic_sse_logger::{info, EngineLogger};
use ic_sse_metrics::EngineMetrics;
use ic_sse_scheduler::SearchScheduler;
use ic_sse_token_tree::{derive_all_leaves, CoveringEntry, Node};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STORE_FILE: &str = "store.dat";
const WRAPPING_KEY_FILE: &str = "wrapping_key.key";

enum State {
    AwaitingSetup,
    Ready {
        dir: PathBuf,
        store: Arc<EncryptedStore<u64>>,
    },
}

pub struct DianaServer {
    state: State,
    logger: EngineLogger,
    metrics: Arc<EngineMetrics>,
}

impl DianaServer {
    pub fn open(dir: &Path, logger: EngineLogger, metrics: Arc<EngineMetrics>) -> EngineResult<Self> {
        let store = EncryptedStore::open(dir, STORE_FILE, logger.clone())?;
        Ok(DianaServer {
            state: State::Ready {
                dir: dir.to_path_buf(),
                store: Arc::new(store),
            },
            logger,
            metrics,
        })
    }

    pub fn new_uninitialized(logger: EngineLogger, metrics: Arc<EngineMetrics>) -> Self {
        DianaServer {
            state: State::AwaitingSetup,
            logger,
            metrics,
        }
    }

    pub fn setup(&mut self, dir: &Path, msg: SetupMessage) -> EngineResult<()> {
        if matches!(self.state, State::Ready { .. }) {
            return Err(EngineError::InvalidStateTransition(
                "setup received twice for this server",
            ));
        }
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::write(dir.join(WRAPPING_KEY_FILE), msg.wrapping_key)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let store = EncryptedStore::open(dir, STORE_FILE, self.logger.clone())?;
        self.state = State::Ready {
            dir: dir.to_path_buf(),
            store: Arc::new(store),
        };
        Ok(())
    }

    fn ready(&self) -> EngineResult<&Arc<EncryptedStore<u64>>> {
        match &self.state {
            State::Ready { store, .. } => Ok(store),
            State::AwaitingSetup => Err(EngineError::InvalidStateTransition(
                "search/insert before setup",
            )),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        match &self.state {
            State::Ready { dir, .. } => Some(dir.as_path()),
            State::AwaitingSetup => None,
        }
    }

    pub fn update(&self, req: UpdateRequest) -> EngineResult<()> {
        let store = self.ready()?;
        self.metrics.observe_update();
        store.insert(req.update_token.to_vec(), req.index)
    }

    pub fn bulk_update(&self, reqs: impl IntoIterator<Item = UpdateRequest>) -> EngineResult<()> {
        for req in reqs {
            self.update(req)?;
        }
        Ok(())
    }

    fn lookup(store: &EncryptedStore<u64>, leaf: &Node) -> Option<u64> {
        let u = derive_u(leaf);
        store.get(&u).map(|e| e ^ derive_mask(leaf))
    }

    /// §4.5 server search: enumerates every leaf under every covering-set
    /// entry via the depth-first tree walk.
    pub fn search(&self, req: &SearchRequest) -> EngineResult<Vec<u64>> {
        let store = self.ready()?;
        self.metrics.observe_search();
        if req.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = Vec::with_capacity(req.add_count as usize);
        for entry in &req.covering_set {
            derive_all_leaves(&entry.node, entry.node_depth, &mut |leaf| {
                match Self::lookup(store, &leaf) {
                    Some(ix) => results.push(ix),
                    None => {
                        self.metrics.observe_integrity_warning();
                        info!(self.logger, "missing token during Diana search");
                    }
                }
            });
        }
        Ok(results)
    }

    /// §4.5 parallel scheduling: splits leaves across a fused derivation+access
    /// pool, since derivation cost (one tree walk) is negligible.
    pub fn search_parallel(&self, req: &SearchRequest, threads: usize) -> EngineResult<Vec<u64>> {
        let store = self.ready()?;
        self.metrics.observe_search();
        if req.is_empty() {
            return Ok(Vec::new());
        }
        let leaves = enumerate_covering_set(&req.covering_set);
        let scheduler = SearchScheduler::fused(threads.max(1));
        let store = Arc::clone(store);
        let leaves_for_derive = leaves.clone();
        let results = scheduler.search_parallel(
            leaves.len(),
            move |i| leaves_for_derive[i],
            move |leaf| Self::lookup(&store, &leaf),
        );
        Ok(results)
    }
}

/// Expands a covering set into its full leaf list, in covering-set then
/// left-to-right order (§4.5: "leaf index order per thread").
fn enumerate_covering_set(entries: &[CoveringEntry]) -> Vec<Node> {
    let mut leaves = Vec::new();
    for entry in entries {
        derive_all_leaves(&entry.node, entry.node_depth, &mut |leaf| leaves.push(leaf));
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DianaClient;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn test_dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let client_dir = tmp.path().join("client");
        let server_dir = tmp.path().join("server");
        (tmp, client_dir, server_dir)
    }

    fn new_server() -> DianaServer {
        DianaServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()))
    }

    #[test]
    fn large_list_matches_set_between_sequential_and_parallel() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        let (client, setup_msg) = DianaClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir, setup_msg).unwrap();

        for ix in 0..1000u64 {
            let req = client.update_request(b"kw_1", ix).unwrap();
            server.update(req).unwrap();
        }
        let req = client.search_request(b"kw_1");
        let mut sequential = server.search(&req).unwrap();
        let mut parallel = server.search_parallel(&req, 8).unwrap();
        sequential.sort_unstable();
        parallel.sort_unstable();
        let expected: Vec<u64> = (0..1000).collect();
        assert_eq!(sequential, expected);
        assert_eq!(parallel, expected);
    }

    #[test]
    fn bulk_update_interleaves_keywords_correctly() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (client, setup_msg) = DianaClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir, setup_msg).unwrap();

        let items: Vec<(Vec<u8>, u64)> = (0..1000u64)
            .map(|i| (format!("kw_{}", i % 256).into_bytes(), i))
            .collect();
        let reqs = client.bulk_update_request(&items).unwrap();
        server.bulk_update(reqs).unwrap();

        for j in 0..256u64 {
            let req = client.search_request(format!("kw_{}", j).as_bytes());
            let mut results = server.search(&req).unwrap();
            results.sort_unstable();
            assert_eq!(results, vec![j, j + 256, j + 512, j + 768]);
        }
    }

    #[test]
    fn unknown_keyword_searches_empty() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let (client, setup_msg) = DianaClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir, setup_msg).unwrap();

        let req = client.search_request(b"never-inserted");
        assert!(server.search(&req).unwrap().is_empty());
    }
}
