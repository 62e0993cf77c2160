//! *Janus* server (§4.6): two inner *Diana* cores (insertions, deletions)
//! plus a cache of assembled punctured keys keyed by `(keyword, deletion
//! add_count)` — safe because `add_count` only ever increases, so the key
//! space itself encodes freshness and no invalidation logic is needed.

use crate::diana_core::DianaCoreServer;
use crate::wire::{DeleteRequest, InsertRequest, SearchRequest};
use ic_sse_config::create_state_dir;
use ic_sse_crypto_internal_punct::{Ciphertext, KeyShare, PuncturedKey};
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::EncryptedStore;
use ic_sse_logger::EngineLogger;
use ic_sse_metrics::EngineMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ADD_STORE_FILE: &str = "add_store.dat";
const DEL_STORE_FILE: &str = "del_store.dat";

enum State {
    AwaitingSetup,
    Ready {
        dir: PathBuf,
        add_store: Arc<EncryptedStore<Ciphertext>>,
        del_store: Arc<EncryptedStore<KeyShare>>,
    },
}

pub struct JanusServer {
    state: State,
    key_cache: Mutex<HashMap<([u8; 16], u32), PuncturedKey>>,
    logger: EngineLogger,
    metrics: Arc<EngineMetrics>,
}

impl JanusServer {
    pub fn open(dir: &Path, logger: EngineLogger, metrics: Arc<EngineMetrics>) -> EngineResult<Self> {
        let add_store = EncryptedStore::open(dir, ADD_STORE_FILE, logger.clone())?;
        let del_store = EncryptedStore::open(dir, DEL_STORE_FILE, logger.clone())?;
        Ok(JanusServer {
            state: State::Ready {
                dir: dir.to_path_buf(),
                add_store: Arc::new(add_store),
                del_store: Arc::new(del_store),
            },
            key_cache: Mutex::new(HashMap::new()),
            logger,
            metrics,
        })
    }

    pub fn new_uninitialized(logger: EngineLogger, metrics: Arc<EngineMetrics>) -> Self {
        JanusServer {
            state: State::AwaitingSetup,
            key_cache: Mutex::new(HashMap::new()),
            logger,
            metrics,
        }
    }

    /// §6: Janus setup is implicit — no public material to receive, only a
    /// directory to create and the two inner stores to open.
    pub fn setup(&mut self, dir: &Path) -> EngineResult<()> {
        if matches!(self.state, State::Ready { .. }) {
            return Err(EngineError::InvalidStateTransition(
                "setup received twice for this server",
            ));
        }
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let add_store = EncryptedStore::open(dir, ADD_STORE_FILE, self.logger.clone())?;
        let del_store = EncryptedStore::open(dir, DEL_STORE_FILE, self.logger.clone())?;
        self.state = State::Ready {
            dir: dir.to_path_buf(),
            add_store: Arc::new(add_store),
            del_store: Arc::new(del_store),
        };
        Ok(())
    }

    fn ready(
        &self,
    ) -> EngineResult<(&Arc<EncryptedStore<Ciphertext>>, &Arc<EncryptedStore<KeyShare>>)> {
        match &self.state {
            State::Ready {
                add_store,
                del_store,
                ..
            } => Ok((add_store, del_store)),
            State::AwaitingSetup => Err(EngineError::InvalidStateTransition(
                "search/insert/delete before setup",
            )),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        match &self.state {
            State::Ready { dir, .. } => Some(dir.as_path()),
            State::AwaitingSetup => None,
        }
    }

    pub fn insert(&self, req: InsertRequest) -> EngineResult<()> {
        let (add_store, _) = self.ready()?;
        self.metrics.observe_update();
        DianaCoreServer::new(Arc::clone(add_store), self.logger.clone()).update(req)
    }

    pub fn delete(&self, req: DeleteRequest) -> EngineResult<()> {
        let (_, del_store) = self.ready()?;
        self.metrics.observe_update();
        DianaCoreServer::new(Arc::clone(del_store), self.logger.clone()).update(req)
    }

    /// §4.6 search: reconstructs (or reuses a cached) punctured key from the
    /// fresh anchor plus every puncture share recorded against this keyword
    /// in the deletion core, then uses it to decrypt every insertion-core
    /// ciphertext that the covering-set walk turns up.
    pub fn search(&self, req: &SearchRequest) -> EngineResult<Vec<u64>> {
        let (add_store, del_store) = self.ready()?;
        self.metrics.observe_search();

        let del_core = DianaCoreServer::new(Arc::clone(del_store), self.logger.clone());
        let del_shares = del_core.search(&req.s_del)?;

        let cache_key = (req.keyword_hash, req.s_del.add_count);
        let punctured_key = {
            let mut cache = self.key_cache.lock();
            if let Some(key) = cache.get(&cache_key) {
                key.clone()
            } else {
                let shares: Vec<KeyShare> = std::iter::once(req.first_share)
                    .chain(del_shares)
                    .collect();
                let key = PuncturedKey::from_shares(shares.iter()).ok_or_else(|| {
                    EngineError::InvalidArgument("search request carried no anchor share".into())
                })?;
                cache.insert(cache_key, key.clone());
                key
            }
        };

        let add_core = DianaCoreServer::new(Arc::clone(add_store), self.logger.clone());
        let cts = add_core.search(&req.s_add)?;
        Ok(cts
            .iter()
            .filter_map(|ct| punctured_key.decrypt(ct))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::JanusClient;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn test_dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let client_dir = tmp.path().join("client");
        let server_dir = tmp.path().join("server");
        (tmp, client_dir, server_dir)
    }

    fn new_server() -> JanusServer {
        JanusServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()))
    }

    fn results_as_set(v: Vec<u64>) -> Vec<u64> {
        let mut v = v;
        v.sort_unstable();
        v
    }

    #[test]
    fn deletion_removes_only_the_deleted_entry() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(20);
        let client = JanusClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir).unwrap();

        for (kw, ix) in [
            (b"kw_1".as_slice(), 0u64),
            (b"kw_1", 1),
            (b"kw_4", 1),
            (b"kw_4", 2),
            (b"kw_4", 3),
            (b"kw_5", 5),
        ] {
            server.insert(client.insert_request(kw, ix).unwrap()).unwrap();
        }

        for (kw, ix) in [(b"kw_4".as_slice(), 1u64), (b"kw_5", 5)] {
            server.delete(client.delete_request(kw, ix).unwrap()).unwrap();
        }

        let r4 = server.search(&client.search_request(b"kw_4")).unwrap();
        assert_eq!(results_as_set(r4), vec![2, 3]);

        let r5 = server.search(&client.search_request(b"kw_5")).unwrap();
        assert!(r5.is_empty());

        let r1 = server.search(&client.search_request(b"kw_1")).unwrap();
        assert_eq!(results_as_set(r1), vec![0, 1]);
    }

    #[test]
    fn unknown_keyword_searches_empty() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let client = JanusClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir).unwrap();

        let req = client.search_request(b"never-inserted");
        assert!(server.search(&req).unwrap().is_empty());
    }

    #[test]
    fn repeated_search_reuses_the_cached_punctured_key() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        let client = JanusClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = new_server();
        server.setup(&server_dir).unwrap();

        for ix in 0..5u64 {
            server.insert(client.insert_request(b"kw", ix).unwrap()).unwrap();
        }
        server.delete(client.delete_request(b"kw", 2).unwrap()).unwrap();

        let req = client.search_request(b"kw");
        let first = results_as_set(server.search(&req).unwrap());
        let second = results_as_set(server.search(&req).unwrap());
        assert_eq!(first, vec![0, 1, 3, 4]);
        assert_eq!(second, vec![0, 1, 3, 4]);
    }

    #[test]
    fn second_setup_is_rejected() {
        let (_tmp, _client_dir, server_dir) = test_dirs();
        let mut server = new_server();
        server.setup(&server_dir).unwrap();
        assert!(server.setup(&server_dir).is_err());
    }
}
