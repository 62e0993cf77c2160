//! Sophos server (§4.4): encrypted store + TDP public key (with a worker
//! pool for parallel public evaluation) + scheduler.

use crate::derive::{derive_mask, derive_u};
use crate::wire::{SearchRequest, SetupMessage, UpdateRequest};
use ic_sse_config::{check_dir_has_required_permissions, create_state_dir};
use ic_sse_crypto_internal_tdp::{Seed, TdpPublicKey, TdpPublicKeyPool};
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::EncryptedStore;
use ic_sse_logger::{info, EngineLogger};
use ic_sse_metrics::EngineMetrics;
use ic_sse_scheduler::SearchScheduler;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TDP_PK_FILE: &str = "tdp_pk.key";
const STORE_FILE: &str = "store.dat";

enum State {
    AwaitingSetup,
    Ready {
        dir: PathBuf,
        store: Arc<EncryptedStore<u64>>,
        pk_pool: Arc<TdpPublicKeyPool>,
    },
}

pub struct SophosServer {
    state: State,
    logger: EngineLogger,
    metrics: Arc<EngineMetrics>,
}

impl SophosServer {
    /// Opens an existing server directory (`tdp_pk.key` + store already
    /// present).
    pub fn open(
        dir: &Path,
        workers: usize,
        logger: EngineLogger,
        metrics: Arc<EngineMetrics>,
    ) -> EngineResult<Self> {
        check_dir_has_required_permissions(dir);
        let pk_bytes = fs::read(dir.join(TDP_PK_FILE)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::missing_state(dir.join(TDP_PK_FILE))
            } else {
                EngineError::StorageUnavailable(e.to_string())
            }
        })?;
        let pk = TdpPublicKey::from_bytes(&pk_bytes)
            .ok_or_else(|| EngineError::corrupt_state(dir.join(TDP_PK_FILE), "malformed TDP public key"))?;
        let store = EncryptedStore::open(dir, STORE_FILE, logger.clone())?;
        Ok(SophosServer {
            state: State::Ready {
                dir: dir.to_path_buf(),
                store: Arc::new(store),
                pk_pool: Arc::new(TdpPublicKeyPool::new(pk, workers.max(1))),
            },
            logger,
            metrics,
        })
    }

    /// A brand-new server, refusing search/insert until `setup` arrives
    /// (§4.8: "refuses all search/insert calls until a setup message").
    pub fn new_uninitialized(logger: EngineLogger, metrics: Arc<EngineMetrics>) -> Self {
        SophosServer {
            state: State::AwaitingSetup,
            logger,
            metrics,
        }
    }

    /// Handles the client's setup message: creates `dir` (0700), persists
    /// the public key, and opens the store. A second setup is rejected
    /// (§4.8: "a second setup is a FailedPrecondition").
    pub fn setup(&mut self, dir: &Path, msg: SetupMessage, workers: usize) -> EngineResult<()> {
        if matches!(self.state, State::Ready { .. }) {
            return Err(EngineError::InvalidStateTransition(
                "setup received twice for this server",
            ));
        }
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::write(dir.join(TDP_PK_FILE), &msg.tdp_public_key)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let pk = TdpPublicKey::from_bytes(&msg.tdp_public_key)
            .ok_or_else(|| EngineError::InvalidArgument("malformed TDP public key in setup message".into()))?;
        let store = EncryptedStore::open(dir, STORE_FILE, self.logger.clone())?;
        self.state = State::Ready {
            dir: dir.to_path_buf(),
            store: Arc::new(store),
            pk_pool: Arc::new(TdpPublicKeyPool::new(pk, workers.max(1))),
        };
        Ok(())
    }

    fn ready(&self) -> EngineResult<(&Arc<EncryptedStore<u64>>, &Arc<TdpPublicKeyPool>)> {
        match &self.state {
            State::Ready { store, pk_pool, .. } => Ok((store, pk_pool)),
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
        let (store, _) = self.ready()?;
        self.metrics.observe_update();
        store.insert(req.update_token.to_vec(), req.index)
    }

    /// §4.4 single-threaded server search: walks newest-to-oldest via
    /// repeated public `π` evaluation, yielding each resolved posting to
    /// `on_posting` as it is found rather than materializing a list.
    ///
    /// `search_callback` (§4.4): runs entirely on the calling thread;
    /// `on_posting` must not block for long.
    pub fn search_callback(&self, req: &SearchRequest, mut on_posting: impl FnMut(u64)) -> EngineResult<()> {
        let (store, pk_pool) = self.ready()?;
        self.metrics.observe_search();
        if req.is_empty() {
            return Ok(());
        }
        let pk = pk_pool.key();
        let mut s = req.search_token.clone();
        for _ in 0..req.add_count {
            let u = derive_u(&req.derivation_key, &s);
            match store.get(&u) {
                Some(e) => on_posting(e ^ derive_mask(&req.derivation_key, &s)),
                None => {
                    self.metrics.observe_integrity_warning();
                    info!(self.logger, "missing token during Sophos search"; "token" => hex::encode(u));
                }
            }
            s = pk.public_eval(&s);
        }
        Ok(())
    }

    /// §4.4 single-threaded server search, materialized as a list.
    pub fn search(&self, req: &SearchRequest) -> EngineResult<Vec<u64>> {
        let mut results = Vec::with_capacity(req.add_count as usize);
        self.search_callback(req, |posting| results.push(posting))?;
        Ok(results)
    }

    /// §4.4 `search_parallel`: splits `add_count` steps across `threads`
    /// workers striding by `π^threads`, using the shared derivation+access
    /// scheduler. Derivation is precomputed by [`derive_striped_tokens`]
    /// first (thread `t` starts at `S_t = π^t(S_top)` and strides by
    /// `π^threads`), so the scheduler's per-item `derive` closure is a plain
    /// O(1) lookup rather than an O(i) recomputation from `S_top`.
    pub fn search_parallel(&self, req: &SearchRequest, threads: usize) -> EngineResult<Vec<u64>> {
        let (store, pk_pool) = self.ready()?;
        self.metrics.observe_search();
        if req.is_empty() {
            return Ok(Vec::new());
        }
        let pk = pk_pool.key();
        let threads = threads.max(1);
        let add_count = req.add_count as usize;
        let tokens = Arc::new(derive_striped_tokens(&pk, &req.search_token, add_count, threads));

        let scheduler = SearchScheduler::fused(threads);
        let derivation_key = req.derivation_key;
        let store = Arc::clone(store);

        let results = scheduler.search_parallel(
            add_count,
            move |i| tokens[i].clone(),
            move |token| {
                let u = derive_u(&derivation_key, &token);
                store.get(&u).map(|e| e ^ derive_mask(&derivation_key, &token))
            },
        );
        Ok(results)
    }

    /// §4.4 `search_parallel_light`: same per-thread striding as
    /// `search_parallel`, but each thread performs its own store lookups
    /// directly instead of handing them to a shared access pool — cheaper
    /// for small queries where pool task dispatch would dominate.
    pub fn search_parallel_light(&self, req: &SearchRequest, threads: usize) -> EngineResult<Vec<u64>> {
        let (store, pk_pool) = self.ready()?;
        self.metrics.observe_search();
        if req.is_empty() {
            return Ok(Vec::new());
        }
        let pk = pk_pool.key();
        let threads = threads.max(1).min(req.add_count.max(1) as usize);
        let add_count = req.add_count as usize;
        let derivation_key = req.derivation_key;
        let search_token = &req.search_token;
        let logger = &self.logger;
        let metrics = &self.metrics;

        let mut results = Vec::with_capacity(add_count);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let pk = Arc::clone(&pk);
                    let store = store;
                    scope.spawn(move || {
                        let mut local = Vec::new();
                        let mut s = pk.public_eval_k(search_token, t as u64);
                        let mut i = t;
                        loop {
                            let u = derive_u(&derivation_key, &s);
                            match store.get(&u) {
                                Some(e) => local.push(e ^ derive_mask(&derivation_key, &s)),
                                None => {
                                    metrics.observe_integrity_warning();
                                    info!(logger, "missing token during Sophos search_parallel_light"; "token" => hex::encode(u));
                                }
                            }
                            i += threads;
                            if i >= add_count {
                                break;
                            }
                            s = pk.public_eval_k(&s, threads as u64);
                        }
                        local
                    })
                })
                .collect();
            for handle in handles {
                results.extend(handle.join().expect("search_parallel_light worker panicked"));
            }
        });
        Ok(results)
    }
}

/// Precomputes every search token `S_0..S_{add_count-1}` needed by
/// `search_parallel`, striding `threads` ways (§4.4 "Thread t starts at
/// S_t = π^t(S_top) and strides by π^threads"): total derivation work is
/// O(threads · add_count) rather than the O(add_count²) of recomputing
/// each token from `S_top` independently.
fn derive_striped_tokens(pk: &TdpPublicKey, search_token: &[u8], add_count: usize, threads: usize) -> Vec<Seed> {
    let mut out: Vec<Seed> = vec![Vec::new(); add_count];
    if add_count == 0 {
        return out;
    }
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads.min(add_count))
            .map(|t| {
                scope.spawn(move || {
                    let mut entries = Vec::new();
                    let mut s = pk.public_eval_k(search_token, t as u64);
                    let mut i = t;
                    loop {
                        entries.push((i, s.clone()));
                        i += threads;
                        if i >= add_count {
                            break;
                        }
                        s = pk.public_eval_k(&s, threads as u64);
                    }
                    entries
                })
            })
            .collect();
        for handle in handles {
            for (i, s) in handle.join().expect("derivation worker panicked") {
                out[i] = s;
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SophosClient;
    use ic_sse_config::create_state_dir;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn test_dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let client_dir = tmp.path().join("client");
        let server_dir = tmp.path().join("server");
        (tmp, client_dir, server_dir)
    }

    #[test]
    fn setup_then_insert_then_search_roundtrips() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();

        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 2).unwrap();

        for ix in [0u64, 1] {
            let req = client.update_request(b"kw1", ix).unwrap();
            server.update(req).unwrap();
        }

        let req = client.search_request(b"kw1");
        let mut results = server.search(&req).unwrap();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1]);
    }

    #[test]
    fn unknown_keyword_searches_empty() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 1).unwrap();

        let req = client.search_request(b"never-inserted");
        assert!(server.search(&req).unwrap().is_empty());
    }

    #[test]
    fn second_setup_is_rejected() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (_client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg.clone(), 1).unwrap();
        let err = server.setup(&server_dir, setup_msg, 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition(_)));
    }

    #[test]
    fn parallel_and_sequential_search_agree() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 4).unwrap();

        for ix in 0..40u64 {
            let req = client.update_request(b"kw", ix).unwrap();
            server.update(req).unwrap();
        }
        let req = client.search_request(b"kw");
        let mut sequential = server.search(&req).unwrap();
        let mut parallel = server.search_parallel(&req, 4).unwrap();
        sequential.sort_unstable();
        parallel.sort_unstable();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn parallel_light_agrees_with_sequential_search() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 4).unwrap();

        for ix in 0..40u64 {
            let req = client.update_request(b"kw", ix).unwrap();
            server.update(req).unwrap();
        }
        let req = client.search_request(b"kw");
        let mut sequential = server.search(&req).unwrap();
        let mut light = server.search_parallel_light(&req, 4).unwrap();
        sequential.sort_unstable();
        light.sort_unstable();
        assert_eq!(sequential, light);
    }

    #[test]
    fn search_callback_invokes_once_per_posting() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 1).unwrap();

        for ix in 0..10u64 {
            let req = client.update_request(b"kw", ix).unwrap();
            server.update(req).unwrap();
        }
        let req = client.search_request(b"kw");
        let mut expected = server.search(&req).unwrap();

        let mut via_callback = Vec::new();
        server.search_callback(&req, |posting| via_callback.push(posting)).unwrap();

        expected.sort_unstable();
        via_callback.sort_unstable();
        assert_eq!(expected, via_callback);
    }

    #[test]
    fn search_parallel_light_with_more_threads_than_postings() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 1).unwrap();

        let req = client.update_request(b"kw", 0).unwrap();
        server.update(req).unwrap();

        let req = client.search_request(b"kw");
        let results = server.search_parallel_light(&req, 8).unwrap();
        assert_eq!(results, vec![0]);
    }

    #[test]
    fn restart_idempotence_matches_s4() {
        let (_tmp, client_dir, server_dir) = test_dirs();
        create_state_dir(&client_dir).ok();
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let (client, setup_msg) =
            SophosClient::setup(&client_dir, &mut rng, EngineLogger::no_op()).unwrap();
        let mut server = SophosServer::new_uninitialized(EngineLogger::no_op(), Arc::new(EngineMetrics::none()));
        server.setup(&server_dir, setup_msg, 2).unwrap();

        for (kw, ix) in [(b"kw_1".as_slice(), 0u64), (b"kw_1", 1), (b"kw_2", 0), (b"kw_3", 0)] {
            let req = client.update_request(kw, ix).unwrap();
            server.update(req).unwrap();
        }
        drop(client);
        drop(server);

        let client = SophosClient::open(&client_dir, EngineLogger::no_op()).unwrap();
        let server = SophosServer::open(&server_dir, 2, EngineLogger::no_op(), Arc::new(EngineMetrics::none())).unwrap();

        let mut kw1 = server.search(&client.search_request(b"kw_1")).unwrap();
        kw1.sort_unstable();
        assert_eq!(kw1, vec![0, 1]);
        assert_eq!(server.search(&client.search_request(b"kw_2")).unwrap(), vec![0]);
        assert_eq!(server.search(&client.search_request(b"kw_3")).unwrap(), vec![0]);
        assert!(server.search(&client.search_request(b"kw_4")).unwrap().is_empty());
    }
}
