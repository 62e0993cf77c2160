//! C8: the parallel search scheduler (§4.7).
//!
//! Built on the teacher's own `threadpool = "1.8.1"` dependency. Two pool
//! shapes are supported: a *fused* pool (Diana, where derivation is cheap
//! enough to share a pool with KV access) and a *two-stage* pipeline
//! (Sophos, where a CPU-heavy TDP-derivation pool is kept separate from an
//! I/O-bound access pool, §4.7's "derivation pool of size D, access pool of
//! size A"). Both report results through a single `crossbeam-channel`
//! carrying `PostJob` messages back to the caller, so nothing downstream
//! needs its own lock.

use std::sync::Arc;

/// A unit of work handed from the derivation stage to the access stage:
/// the derived token plus which logical item (leaf/TDP-step index) it
/// belongs to.
pub struct AccessJob<Tok> {
    pub token: Tok,
    pub derivation_index: usize,
}

/// A single resolved posting, travelling from the access stage back to the
/// caller.
pub struct PostJob {
    pub posting: u64,
}

/// A two-pool (or one-pool, if fused) search scheduler.
pub struct SearchScheduler {
    derivation_pool: threadpool::ThreadPool,
    access_pool: threadpool::ThreadPool,
}

impl SearchScheduler {
    /// A single pool serving both derivation and access tasks — Diana's
    /// case, where token derivation is a couple of PRG/hash calls and
    /// splitting it into its own pool would only add overhead.
    pub fn fused(workers: usize) -> Self {
        let pool = threadpool::ThreadPool::new(workers.max(1));
        SearchScheduler {
            derivation_pool: pool.clone(),
            access_pool: pool,
        }
    }

    /// Two independently sized pools — Sophos's case, where TDP evaluation
    /// (derivation) is CPU-heavy and KV lookups (access) are I/O-bound.
    pub fn two_stage(derivation_workers: usize, access_workers: usize) -> Self {
        SearchScheduler {
            derivation_pool: threadpool::ThreadPool::new(derivation_workers.max(1)),
            access_pool: threadpool::ThreadPool::new(access_workers.max(1)),
        }
    }

    /// Runs `num_items` independent (derive, access) pairs and returns every
    /// posting the access stage resolved, in unspecified order (§4.7: "no
    /// ordering guarantee"). `derive` and `access` run on the scheduler's
    /// two pools respectively; `access` returning `None` means the token
    /// had no matching entry in the store (a `MissingToken` condition the
    /// caller is expected to have already logged) and contributes nothing.
    pub fn search_parallel<Tok, D, A>(&self, num_items: usize, derive: D, access: A) -> Vec<u64>
    where
        Tok: Send + 'static,
        D: Fn(usize) -> Tok + Send + Sync + 'static,
        A: Fn(Tok) -> Option<u64> + Send + Sync + 'static,
    {
        let (post_tx, post_rx) = crossbeam_channel::bounded::<PostJob>(num_items.max(1));
        let derive = Arc::new(derive);
        let access = Arc::new(access);

        for i in 0..num_items {
            let derive = Arc::clone(&derive);
            let access = Arc::clone(&access);
            let access_pool = self.access_pool.clone();
            let post_tx = post_tx.clone();
            self.derivation_pool.execute(move || {
                let job = AccessJob {
                    token: derive(i),
                    derivation_index: i,
                };
                access_pool.execute(move || {
                    if let Some(posting) = access(job.token) {
                        let _ = post_tx.send(PostJob { posting });
                    }
                });
            });
        }
        drop(post_tx);

        self.derivation_pool.join();
        self.access_pool.join();
        post_rx.try_iter().map(|job| job.posting).collect()
    }

    /// Streaming variant of [`search_parallel`]: invokes `post_callback` once
    /// per resolved posting, possibly from any access-pool worker thread
    /// (§4.7: "the callback runs ... must not block it for long").
    pub fn search_parallel_callback<Tok, D, A, C>(
        &self,
        num_items: usize,
        derive: D,
        access: A,
        post_callback: C,
    ) where
        Tok: Send + 'static,
        D: Fn(usize) -> Tok + Send + Sync + 'static,
        A: Fn(Tok) -> Option<u64> + Send + Sync + 'static,
        C: Fn(u64) + Send + Sync + 'static,
    {
        let derive = Arc::new(derive);
        let access = Arc::new(access);
        let post_callback = Arc::new(post_callback);

        for i in 0..num_items {
            let derive = Arc::clone(&derive);
            let access = Arc::clone(&access);
            let post_callback = Arc::clone(&post_callback);
            let access_pool = self.access_pool.clone();
            self.derivation_pool.execute(move || {
                let job = AccessJob {
                    token: derive(i),
                    derivation_index: i,
                };
                access_pool.execute(move || {
                    if let Some(posting) = access(job.token) {
                        post_callback(posting);
                    }
                });
            });
        }
        self.derivation_pool.join();
        self.access_pool.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn fused_scheduler_resolves_every_item() {
        let scheduler = SearchScheduler::fused(4);
        let mut results = scheduler.search_parallel(
            100,
            |i| i as u64,
            |tok| Some(tok * 2),
        );
        results.sort_unstable();
        let expected: Vec<u64> = (0..100).map(|i| i * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn two_stage_scheduler_skips_none_results() {
        let scheduler = SearchScheduler::two_stage(2, 3);
        let mut results = scheduler.search_parallel(
            20,
            |i| i,
            |i| if i % 2 == 0 { Some(i as u64) } else { None },
        );
        results.sort_unstable();
        let expected: Vec<u64> = (0..20).step_by(2).map(|i| i as u64).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn callback_variant_invokes_once_per_resolved_posting() {
        let scheduler = SearchScheduler::fused(4);
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        scheduler.search_parallel_callback(
            50,
            |i| i as u64,
            |tok| Some(tok),
            move |_posting| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }
}
