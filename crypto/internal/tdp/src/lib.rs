//! TDP: a trapdoor permutation over a fixed-width domain (§4.1), concretely
//! instantiated as raw (unpadded) RSA exponentiation on the `rsa` crate —
//! the teacher's own `ic-crypto` dev-dependency (`rsa = "0.6.1"`). Raw RSA
//! is the textbook trapdoor permutation: `public_eval` is `s^e mod n`,
//! `private_invert` is `s^d mod n`, and both commute under repeated
//! application, which is exactly what the *Sophos* token chain needs.

use rand::{CryptoRng, RngCore};
use rsa::{BigUint, PublicKeyParts, RsaPrivateKey, RsaPublicKey};
use std::sync::Arc;

/// Bit size of the RSA modulus; gives a 256-byte domain (§4.1: "~256-byte domain").
pub const MODULUS_BITS: usize = 2048;
/// Width in bytes of one domain element / TDP seed.
pub const DOMAIN_BYTES: usize = MODULUS_BITS / 8;

fn to_fixed_be(value: &BigUint, width: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    assert!(raw.len() <= width, "value does not fit in {} bytes", width);
    let mut out = vec![0u8; width - raw.len()];
    out.extend_from_slice(&raw);
    out
}

/// A domain element / TDP seed, fixed at [`DOMAIN_BYTES`] bytes.
pub type Seed = Vec<u8>;

fn seed_to_biguint(seed: &[u8], n: &BigUint) -> BigUint {
    let value = BigUint::from_bytes_be(seed);
    &value % n
}

fn biguint_to_seed(value: &BigUint) -> Seed {
    to_fixed_be(value, DOMAIN_BYTES)
}

/// The public half: `π(s) = s^e mod n`.
#[derive(Clone)]
pub struct TdpPublicKey {
    n: BigUint,
    e: BigUint,
}

impl TdpPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != DOMAIN_BYTES + 8 {
            return None;
        }
        let n = BigUint::from_bytes_be(&bytes[..DOMAIN_BYTES]);
        let e = BigUint::from_bytes_be(&bytes[DOMAIN_BYTES..]);
        Some(TdpPublicKey { n, e })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = to_fixed_be(&self.n, DOMAIN_BYTES);
        out.extend_from_slice(&to_fixed_be(&self.e, 8));
        out
    }

    /// `π(s)`.
    pub fn public_eval(&self, s: &[u8]) -> Seed {
        let x = seed_to_biguint(s, &self.n);
        let y = x.modpow(&self.e, &self.n);
        biguint_to_seed(&y)
    }

    /// `π^k(s)`, k repeated public evaluations, batched as a single loop.
    pub fn public_eval_k(&self, s: &[u8], k: u64) -> Seed {
        let mut cur = s.to_vec();
        for _ in 0..k {
            cur = self.public_eval(&cur);
        }
        cur
    }
}

/// The private half: `π^{-1}(s) = s^d mod n`.
pub struct TdpPrivateKey {
    n: BigUint,
    d: BigUint,
    e: BigUint,
}

impl Drop for TdpPrivateKey {
    fn drop(&mut self) {
        // `BigUint` does not implement `Zeroize`; best-effort scrub of the
        // backing limb storage by overwriting with a fresh zero value.
        self.d = BigUint::from(0u32);
    }
}

impl TdpPrivateKey {
    /// Generates a fresh keypair via the system CSPRNG (§4.8: "generates keys
    /// via the system CSPRNG").
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> (TdpPrivateKey, TdpPublicKey) {
        let key = RsaPrivateKey::new(rng, MODULUS_BITS).expect("RSA key generation failed");
        let n = key.n().clone();
        let e = key.e().clone();
        let d = key.d().clone();
        let private = TdpPrivateKey {
            n: n.clone(),
            d,
            e: e.clone(),
        };
        let public = TdpPublicKey { n, e };
        (private, public)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 2 * DOMAIN_BYTES + 8 {
            return None;
        }
        let n = BigUint::from_bytes_be(&bytes[..DOMAIN_BYTES]);
        let d = BigUint::from_bytes_be(&bytes[DOMAIN_BYTES..2 * DOMAIN_BYTES]);
        let e = BigUint::from_bytes_be(&bytes[2 * DOMAIN_BYTES..]);
        Some(TdpPrivateKey { n, d, e })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = to_fixed_be(&self.n, DOMAIN_BYTES);
        out.extend_from_slice(&to_fixed_be(&self.d, DOMAIN_BYTES));
        out.extend_from_slice(&to_fixed_be(&self.e, 8));
        out
    }

    pub fn public_key(&self) -> TdpPublicKey {
        TdpPublicKey {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }

    /// `π^{-1}(s)`.
    pub fn private_invert(&self, s: &[u8]) -> Seed {
        let x = seed_to_biguint(s, &self.n);
        let y = x.modpow(&self.d, &self.n);
        biguint_to_seed(&y)
    }

    /// `π^{-k}(s)`.
    pub fn private_invert_k(&self, s: &[u8], k: u64) -> Seed {
        let mut cur = s.to_vec();
        for _ in 0..k {
            cur = self.private_invert(&cur);
        }
        cur
    }

    /// Samples a uniformly random domain element.
    pub fn sample<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Seed {
        let mut bytes = vec![0u8; DOMAIN_BYTES];
        rng.fill_bytes(&mut bytes);
        biguint_to_seed(&seed_to_biguint(&bytes, &self.n))
    }
}

/// Deterministically derives a domain element for a keyword seed from a PRG
/// stream, per `TDP::generate_array(prg, seed)` (§4.1): the keyword's raw
/// hash is expanded to [`DOMAIN_BYTES`] pseudorandom bytes and reduced into
/// the domain under the given public key's modulus.
pub fn generate_array(public_key: &TdpPublicKey, prg_stream: &[u8]) -> Seed {
    assert!(
        prg_stream.len() >= DOMAIN_BYTES,
        "PRG stream too short to fill the TDP domain"
    );
    biguint_to_seed(&seed_to_biguint(&prg_stream[..DOMAIN_BYTES], &public_key.n))
}

/// A cache of cloned public keys handed out to worker threads (§4.4 "TDP
/// with a public pool of pre-initialized worker contexts", §9 design note):
/// `RsaPublicKey`/`BigUint` evaluation is read-only and `Send + Sync`, so
/// cloning the (cheap) public key per task sidesteps any shared mutable
/// state — there is no pointer aliasing across thread boundaries to model.
pub struct TdpPublicKeyPool {
    key: Arc<TdpPublicKey>,
    pool: threadpool::ThreadPool,
}

impl TdpPublicKeyPool {
    pub fn new(key: TdpPublicKey, workers: usize) -> Self {
        TdpPublicKeyPool {
            key: Arc::new(key),
            pool: threadpool::ThreadPool::new(workers.max(1)),
        }
    }

    pub fn key(&self) -> Arc<TdpPublicKey> {
        Arc::clone(&self.key)
    }

    /// Evaluates `π` on every seed in `seeds`, fanning the work out across
    /// the pool and joining the results back in input order.
    pub fn public_eval_batch(&self, seeds: &[Seed]) -> Vec<Seed> {
        let (tx, rx) = crossbeam_channel::bounded(seeds.len());
        for (idx, seed) in seeds.iter().cloned().enumerate() {
            let key = Arc::clone(&self.key);
            let tx = tx.clone();
            self.pool.execute(move || {
                let out = key.public_eval(&seed);
                tx.send((idx, out)).expect("receiver dropped");
            });
        }
        drop(tx);
        let mut results: Vec<Option<Seed>> = vec![None; seeds.len()];
        for (idx, out) in rx.iter().take(seeds.len()) {
            results[idx] = Some(out);
        }
        results.into_iter().map(|r| r.expect("every index filled")).collect()
    }
}
