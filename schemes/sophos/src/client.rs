//! Sophos client (§4.4): counter map + TDP private key + derivation keys.
//! Only the "compact" client variant is implemented (§9 Open Questions,
//! third bullet): tokens are recomputed from `h(w)` via the PRG rather than
//! cached per-keyword.

use crate::derive::{derive_mask, derive_u};
use crate::wire::{SearchRequest, SetupMessage, UpdateRequest};
use ic_sse_config::{check_dir_has_required_permissions, create_state_dir};
use ic_sse_crypto_internal_prf::{block_hash, Prf};
use ic_sse_crypto_internal_prg::{self as prg, PrgKey};
use ic_sse_crypto_internal_tdp::{generate_array, TdpPrivateKey, DOMAIN_BYTES};
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_kv::CounterMap;
use ic_sse_logger::EngineLogger;
use rand::{CryptoRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};

const TDP_SK_FILE: &str = "tdp_sk.key";
const DERIVATION_MASTER_FILE: &str = "derivation_master.key";
const RSA_PRG_FILE: &str = "rsa_prg.key";
const COUNTERS_FILE: &str = "counters.dat";

pub struct SophosClient {
    dir: PathBuf,
    counters: CounterMap,
    k_d: [u8; 32],
    k_pi: PrgKey,
    tdp_sk: TdpPrivateKey,
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

impl SophosClient {
    /// First-time setup: generates fresh keys, persists them under `dir`
    /// (created with mode 0700), and returns the message the server needs.
    pub fn setup<R: RngCore + CryptoRng>(
        dir: &Path,
        rng: &mut R,
        logger: EngineLogger,
    ) -> EngineResult<(Self, SetupMessage)> {
        create_state_dir(dir).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        let (tdp_sk, tdp_pk) = TdpPrivateKey::generate(rng);
        let mut k_d = [0u8; 32];
        rng.fill_bytes(&mut k_d);
        let mut k_pi: PrgKey = [0u8; 32];
        rng.fill_bytes(&mut k_pi);

        fs::write(dir.join(TDP_SK_FILE), tdp_sk.to_bytes())
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::write(dir.join(DERIVATION_MASTER_FILE), k_d)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::write(dir.join(RSA_PRG_FILE), k_pi)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;

        let counters = CounterMap::open(dir, COUNTERS_FILE, logger.clone())?;
        let client = SophosClient {
            dir: dir.to_path_buf(),
            counters,
            k_d,
            k_pi,
            tdp_sk,
            logger,
        };
        let setup_msg = SetupMessage {
            tdp_public_key: tdp_pk.to_bytes(),
        };
        Ok((client, setup_msg))
    }

    /// Re-opens a previously set-up client directory.
    pub fn open(dir: &Path, logger: EngineLogger) -> EngineResult<Self> {
        check_dir_has_required_permissions(dir);
        let tdp_sk_bytes = read_exact_file(&dir.join(TDP_SK_FILE), 2 * DOMAIN_BYTES + 8)?;
        let tdp_sk = TdpPrivateKey::from_bytes(&tdp_sk_bytes)
            .ok_or_else(|| EngineError::corrupt_state(dir.join(TDP_SK_FILE), "malformed TDP key"))?;
        let k_d_bytes = read_exact_file(&dir.join(DERIVATION_MASTER_FILE), 32)?;
        let mut k_d = [0u8; 32];
        k_d.copy_from_slice(&k_d_bytes);
        let k_pi_bytes = read_exact_file(&dir.join(RSA_PRG_FILE), 32)?;
        let mut k_pi: PrgKey = [0u8; 32];
        k_pi.copy_from_slice(&k_pi_bytes);

        let counters = CounterMap::open(dir, COUNTERS_FILE, logger.clone())?;
        Ok(SophosClient {
            dir: dir.to_path_buf(),
            counters,
            k_d,
            k_pi,
            tdp_sk,
            logger,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn k_w(&self, seed: &[u8; 16]) -> [u8; 16] {
        Prf::new(&self.k_d).prf16(seed)
    }

    /// `S_0 = TDP.generate_array(PRG(K_pi, h(w)), h(w))`: a per-keyword PRG
    /// key derived from `K_pi` expands to a TDP-domain-sized stream, reduced
    /// modulo the TDP modulus.
    fn initial_token(&self, seed: &[u8; 16]) -> Vec<u8> {
        let prg_key_w: PrgKey = Prf::new(&self.k_pi).prf32(seed);
        let mut stream = vec![0u8; DOMAIN_BYTES];
        prg::derive(&prg_key_w, 0, &mut stream);
        let pk = self.tdp_sk.public_key();
        generate_array(&pk, &stream)
    }

    /// §4.4 client update: derives the chain token for the next free slot,
    /// consumes it, and returns the request the server stores under `u`.
    pub fn update_request(&self, keyword: &[u8], ix: u64) -> EngineResult<UpdateRequest> {
        let seed = block_hash(keyword);
        let s0 = self.initial_token(&seed);
        let c = self.counters.get_and_increment(keyword)?;
        let s_star = if c == 0 {
            s0
        } else {
            self.tdp_sk.private_invert_k(&s0, c)
        };
        let k_w = self.k_w(&seed);
        let u = derive_u(&k_w, &s_star);
        let m = derive_mask(&k_w, &s_star);
        Ok(UpdateRequest {
            update_token: u,
            index: ix ^ m,
        })
    }

    /// §4.4 client search: reconstructs the newest chain token via
    /// `add_count - 1` private inversions.
    pub fn search_request(&self, keyword: &[u8]) -> SearchRequest {
        let seed = block_hash(keyword);
        let add_count = self.counters.get(keyword);
        if add_count == 0 {
            return SearchRequest::empty();
        }
        let s0 = self.initial_token(&seed);
        let s_top = self.tdp_sk.private_invert_k(&s0, add_count - 1);
        let k_w = self.k_w(&seed);
        SearchRequest {
            add_count: add_count as u32,
            derivation_key: k_w,
            search_token: s_top,
        }
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }
}
