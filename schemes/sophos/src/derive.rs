//! Shared client/server token derivation (§4.4 step 5): `u = PRF_Kw(S||0x00)`,
//! `m = PRF_Kw(S||0x01)`.

use ic_sse_crypto_internal_prf::Prf;

pub(crate) fn derive_u(k_w: &[u8; 16], token: &[u8]) -> [u8; 16] {
    let mut data = token.to_vec();
    data.push(0x00);
    Prf::new(k_w).prf16(&data)
}

pub(crate) fn derive_mask(k_w: &[u8; 16], token: &[u8]) -> u64 {
    let mut data = token.to_vec();
    data.push(0x01);
    let bytes = Prf::new(k_w).prf_bytes(&data, 8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes);
    u64::from_be_bytes(buf)
}
