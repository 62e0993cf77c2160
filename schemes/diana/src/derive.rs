//! Shared client/server leaf derivation (§4.5 step 3): `u = BlockHash(leaf ||
//! 0x00)`, `m = BlockHash(leaf || 0x01)` truncated to 8 bytes (the posting
//! width).

use ic_sse_crypto_internal_prf::block_hash;
use ic_sse_token_tree::Node;

pub(crate) fn derive_u(leaf: &Node) -> [u8; 16] {
    let mut data = leaf.to_vec();
    data.push(0x00);
    block_hash(&data)
}

pub(crate) fn derive_mask(leaf: &Node) -> u64 {
    let mut data = leaf.to_vec();
    data.push(0x01);
    let full = block_hash(&data);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&full[..8]);
    u64::from_be_bytes(buf)
}
