//! C4: the range-constrained PRF ("token tree", §4.3).
//!
//! A binary tree of depth `D` rooted at a per-keyword 32-byte key. Children
//! of a node `K` are `PRG.derive(K, 0, 32)` (left) and `PRG.derive(K, 32,
//! 32)` (right) — i.e. one 64-byte PRG expansion split in half, ported
//! directly from the original `diane::TokenTree` (`derive_node`,
//! `covering_list_aux`, `derive_all_leaves_aux`, `derive_leftmost_node`).

use ic_sse_crypto_internal_prg::{self as prg, PrgKey};
use serde::{Deserialize, Serialize};

pub const NODE_BYTES: usize = 32;
pub type Node = [u8; NODE_BYTES];

const LEFT_OFFSET: u64 = 0;
const RIGHT_OFFSET: u64 = NODE_BYTES as u64;

fn child(parent: &Node, offset: u64) -> Node {
    let key: PrgKey = *parent;
    let mut out = [0u8; NODE_BYTES];
    prg::derive(&key, offset, &mut out);
    out
}

/// Walks from `root` down `depth` levels, taking the left child whenever the
/// corresponding bit of `index` (read MSB-first over a `depth`-bit window)
/// is 0, the right child otherwise.
pub fn derive_node(root: &Node, index: u64, depth: u8) -> Node {
    if depth == 0 {
        return *root;
    }
    let mut t = *root;
    let mut mask = 1u64 << (depth - 1);
    for _ in 0..depth {
        let offset = if index & mask == 0 {
            LEFT_OFFSET
        } else {
            RIGHT_OFFSET
        };
        t = child(&t, offset);
        mask >>= 1;
    }
    t
}

/// One entry of a covering list: a subtree root together with its depth
/// below `root` (so it spans `2^node_depth` leaves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveringEntry {
    pub node: Node,
    pub node_depth: u8,
}

/// Produces the smallest set of `(node, node_depth)` pairs whose induced
/// leaf set is exactly `{0, .., node_count - 1}` out of the `2^depth`-leaf
/// tree rooted at `root`. At most `depth` entries (§4.3).
///
/// Panics if `node_count` is 0 or exceeds `2^depth` — callers must check
/// `node_count > 0` themselves (mirrors the C++ `assert(node_count > 0)`).
pub fn covering_list(root: &Node, node_count: u64, depth: u8) -> Vec<CoveringEntry> {
    assert!(node_count > 0, "covering_list requires node_count > 0");
    let mut out = Vec::with_capacity(depth as usize);
    covering_list_aux(root, node_count, depth, &mut out);
    out
}

fn covering_list_aux(root: &Node, node_count: u64, depth: u8, out: &mut Vec<CoveringEntry>) {
    let siblings_count = 1u64 << depth;
    if node_count == siblings_count {
        out.push(CoveringEntry {
            node: *root,
            node_depth: depth,
        });
        return;
    }

    let left = child(root, LEFT_OFFSET);
    if node_count > siblings_count >> 1 {
        out.push(CoveringEntry {
            node: left,
            node_depth: depth - 1,
        });
        let right = child(root, RIGHT_OFFSET);
        covering_list_aux(&right, node_count - (siblings_count >> 1), depth - 1, out);
    } else {
        covering_list_aux(&left, node_count, depth - 1, out);
    }
}

/// Depth-first expansion of every leaf under `root` at depth `depth`,
/// invoking `cb` once per leaf in left-to-right order. `O(2^depth)` PRG
/// calls; derives both children of a node from a single 64-byte expansion.
pub fn derive_all_leaves(root: &Node, depth: u8, cb: &mut impl FnMut(Node)) {
    if depth == 0 {
        cb(*root);
        return;
    }
    derive_all_leaves_aux(root, depth, cb);
}

fn derive_all_leaves_aux(node: &Node, depth: u8, cb: &mut impl FnMut(Node)) {
    let left = child(node, LEFT_OFFSET);
    let right = child(node, RIGHT_OFFSET);
    if depth == 1 {
        cb(left);
        cb(right);
        return;
    }
    derive_all_leaves_aux(&left, depth - 1, cb);
    derive_all_leaves_aux(&right, depth - 1, cb);
}

/// Streams along the left spine of the tree rooted at `root`, handing each
/// right-sibling key (and its remaining depth) to `right_cb` so the caller
/// can enqueue it as separate recursive work (e.g. onto a thread pool).
/// Returns the leftmost leaf.
pub fn derive_leftmost_node(root: &Node, depth: u8, right_cb: &mut impl FnMut(Node, u8)) -> Node {
    if depth == 0 {
        return *root;
    }
    let mut t = *root;
    for i in 0..depth {
        let right = child(&t, RIGHT_OFFSET);
        let left = child(&t, LEFT_OFFSET);
        right_cb(right, depth - 1 - i);
        t = left;
    }
    t
}

/// Enumerates the leaf indices induced by a covering entry, for tests and
/// for callers that want `(leaf_index, leaf_node)` pairs rather than a raw
/// DFS callback.
pub fn leaf_range(entries: &[CoveringEntry]) -> u64 {
    entries.iter().map(|e| 1u64 << e.node_depth).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEST_DEPTH: u8 = 10; // small enough for exhaustive checks in tests

    fn root_key() -> Node {
        [0x42u8; NODE_BYTES]
    }

    #[test]
    fn derive_node_is_deterministic() {
        let root = root_key();
        assert_eq!(
            derive_node(&root, 7, TEST_DEPTH),
            derive_node(&root, 7, TEST_DEPTH)
        );
    }

    #[test]
    fn derive_node_depth_zero_is_identity() {
        let root = root_key();
        assert_eq!(derive_node(&root, 123, 0), root);
    }

    #[test]
    fn distinct_indices_give_distinct_leaves() {
        let root = root_key();
        let a = derive_node(&root, 3, TEST_DEPTH);
        let b = derive_node(&root, 4, TEST_DEPTH);
        assert_ne!(a, b);
    }

    #[test]
    fn covering_list_matches_derive_all_leaves_for_full_tree() {
        let root = root_key();
        let n = 1u64 << TEST_DEPTH;
        let entries = covering_list(&root, n, TEST_DEPTH);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].node_depth, TEST_DEPTH);

        let mut from_covering = Vec::new();
        for e in &entries {
            derive_all_leaves(&e.node, e.node_depth, &mut |leaf| from_covering.push(leaf));
        }
        let mut from_direct = Vec::new();
        for i in 0..n {
            from_direct.push(derive_node(&root, i, TEST_DEPTH));
        }
        assert_eq!(from_covering, from_direct);
    }

    proptest! {
        #[test]
        fn covering_list_leaf_count_matches_requested_n(n in 1u64..(1u64 << TEST_DEPTH)) {
            let root = root_key();
            let entries = covering_list(&root, n, TEST_DEPTH);
            prop_assert!(entries.len() as u8 <= TEST_DEPTH);
            prop_assert_eq!(leaf_range(&entries), n);
        }

        #[test]
        fn covering_list_union_equals_prefix_without_duplicates(n in 1u64..(1u64 << TEST_DEPTH)) {
            let root = root_key();
            let entries = covering_list(&root, n, TEST_DEPTH);

            let mut leaves = Vec::new();
            for e in &entries {
                derive_all_leaves(&e.node, e.node_depth, &mut |leaf| leaves.push(leaf));
            }

            let mut expected: Vec<Node> = (0..n).map(|i| derive_node(&root, i, TEST_DEPTH)).collect();
            let mut actual = leaves.clone();
            expected.sort();
            actual.sort();
            prop_assert_eq!(expected, actual);

            let unique: std::collections::HashSet<_> = leaves.iter().cloned().collect();
            prop_assert_eq!(unique.len(), leaves.len());
        }
    }

    #[test]
    fn leftmost_spine_plus_callbacks_cover_every_leaf() {
        let root = root_key();
        let mut collected = Vec::new();
        let mut right_cb = |node: Node, depth: u8| {
            derive_all_leaves(&node, depth, &mut |leaf| collected.push(leaf));
        };
        let leftmost = derive_leftmost_node(&root, TEST_DEPTH, &mut right_cb);
        collected.push(leftmost);

        let mut expected: Vec<Node> = (0..(1u64 << TEST_DEPTH))
            .map(|i| derive_node(&root, i, TEST_DEPTH))
            .collect();
        let mut actual = collected;
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual);
    }
}
