//! GumTree node matching.
//!
//! Two-phase matching between a source and a target tree:
//! 1. Top-down: greedily match identical subtrees, tallest first, using the
//!    cached Merkle hashes as a fast path and deep equivalence as the
//!    authoritative check.
//! 2. Bottom-up: match the remaining internal nodes by the ratio of already
//!    mapped descendants, then recover their still-unmatched children.

use crate::{debug, trace};

use crate::ast::{Ast, NodeHash, NodeKind};
use crate::error::{Error, Result};
use core::cell::RefCell;
use core::mem::Discriminant;
use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

/// A bidirectional mapping between nodes of two trees.
/// Uses Vec for O(1) lookups indexed by NodeId.
#[derive(Debug, Default)]
pub struct Mapping {
    /// Source node to target node, indexed by the source NodeId.
    src_to_dst: Vec<Option<NodeId>>,
    /// Target node to source node, indexed by the target NodeId.
    dst_to_src: Vec<Option<NodeId>>,
    /// All mapped pairs, in insertion order.
    pairs: Vec<(NodeId, NodeId)>,
}

impl Mapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pair. Both endpoints must be unmapped; the mapping stays
    /// one-to-one by construction.
    #[inline]
    pub fn add(&mut self, src: NodeId, dst: NodeId) {
        let src_idx = usize::from(src);
        let dst_idx = usize::from(dst);
        if src_idx >= self.src_to_dst.len() {
            self.src_to_dst.resize(src_idx + 1, None);
        }
        if dst_idx >= self.dst_to_src.len() {
            self.dst_to_src.resize(dst_idx + 1, None);
        }
        self.src_to_dst[src_idx] = Some(dst);
        self.dst_to_src[dst_idx] = Some(src);
        self.pairs.push((src, dst));
    }

    /// Whether a source node is mapped.
    #[inline(always)]
    pub fn has_src(&self, src: NodeId) -> bool {
        self.src_to_dst
            .get(usize::from(src))
            .is_some_and(|opt| opt.is_some())
    }

    /// Whether a target node is mapped.
    #[inline(always)]
    pub fn has_dst(&self, dst: NodeId) -> bool {
        self.dst_to_src
            .get(usize::from(dst))
            .is_some_and(|opt| opt.is_some())
    }

    /// The target counterpart of a source node.
    #[inline(always)]
    pub fn get_dst(&self, src: NodeId) -> Option<NodeId> {
        self.src_to_dst.get(usize::from(src)).copied().flatten()
    }

    /// The source counterpart of a target node.
    #[inline(always)]
    pub fn get_src(&self, dst: NodeId) -> Option<NodeId> {
        self.dst_to_src.get(usize::from(dst)).copied().flatten()
    }

    /// All mapped pairs, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Number of mapped pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Configuration for the matching algorithm.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Minimum mapped-descendant ratio for a bottom-up match, inclusive.
    pub similarity_threshold: f64,

    /// Minimum subtree height considered for top-down matching. Smaller
    /// subtrees are left for the bottom-up phase.
    pub min_height: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            min_height: 1,
        }
    }
}

/// Computes the mapping between two trees using the GumTree algorithm.
///
/// Fails with [`Error::InvariantViolation`] if either tree contains
/// duplicate string ids, since the resulting edit script would be
/// ambiguous.
pub fn match_trees(source: &Ast, target: &Ast, config: &MatchConfig) -> Result<Mapping> {
    check_unique_ids(source)?;
    check_unique_ids(target)?;

    debug!(
        source_nodes = source.node_count(),
        target_nodes = target.node_count(),
        "match_trees start"
    );
    let mut mapping = Mapping::new();

    top_down_phase(source, target, &mut mapping, config);
    debug!(mapped = mapping.len(), "after top_down_phase");

    bottom_up_phase(source, target, &mut mapping, config);
    debug!(mapped = mapping.len(), "after bottom_up_phase");

    Ok(mapping)
}

fn check_unique_ids(tree: &Ast) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::default();
    for id in tree.nodes() {
        let node_id = tree.get(id).id.as_str();
        if !seen.insert(node_id) {
            return Err(Error::InvariantViolation(format!(
                "duplicate node id `{node_id}`"
            )));
        }
    }
    Ok(())
}

/// Phase 1: top-down matching of identical subtrees.
///
/// Source nodes are visited tallest-first (preorder within equal heights).
/// For each unmatched node, target candidates with the same subtree hash are
/// confirmed by deep equivalence, the earliest in target preorder wins, and
/// the two subtrees are then mapped node-for-node in lockstep.
fn top_down_phase(source: &Ast, target: &Ast, mapping: &mut Mapping, config: &MatchConfig) {
    trace!("top_down_phase start");

    // Target index by subtree hash, buckets in preorder.
    let mut dst_by_hash: HashMap<NodeHash, Vec<NodeId>> = HashMap::default();
    for dst in target.nodes() {
        dst_by_hash.entry(target.hash(dst)).or_default().push(dst);
    }

    // Taller subtrees first: matching them whole is worth more than any
    // combination of their parts.
    let mut by_height: Vec<NodeId> = source.nodes().collect();
    by_height.sort_by_key(|&id| core::cmp::Reverse(source.height(id)));

    for src in by_height {
        if mapping.has_src(src) || source.height(src) < config.min_height {
            continue;
        }

        let candidates = match dst_by_hash.get(&source.hash(src)) {
            Some(bucket) => bucket,
            None => continue,
        };
        // Hash equality is only a fast path; equivalence is authoritative.
        let found = candidates
            .iter()
            .find(|&&dst| !mapping.has_dst(dst) && source.equivalent(src, target, dst))
            .copied();

        if let Some(dst) = found {
            trace!(
                src = usize::from(src),
                kind = %source.get(src).kind,
                dst = usize::from(dst),
                "top_down: subtree match"
            );
            match_subtrees(source, target, src, dst, mapping);
        }
    }
}

/// Maps two equivalent subtrees node-for-node, in lockstep.
fn match_subtrees(source: &Ast, target: &Ast, src: NodeId, dst: NodeId, mapping: &mut Mapping) {
    if mapping.has_src(src) || mapping.has_dst(dst) {
        return;
    }
    mapping.add(src, dst);

    // Equivalent subtrees have identical shape, so positional zip is exact.
    let src_children: Vec<_> = source.children(src).collect();
    let dst_children: Vec<_> = target.children(dst).collect();
    for (src_child, dst_child) in src_children.into_iter().zip(dst_children.into_iter()) {
        match_subtrees(source, target, src_child, dst_child, mapping);
    }
}

/// Lazily computed descendant sets for nodes in a tree.
/// Only computes descendants for nodes that are actually scored.
struct LazyDescendantMap<'a> {
    tree: &'a Ast,
    cache: RefCell<HashMap<NodeId, HashSet<NodeId>>>,
}

impl<'a> LazyDescendantMap<'a> {
    fn new(tree: &'a Ast) -> Self {
        Self {
            tree,
            cache: RefCell::new(HashMap::default()),
        }
    }

    fn get_or_compute(
        &self,
        node_id: NodeId,
    ) -> impl core::ops::Deref<Target = HashSet<NodeId>> + '_ {
        if !self.cache.borrow().contains_key(&node_id) {
            let descendants: HashSet<NodeId> = self.tree.descendants(node_id).collect();
            self.cache.borrow_mut().insert(node_id, descendants);
        }
        core::cell::Ref::map(self.cache.borrow(), |m| &m[&node_id])
    }
}

/// Phase 2: bottom-up matching by descendant overlap.
///
/// Visits unmatched internal source nodes in postorder, so a node is scored
/// only after its descendants have had every chance to be mapped. A match is
/// accepted when the ratio of mapped descendant pairs to the larger of the
/// two descendant counts reaches the threshold; after each accepted pair the
/// still-unmatched children are recovered shallowly.
fn bottom_up_phase(source: &Ast, target: &Ast, mapping: &mut Mapping, config: &MatchConfig) {
    let desc_src = LazyDescendantMap::new(source);
    let desc_dst = LazyDescendantMap::new(target);

    // Target index by variant, buckets in preorder so ties resolve to the
    // earliest target position.
    let mut dst_by_variant: HashMap<Discriminant<NodeKind>, Vec<NodeId>> = HashMap::default();
    for dst in target.nodes() {
        dst_by_variant
            .entry(core::mem::discriminant(&target.get(dst).kind))
            .or_default()
            .push(dst);
    }

    let order: Vec<NodeId> = source.postorder().collect();
    for src in order {
        if mapping.has_src(src) {
            continue;
        }
        // Leaves are not scored directly; they are picked up by child
        // recovery once an ancestor pair is established.
        if source.child_count(src) == 0 {
            continue;
        }

        let variant = core::mem::discriminant(&source.get(src).kind);
        let candidates = match dst_by_variant.get(&variant) {
            Some(bucket) => bucket,
            None => continue,
        };

        let mut best: Option<(NodeId, f64)> = None;
        for &dst in candidates {
            if mapping.has_dst(dst) || target.child_count(dst) == 0 {
                continue;
            }
            let score = overlap_ratio(src, dst, mapping, &desc_src, &desc_dst);
            trace!(
                src = usize::from(src),
                kind = %source.get(src).kind,
                dst = usize::from(dst),
                score,
                "bottom_up: overlap score"
            );
            // Strictly greater keeps the earliest target on ties.
            if score >= config.similarity_threshold
                && best.map_or(true, |(_, best_score)| score > best_score)
            {
                best = Some((dst, score));
            }
        }

        if let Some((dst, score)) = best {
            trace!(
                src = usize::from(src),
                dst = usize::from(dst),
                score,
                "bottom_up: match"
            );
            mapping.add(src, dst);
            recover_children(source, target, src, dst, mapping);
        }
    }
}

/// Pairs the still-unmatched children of a mapped pair, then recurses into
/// each recovered pair.
///
/// Two passes: surface-equivalent children first, then same-slot children
/// (a field with the same name, or a literal) whose values differ. The
/// second pass is what lets a value edit surface as an update instead of a
/// delete/insert pair.
fn recover_children(source: &Ast, target: &Ast, src: NodeId, dst: NodeId, mapping: &mut Mapping) {
    let src_children: Vec<NodeId> = source
        .children(src)
        .filter(|&c| !mapping.has_src(c))
        .collect();
    let mut dst_free: Vec<NodeId> = target
        .children(dst)
        .filter(|&c| !mapping.has_dst(c))
        .collect();

    for &src_child in &src_children {
        let found = dst_free
            .iter()
            .position(|&dst_child| source.surface_equivalent(src_child, target, dst_child));
        if let Some(pos) = found {
            let dst_child = dst_free.remove(pos);
            mapping.add(src_child, dst_child);
            recover_children(source, target, src_child, dst_child, mapping);
        }
    }

    for &src_child in &src_children {
        if mapping.has_src(src_child) {
            continue;
        }
        let found = dst_free.iter().position(|&dst_child| {
            source
                .get(src_child)
                .kind
                .same_slot(&target.get(dst_child).kind)
        });
        if let Some(pos) = found {
            let dst_child = dst_free.remove(pos);
            mapping.add(src_child, dst_child);
            recover_children(source, target, src_child, dst_child, mapping);
        }
    }
}

/// Ratio of mapped descendant pairs to the larger descendant count.
///
/// The larger denominator makes the score symmetric and punishes matching a
/// small subtree against a much larger one. Two childless nodes score 1.0.
fn overlap_ratio(
    src: NodeId,
    dst: NodeId,
    mapping: &Mapping,
    desc_src_map: &LazyDescendantMap<'_>,
    desc_dst_map: &LazyDescendantMap<'_>,
) -> f64 {
    let desc_src = desc_src_map.get_or_compute(src);
    let desc_dst = desc_dst_map.get_or_compute(dst);

    let common = desc_src
        .iter()
        .filter(|&&s| {
            mapping
                .get_dst(s)
                .map(|d| desc_dst.contains(&d))
                .unwrap_or(false)
        })
        .count();

    let denom = desc_src.len().max(desc_dst.len());
    if denom == 0 {
        1.0
    } else {
        common as f64 / denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;

    fn motion_block(ast: &mut Ast, seq: NodeId, tag: &str, steps: &str) -> NodeId {
        let block = ast
            .add_block(seq, format!("b-{tag}"), "motion_movesteps", false)
            .unwrap();
        let input = ast
            .add_input(block, format!("i-{tag}"), "STEPS")
            .unwrap();
        ast.attach_literal(input, format!("l-{tag}"), steps).unwrap();
        block
    }

    fn two_block_script(tag: &str, steps: &str) -> Ast {
        let mut ast = Ast::new_program("PROGRAM");
        let seq = ast.add_sequence(ast.root(), format!("seq-{tag}")).unwrap();
        ast.add_block(seq, format!("e-{tag}"), "event_whenflagclicked", false)
            .unwrap();
        motion_block(&mut ast, seq, tag, steps);
        ast
    }

    fn three_block_script(tag: &str, steps: &str) -> Ast {
        let mut ast = Ast::new_program("PROGRAM");
        let seq = ast.add_sequence(ast.root(), format!("seq-{tag}")).unwrap();
        ast.add_block(seq, format!("e-{tag}"), "event_whenflagclicked", false)
            .unwrap();
        let say = ast.add_block(seq, format!("s-{tag}"), "looks_say", false).unwrap();
        let msg = ast.add_input(say, format!("m-{tag}"), "MESSAGE").unwrap();
        ast.attach_literal(msg, format!("ml-{tag}"), "hi").unwrap();
        motion_block(&mut ast, seq, tag, steps);
        ast
    }

    #[test]
    fn identical_trees_map_completely() {
        let source = two_block_script("a", "10");
        let target = two_block_script("b", "10");

        let mapping = match_trees(&source, &target, &MatchConfig::default()).unwrap();
        assert_eq!(mapping.len(), source.node_count());
        for src in source.nodes() {
            assert!(mapping.has_src(src));
        }
    }

    #[test]
    fn mapping_is_one_to_one() {
        let source = two_block_script("a", "10");
        let target = two_block_script("b", "10");

        let mapping = match_trees(&source, &target, &MatchConfig::default()).unwrap();
        let mut seen_dst: std::collections::HashSet<NodeId> = Default::default();
        for (_, dst) in mapping.pairs() {
            assert!(seen_dst.insert(dst), "target node mapped twice");
        }
    }

    #[test]
    fn value_edit_recovers_as_mapped_pair() {
        let source = three_block_script("a", "10");
        let target = three_block_script("b", "25");

        let mapping = match_trees(&source, &target, &MatchConfig::default()).unwrap();

        // The edited literal still maps, so the diff can express an update.
        let src_lit = source.find("l-a").unwrap();
        let dst_lit = target.find("l-b").unwrap();
        assert_eq!(mapping.get_dst(src_lit), Some(dst_lit));
        assert_eq!(mapping.len(), source.node_count());
    }

    #[test]
    fn added_subtree_stays_unmapped() {
        let source = two_block_script("a", "10");
        let mut target = two_block_script("b", "10");
        let seq2 = target.add_sequence(target.root(), "seq2").unwrap();
        let wait = target
            .add_block(seq2, "b-wait", "control_wait", false)
            .unwrap();
        let dur = target.add_input(wait, "i-wait", "DURATION").unwrap();
        target.attach_literal(dur, "l-wait", "1").unwrap();

        let mapping = match_trees(&source, &target, &MatchConfig::default()).unwrap();

        assert_eq!(mapping.len(), source.node_count());
        for dst in target.nodes_of(seq2) {
            assert!(!mapping.has_dst(dst), "added node must stay unmapped");
        }
        // Roots still match: 6 of the 11 target nodes are shared.
        assert_eq!(mapping.get_dst(source.root()), Some(target.root()));
    }

    #[test]
    fn relocated_block_keeps_its_mapping() {
        // Source: seq1 [flag, move], seq2 [wait]
        // Target: seq1 [flag, move], seq2 [], wait moved under seq1? No:
        // wait moves from seq2 to seq1 while both sequences keep an anchor.
        let mut source = two_block_script("a", "10");
        let seq2_src = source.add_sequence(source.root(), "seq2-a").unwrap();
        let say_src = source.add_block(seq2_src, "s-a", "looks_say", false).unwrap();
        let msg = source.add_input(say_src, "si-a", "MESSAGE").unwrap();
        source.attach_literal(msg, "sl-a", "hi").unwrap();
        let wait_src = source
            .add_block(seq2_src, "w-a", "control_wait", false)
            .unwrap();
        let dur = source.add_input(wait_src, "wi-a", "DURATION").unwrap();
        source.attach_literal(dur, "wl-a", "1").unwrap();

        let mut target = two_block_script("b", "10");
        let seq1_dst = target.find("seq-b").unwrap();
        let wait_dst = target
            .add_block(seq1_dst, "w-b", "control_wait", false)
            .unwrap();
        let dur = target.add_input(wait_dst, "wi-b", "DURATION").unwrap();
        target.attach_literal(dur, "wl-b", "1").unwrap();
        let seq2_dst = target.add_sequence(target.root(), "seq2-b").unwrap();
        let say_dst = target.add_block(seq2_dst, "s-b", "looks_say", false).unwrap();
        let msg = target.add_input(say_dst, "si-b", "MESSAGE").unwrap();
        target.attach_literal(msg, "sl-b", "hi").unwrap();

        let mapping = match_trees(&source, &target, &MatchConfig::default()).unwrap();

        assert_eq!(mapping.get_dst(wait_src), Some(wait_dst));
        assert_eq!(mapping.get_dst(say_src), Some(say_dst));
        assert_eq!(mapping.get_dst(seq2_src), Some(seq2_dst));
        assert_eq!(mapping.len(), source.node_count());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut tree = Ast::new_program("PROGRAM");
        let seq = tree.add_sequence(tree.root(), "dup").unwrap();
        tree.add_block(seq, "dup", "looks_show", false).unwrap();
        let other = two_block_script("b", "10");

        let result = match_trees(&tree, &other, &MatchConfig::default());
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
        let result = match_trees(&other, &tree, &MatchConfig::default());
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }
}
