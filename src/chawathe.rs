//! Chawathe edit script generation.
//!
//! Turns a node mapping into an edit script (Update, Insert, Move, Delete)
//! that transforms the source tree into the target tree. Based on "Change
//! Detection in Hierarchically Structured Information" (Chawathe et al.,
//! 1996).
//!
//! Phases, in emission order:
//! 1. Update: value changes on mapped nodes
//! 2. Insert: nodes that exist only in the target, parents first
//! 3. Move: mapped nodes whose parent changed, then positional moves
//!    isolated by aligning mapped siblings with a longest common subsequence
//! 4. Delete: nodes that exist only in the source, children first

use crate::{debug, trace};
use core::fmt;

use crate::ast::{Ast, NodeKind};
use crate::matching::Mapping;
use indextree::NodeId;
use rapidhash::RapidHashSet as HashSet;

/// An edit operation, addressing nodes by their program-level ids.
#[derive(Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Replace the attributes of a mapped node with the target's.
    Update {
        /// Id of the node in the source tree.
        node: String,
        /// The node's attributes in the target tree.
        attrs: NodeKind,
    },

    /// Insert a node that only exists in the target tree.
    Insert {
        /// Id of the new node in the target tree.
        node: String,
        /// Id of its parent in the target tree; `None` for a root.
        parent: Option<String>,
        /// Position among its siblings (0-indexed).
        position: usize,
        /// The node's attributes.
        attrs: NodeKind,
    },

    /// Relocate a mapped node.
    Move {
        /// Id of the node in the source tree.
        node: String,
        /// Id of the destination parent in the target tree.
        new_parent: String,
        /// Final position among the destination parent's children.
        new_position: usize,
    },

    /// Delete a node that only exists in the source tree.
    Delete {
        /// Id of the node in the source tree.
        node: String,
    },
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Update { node, attrs } => {
                write!(f, "Update({node} -> {attrs})")
            }
            EditOp::Insert {
                node,
                parent,
                position,
                attrs,
            } => match parent {
                Some(parent) => {
                    write!(f, "Insert({node} {attrs} @{position} under {parent})")
                }
                None => write!(f, "Insert({node} {attrs} as root)"),
            },
            EditOp::Move {
                node,
                new_parent,
                new_position,
            } => {
                write!(f, "Move({node} @{new_position} under {new_parent})")
            }
            EditOp::Delete { node } => write!(f, "Delete({node})"),
        }
    }
}

impl fmt::Debug for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Wrapper for collecting edit operations with automatic tracing.
struct Ops {
    inner: Vec<EditOp>,
}

impl Ops {
    fn new() -> Self {
        Self { inner: Vec::new() }
    }

    fn push(&mut self, op: EditOp) {
        debug!(%op, "emit");
        self.inner.push(op);
    }

    fn into_inner(self) -> Vec<EditOp> {
        self.inner
    }
}

/// Classification of a diff into id sets, for callers that do not need the
/// ordered operation list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditSummary {
    /// Ids of inserted nodes (target-tree ids).
    pub added: Vec<String>,
    /// Ids of deleted nodes (source-tree ids).
    pub deleted: Vec<String>,
    /// Ids of nodes whose attributes changed in place (source-tree ids).
    pub updated: Vec<String>,
    /// Ids of relocated nodes (source-tree ids).
    pub moved: Vec<String>,
}

impl EditSummary {
    /// Summarizes a full edit script.
    pub fn from_ops(ops: &[EditOp]) -> Self {
        let mut summary = EditSummary::default();
        for op in ops {
            match op {
                EditOp::Insert { node, .. } => summary.added.push(node.clone()),
                EditOp::Delete { node } => summary.deleted.push(node.clone()),
                EditOp::Update { node, .. } => summary.updated.push(node.clone()),
                EditOp::Move { node, .. } => summary.moved.push(node.clone()),
            }
        }
        summary
    }

    /// Whether the diff is empty.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.moved.is_empty()
    }
}

/// Classifies a mapping directly, without generating a full edit script.
///
/// Added and deleted are the unmapped target and source nodes; updated are
/// mapped pairs whose attributes differ; moved are mapped pairs whose
/// parents map to different nodes. Reorderings under an unchanged parent
/// are *not* counted as moves here; use [`generate_edit_script`] when the
/// exact Chawathe move set is needed.
pub fn classify_mapping(source: &Ast, target: &Ast, mapping: &Mapping) -> EditSummary {
    let added = target
        .nodes()
        .filter(|&d| !mapping.has_dst(d))
        .map(|d| target.get(d).id.clone())
        .collect();
    let deleted = source
        .nodes()
        .filter(|&s| !mapping.has_src(s))
        .map(|s| source.get(s).id.clone())
        .collect();
    let mut updated = Vec::new();
    let mut moved = Vec::new();
    for (src, dst) in mapping.pairs() {
        if !source.surface_equivalent(src, target, dst) {
            updated.push(source.get(src).id.clone());
        }
        let parent_changed = match (source.parent(src), target.parent(dst)) {
            (Some(p), Some(q)) => mapping.get_dst(p) != Some(q),
            (None, None) => false,
            _ => true,
        };
        if parent_changed {
            moved.push(source.get(src).id.clone());
        }
    }
    EditSummary {
        added,
        deleted,
        updated,
        moved,
    }
}

/// Generates an edit script from a mapping between two trees.
pub fn generate_edit_script(source: &Ast, target: &Ast, mapping: &Mapping) -> Vec<EditOp> {
    trace!(mapped_pairs = mapping.len(), "generate_edit_script start");
    let mut ops = Ops::new();

    // Phase 1: Update - mapped nodes whose own attributes differ
    for (src, dst) in mapping.pairs() {
        if !source.surface_equivalent(src, target, dst) {
            ops.push(EditOp::Update {
                node: source.get(src).id.clone(),
                attrs: target.get(dst).kind.clone(),
            });
        }
    }

    // Phase 2: Insert - unmapped target nodes, preorder so parents land
    // before their children
    for dst in target.nodes() {
        if !mapping.has_dst(dst) {
            ops.push(EditOp::Insert {
                node: target.get(dst).id.clone(),
                parent: target.parent(dst).map(|p| target.get(p).id.clone()),
                position: target.position(dst),
                attrs: target.get(dst).kind.clone(),
            });
        }
    }

    // Phase 3a: Move - mapped nodes whose parent mapping changed
    for (src, dst) in mapping.pairs() {
        let src_parent = source.parent(src);
        let dst_parent = target.parent(dst);
        let (Some(src_parent), Some(dst_parent)) = (src_parent, dst_parent) else {
            continue;
        };
        if mapping.get_dst(src_parent) != Some(dst_parent) {
            trace!(
                node = %source.get(src).id,
                "move phase: parent changed"
            );
            ops.push(EditOp::Move {
                node: source.get(src).id.clone(),
                new_parent: target.get(dst_parent).id.clone(),
                new_position: target.position(dst),
            });
        }
    }

    // Phase 3b: Move - reorderings under a stable parent pair. Aligning the
    // mapped siblings with an LCS leaves exactly the out-of-order nodes,
    // so an unrelated insertion does not drag its siblings into moves.
    for (src_parent, dst_parent) in mapping.pairs() {
        let aligned: Vec<(NodeId, NodeId)> = source
            .children(src_parent)
            .filter_map(|s| {
                mapping
                    .get_dst(s)
                    .filter(|&d| target.parent(d) == Some(dst_parent))
                    .map(|d| (s, d))
            })
            .collect();
        if aligned.len() < 2 {
            continue;
        }
        let in_source_order: Vec<NodeId> = aligned.iter().map(|&(_, d)| d).collect();
        let in_target_order: Vec<NodeId> = target
            .children(dst_parent)
            .filter(|&d| {
                mapping
                    .get_src(d)
                    .map_or(false, |s| source.parent(s) == Some(src_parent))
            })
            .collect();
        let stable = lcs_retained(&in_source_order, &in_target_order);
        for &(src, dst) in &aligned {
            if !stable.contains(&dst) {
                trace!(
                    node = %source.get(src).id,
                    "move phase: reordered among siblings"
                );
                ops.push(EditOp::Move {
                    node: source.get(src).id.clone(),
                    new_parent: target.get(dst_parent).id.clone(),
                    new_position: target.position(dst),
                });
            }
        }
    }

    // Phase 4: Delete - unmapped source nodes, postorder so children go
    // before their parents
    for src in source.postorder() {
        if !mapping.has_src(src) {
            ops.push(EditOp::Delete {
                node: source.get(src).id.clone(),
            });
        }
    }

    debug!(total_ops = ops.inner.len(), "generate_edit_script done");
    ops.into_inner()
}

/// Elements of one longest common subsequence of `a` and `b`.
///
/// Both slices hold the same set of ids in different orders, so the result
/// is the largest set of nodes that can stay put.
fn lcs_retained(a: &[NodeId], b: &[NodeId]) -> HashSet<NodeId> {
    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }
    let mut retained = HashSet::default();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            retained.insert(a[i]);
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    retained
}
