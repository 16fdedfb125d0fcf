//! Typed AST for block-based visual programs.
//!
//! The tree is arena-backed: nodes live in an [`indextree::Arena`] and refer
//! to each other by [`NodeId`], so parent back-references are plain indices
//! rather than a second ownership edge. Each node carries its program-level
//! string id, its [`NodeKind`], a cached subtree height, and a Merkle-style
//! subtree hash used to accelerate top-down matching.
//!
//! Two equivalence relations drive the matcher:
//! - *surface* equivalence compares a node's own attributes only, and
//! - *deep* equivalence additionally requires positionally equivalent
//!   children with equal arity.

use crate::error::{Error, Result};
use indextree::{Arena, NodeEdge, NodeId};
use rapidhash::RapidHasher;
use core::fmt;
use core::hash::{Hash, Hasher};

/// Category of a block, derived from its opcode prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCategory {
    /// `control_*` blocks.
    Control,
    /// `custom_*` blocks.
    Custom,
    /// `event_*` blocks.
    Event,
    /// `looks_*` blocks.
    Looks,
    /// `motion_*` blocks.
    Motion,
    /// `operator_*` blocks.
    Operators,
    /// `sensing_*` blocks.
    Sensing,
    /// `sound_*` blocks.
    Sound,
    /// `data_*` blocks.
    Variables,
    /// Any prefix not recognized above.
    Unknown,
}

impl BlockCategory {
    /// Derives the category from an opcode's prefix.
    ///
    /// The opcode must contain a `_` separator; the derivation itself is
    /// total, with unrecognized prefixes mapping to [`BlockCategory::Unknown`].
    pub fn from_opcode(opcode: &str) -> Result<Self> {
        let prefix = match opcode.split_once('_') {
            Some((prefix, _)) => prefix,
            None => return Err(Error::InvalidOpcode(opcode.to_string())),
        };
        Ok(match prefix {
            "control" => BlockCategory::Control,
            "custom" => BlockCategory::Custom,
            "event" => BlockCategory::Event,
            "looks" => BlockCategory::Looks,
            "motion" => BlockCategory::Motion,
            "operator" => BlockCategory::Operators,
            "sensing" => BlockCategory::Sensing,
            "sound" => BlockCategory::Sound,
            "data" => BlockCategory::Variables,
            _ => BlockCategory::Unknown,
        })
    }
}

/// The closed set of node variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of a program; children are its top-level nodes.
    Program,
    /// An ordered run of blocks (execution order matters).
    Sequence,
    /// A single block.
    Block {
        /// The block's opcode, e.g. `motion_movesteps`.
        opcode: String,
        /// Category derived from the opcode prefix.
        category: BlockCategory,
        /// Whether the block is a shadow (placeholder) block.
        is_shadow: bool,
    },
    /// A named input slot holding at most one expression node.
    Input {
        /// The input's name, e.g. `STEPS`.
        name: String,
    },
    /// A named field holding a fixed value. Terminal.
    Field {
        /// The field's name.
        name: String,
        /// The field's value.
        value: String,
    },
    /// A literal value. Terminal.
    Literal {
        /// The literal's value.
        value: String,
    },
}

impl NodeKind {
    /// Shallow equality of the node's own attributes, ignoring children.
    ///
    /// `is_shadow` and the derived category are not part of a block's
    /// surface: two blocks with the same opcode are surface-equivalent.
    pub fn surface_matches(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Program, NodeKind::Program) => true,
            (NodeKind::Sequence, NodeKind::Sequence) => true,
            (NodeKind::Block { opcode: a, .. }, NodeKind::Block { opcode: b, .. }) => a == b,
            (NodeKind::Input { name: a }, NodeKind::Input { name: b }) => a == b,
            (
                NodeKind::Field { name: a, value: va },
                NodeKind::Field { name: b, value: vb },
            ) => a == b && va == vb,
            (NodeKind::Literal { value: a }, NodeKind::Literal { value: b }) => a == b,
            _ => false,
        }
    }

    /// Whether two nodes denote the same slot even when their values differ.
    ///
    /// Used by bottom-up recovery to pair a value-edited field or literal
    /// with its counterpart so the change surfaces as an `Update` rather
    /// than a delete/insert pair.
    pub(crate) fn same_slot(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Field { name: a, .. }, NodeKind::Field { name: b, .. }) => a == b,
            (NodeKind::Literal { .. }, NodeKind::Literal { .. }) => true,
            _ => false,
        }
    }

    /// Whether both kinds are the same variant.
    pub fn same_variant(&self, other: &NodeKind) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    fn hash_surface<H: Hasher>(&self, state: &mut H) {
        // Hash exactly what surface equivalence compares, plus a variant tag.
        match self {
            NodeKind::Program => 0u8.hash(state),
            NodeKind::Sequence => 1u8.hash(state),
            NodeKind::Block { opcode, .. } => {
                2u8.hash(state);
                opcode.hash(state);
            }
            NodeKind::Input { name } => {
                3u8.hash(state);
                name.hash(state);
            }
            NodeKind::Field { name, value } => {
                4u8.hash(state);
                name.hash(state);
                value.hash(state);
            }
            NodeKind::Literal { value } => {
                5u8.hash(state);
                value.hash(state);
            }
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Program => write!(f, "program"),
            NodeKind::Sequence => write!(f, "sequence"),
            NodeKind::Block { opcode, .. } => write!(f, "block:{opcode}"),
            NodeKind::Input { name } => write!(f, "input:{name}"),
            NodeKind::Field { name, value } => write!(f, "field:{name}={value}"),
            NodeKind::Literal { value } => write!(f, "literal:{value}"),
        }
    }
}

/// Merkle-style hash of a subtree: surface attributes plus child hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHash(pub u64);

/// Per-node payload stored in the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Program-level string id, unique within a tree.
    pub id: String,
    /// The node's variant and attributes.
    pub kind: NodeKind,
    /// Subtree hash, maintained by [`Ast::refresh_metrics`].
    pub hash: NodeHash,
    /// Subtree height: 1 for leaves, 1 + max child height otherwise.
    pub height: usize,
}

/// Traversal order for [`Ast::visit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Parents before children.
    Preorder,
    /// Children before parents.
    Postorder,
}

/// A rooted program tree.
pub struct Ast {
    arena: Arena<NodeData>,
    root: NodeId,
}

impl Ast {
    /// Creates a tree containing a single `Program` root.
    pub fn new_program(id: impl Into<String>) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData {
            id: id.into(),
            kind: NodeKind::Program,
            hash: NodeHash(0),
            height: 1,
        });
        let mut ast = Ast { arena, root };
        ast.refresh_metrics();
        ast
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Payload of a node.
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Parent of a node, `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Children of a node, in structural order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Number of children of a node.
    pub fn child_count(&self, id: NodeId) -> usize {
        id.children(&self.arena).count()
    }

    /// Position of a node among its siblings (0 for the root).
    pub fn position(&self, id: NodeId) -> usize {
        match self.parent(id) {
            Some(parent) => parent
                .children(&self.arena)
                .position(|c| c == id)
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Cached height of the subtree rooted at `id`.
    pub fn height(&self, id: NodeId) -> usize {
        self.get(id).height
    }

    /// Cached Merkle hash of the subtree rooted at `id`.
    pub fn hash(&self, id: NodeId) -> NodeHash {
        self.get(id).hash
    }

    /// All nodes of the tree in preorder, root included.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes_of(self.root)
    }

    /// Nodes of the subtree rooted at `id` in preorder, `id` included.
    pub fn nodes_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// Strict descendants of `id` in preorder, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena).skip(1)
    }

    /// All nodes of the tree in postorder.
    pub fn postorder(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.postorder_of(self.root)
    }

    /// Nodes of the subtree rooted at `id` in postorder.
    pub fn postorder_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.traverse(&self.arena).filter_map(|edge| match edge {
            NodeEdge::End(node) => Some(node),
            NodeEdge::Start(_) => None,
        })
    }

    /// Total number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Applies `f` to every node exactly once, in the given order.
    pub fn visit<F: FnMut(NodeId, &NodeData)>(&self, order: Traversal, mut f: F) {
        match order {
            Traversal::Preorder => {
                for id in self.nodes() {
                    f(id, self.get(id));
                }
            }
            Traversal::Postorder => {
                for id in self.postorder() {
                    f(id, self.get(id));
                }
            }
        }
    }

    /// Finds the first node (in preorder) whose string id matches.
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.nodes().find(|&n| self.get(n).id == id)
    }

    /// Adds a `Sequence` under a `Program` node.
    pub fn add_sequence(&mut self, parent: NodeId, id: impl Into<String>) -> Result<NodeId> {
        self.expect_kind(parent, |k| matches!(k, NodeKind::Program), "a program")?;
        let node = self.new_node(id.into(), NodeKind::Sequence);
        parent.append(node, &mut self.arena);
        self.refresh_metrics();
        Ok(node)
    }

    /// Adds a `Block` under a `Sequence`, `Program`, or empty `Input`.
    ///
    /// Appends in structural order for sequences and programs; for inputs
    /// the block becomes the slot's expression, failing with
    /// [`Error::AlreadyOccupied`] if the slot is filled.
    pub fn add_block(
        &mut self,
        parent: NodeId,
        id: impl Into<String>,
        opcode: impl Into<String>,
        is_shadow: bool,
    ) -> Result<NodeId> {
        let opcode = opcode.into();
        let category = BlockCategory::from_opcode(&opcode)?;
        match &self.get(parent).kind {
            NodeKind::Sequence | NodeKind::Program => {}
            NodeKind::Input { .. } => {
                if self.child_count(parent) > 0 {
                    return Err(Error::AlreadyOccupied(self.get(parent).id.clone()));
                }
            }
            other => {
                return Err(Error::InvariantViolation(format!(
                    "cannot add block under {other}"
                )))
            }
        }
        let node = self.new_node(
            id.into(),
            NodeKind::Block {
                opcode,
                category,
                is_shadow,
            },
        );
        parent.append(node, &mut self.arena);
        self.refresh_metrics();
        Ok(node)
    }

    /// Adds a `Field` to a block, keeping fields name-sorted before inputs.
    pub fn add_field(
        &mut self,
        block: NodeId,
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<NodeId> {
        self.expect_kind(block, |k| matches!(k, NodeKind::Block { .. }), "a block")?;
        let node = self.new_node(
            id.into(),
            NodeKind::Field {
                name: name.into(),
                value: value.into(),
            },
        );
        self.insert_attribute_sorted(block, node);
        self.refresh_metrics();
        Ok(node)
    }

    /// Adds an empty `Input` slot to a block, keeping inputs name-sorted
    /// after all fields.
    pub fn add_input(
        &mut self,
        block: NodeId,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<NodeId> {
        self.expect_kind(block, |k| matches!(k, NodeKind::Block { .. }), "a block")?;
        let node = self.new_node(id.into(), NodeKind::Input { name: name.into() });
        self.insert_attribute_sorted(block, node);
        self.refresh_metrics();
        Ok(node)
    }

    /// Attaches a `Literal` expression to an empty input slot.
    pub fn attach_literal(
        &mut self,
        input: NodeId,
        id: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<NodeId> {
        self.expect_kind(input, |k| matches!(k, NodeKind::Input { .. }), "an input")?;
        if self.child_count(input) > 0 {
            return Err(Error::AlreadyOccupied(self.get(input).id.clone()));
        }
        let node = self.new_node(id.into(), NodeKind::Literal { value: value.into() });
        input.append(node, &mut self.arena);
        self.refresh_metrics();
        Ok(node)
    }

    /// Detaches the expression currently occupying an input slot.
    ///
    /// Fails with [`Error::NotAChild`] if `child` is not the occupant.
    pub fn detach_expression(&mut self, input: NodeId, child: NodeId) -> Result<()> {
        self.expect_kind(input, |k| matches!(k, NodeKind::Input { .. }), "an input")?;
        let occupant = self.children(input).next();
        if occupant != Some(child) {
            return Err(Error::NotAChild {
                input: self.get(input).id.clone(),
                child: self.get(child).id.clone(),
            });
        }
        child.detach(&mut self.arena);
        self.refresh_metrics();
        Ok(())
    }

    /// Shallow equality of two nodes' own attributes; children ignored.
    pub fn surface_equivalent(&self, id: NodeId, other: &Ast, other_id: NodeId) -> bool {
        self.get(id).kind.surface_matches(&other.get(other_id).kind)
    }

    /// Deep equality: surface-equivalent and positionally equivalent
    /// children all the way down, with strict arity.
    pub fn equivalent(&self, id: NodeId, other: &Ast, other_id: NodeId) -> bool {
        if !self.surface_equivalent(id, other, other_id) {
            return false;
        }
        let mine: Vec<NodeId> = self.children(id).collect();
        let theirs: Vec<NodeId> = other.children(other_id).collect();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter()
            .zip(theirs.iter())
            .all(|(&a, &b)| self.equivalent(a, other, b))
    }

    /// Recomputes cached heights and Merkle hashes bottom-up.
    ///
    /// Called after every structural mutation so the caches are never stale.
    pub fn refresh_metrics(&mut self) {
        let order: Vec<NodeId> = self.postorder().collect();
        for id in order {
            let children: Vec<NodeId> = id.children(&self.arena).collect();
            let mut hasher = RapidHasher::default();
            self.get(id).kind.hash_surface(&mut hasher);
            let mut height = 1;
            for &child in &children {
                let data = self.get(child);
                data.hash.0.hash(&mut hasher);
                height = height.max(data.height + 1);
            }
            let hash = NodeHash(hasher.finish());
            let data = self.arena[id].get_mut();
            data.hash = hash;
            data.height = height;
        }
    }

    fn new_node(&mut self, id: String, kind: NodeKind) -> NodeId {
        self.arena.new_node(NodeData {
            id,
            kind,
            hash: NodeHash(0),
            height: 1,
        })
    }

    fn expect_kind(
        &self,
        id: NodeId,
        pred: impl Fn(&NodeKind) -> bool,
        expected: &str,
    ) -> Result<()> {
        let data = self.get(id);
        if pred(&data.kind) {
            Ok(())
        } else {
            Err(Error::InvariantViolation(format!(
                "node `{}` is not {expected}",
                data.id
            )))
        }
    }

    /// Inserts a field or input at its canonical position: fields before
    /// inputs, each group sorted by name. This one-time normalization makes
    /// attribute comparison order-independent downstream.
    fn insert_attribute_sorted(&mut self, block: NodeId, node: NodeId) {
        fn rank(kind: &NodeKind) -> Option<(u8, &str)> {
            match kind {
                NodeKind::Field { name, .. } => Some((0, name)),
                NodeKind::Input { name } => Some((1, name)),
                _ => None,
            }
        }
        let key = match rank(&self.get(node).kind) {
            Some((group, name)) => (group, name.to_string()),
            None => {
                block.append(node, &mut self.arena);
                return;
            }
        };
        let successor = block.children(&self.arena).find(|&c| {
            rank(&self.get(c).kind).map_or(true, |(group, name)| (group, name) > (key.0, key.1.as_str()))
        });
        match successor {
            Some(next) => next.insert_before(node, &mut self.arena),
            None => block.append(node, &mut self.arena),
        }
    }
}
