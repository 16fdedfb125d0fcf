//! Export of a program tree into a [`petgraph`] graph.
//!
//! Useful for handing a tree to graph tooling (layout, DOT rendering on the
//! caller's side); the crate itself writes no files.

use crate::ast::Ast;
use indextree::NodeId;
use petgraph::graph::{Graph, NodeIndex};
use rapidhash::RapidHashMap as HashMap;

/// Node weight carried into the exported graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphLabel {
    /// The node's program-level id.
    pub id: String,
    /// Human-readable label, e.g. `block:motion_movesteps`.
    pub label: String,
}

impl Ast {
    /// Adds every node and parent→child edge of this tree to `graph`,
    /// returning the index of the root.
    pub fn add_to_graph(&self, graph: &mut Graph<GraphLabel, ()>) -> NodeIndex {
        let mut indices: HashMap<NodeId, NodeIndex> = HashMap::default();
        for node in self.nodes() {
            let data = self.get(node);
            let index = graph.add_node(GraphLabel {
                id: data.id.clone(),
                label: data.kind.to_string(),
            });
            indices.insert(node, index);
            // Preorder: the parent's index is always present by now.
            if let Some(parent) = self.parent(node) {
                graph.add_edge(indices[&parent], index, ());
            }
        }
        indices[&self.root()]
    }
}
