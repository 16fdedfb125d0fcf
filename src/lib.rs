//! # blockdiff
//!
//! Structural diffing for block-based visual programs (Scratch-style ASTs).
//!
//! ## Algorithm Overview
//!
//! blockdiff implements a tree diff based on:
//! - **GumTree** (Falleri et al., ASE 2014) for node matching
//! - **Chawathe algorithm** (1996) for edit script generation
//!
//! The pipeline runs in phases:
//!
//! 1. **Top-down matching**: match identical subtrees, tallest first, using
//!    Merkle-style subtree hashes as a fast path
//! 2. **Bottom-up matching**: match remaining internal nodes by the ratio of
//!    already-mapped descendants, then recover their children
//! 3. **Edit script generation**: produce Update, Insert, Move, Delete
//!    operations that transform the source tree into the target
//!
//! ## Usage
//!
//! ```
//! use blockdiff::{Ast, edit_script};
//!
//! # fn main() -> blockdiff::Result<()> {
//! let mut source = Ast::new_program("PROGRAM");
//! let seq = source.add_sequence(source.root(), "seq1")?;
//! source.add_block(seq, "flag", "event_whenflagclicked", false)?;
//!
//! let mut target = Ast::new_program("PROGRAM");
//! let seq = target.add_sequence(target.root(), "seq1")?;
//! target.add_block(seq, "flag", "event_whenflagclicked", false)?;
//! target.add_block(seq, "show", "looks_show", false)?;
//!
//! let summary = edit_script(&source, &target)?;
//! assert_eq!(summary.added, vec!["show".to_string()]);
//! assert!(summary.deleted.is_empty());
//! # Ok(()) }
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indexmap;
pub use indextree;

mod tracing_macros;

mod ast;
mod builder;
mod chawathe;
mod error;
mod graph;
mod matching;

pub use ast::{Ast, BlockCategory, NodeData, NodeHash, NodeKind, Traversal};
pub use builder::{build_program_tree, BlockRecord, InputValue};
pub use chawathe::{classify_mapping, generate_edit_script, EditOp, EditSummary};
pub use error::{Error, Result};
pub use graph::GraphLabel;
pub use matching::{match_trees, MatchConfig, Mapping};

/// Computes a full edit script between two program trees.
///
/// This is the main entry point for tree diffing. It:
/// 1. Computes a node mapping using GumTree's two-phase algorithm
/// 2. Generates an edit script using Chawathe's algorithm
///
/// # Example
///
/// ```
/// use blockdiff::{Ast, MatchConfig, diff_trees};
///
/// # fn main() -> blockdiff::Result<()> {
/// let mut source = Ast::new_program("PROGRAM");
/// let seq = source.add_sequence(source.root(), "seq1")?;
/// source.add_block(seq, "flag", "event_whenflagclicked", false)?;
///
/// let mut target = Ast::new_program("PROGRAM");
/// let seq = target.add_sequence(target.root(), "seq1")?;
/// target.add_block(seq, "flag", "event_whenflagclicked", false)?;
/// target.add_block(seq, "show", "looks_show", false)?;
///
/// let ops = diff_trees(&source, &target, &MatchConfig::default())?;
/// assert_eq!(ops.len(), 1); // one Insert for the new block
/// # Ok(()) }
/// ```
pub fn diff_trees(source: &Ast, target: &Ast, config: &MatchConfig) -> Result<Vec<EditOp>> {
    let (ops, _mapping) = diff_trees_with_mapping(source, target, config)?;
    Ok(ops)
}

/// Like [`diff_trees`], but also returns the node mapping.
///
/// Useful when operations need to be translated further, e.g. into
/// id-to-id correspondence tables for rendering.
pub fn diff_trees_with_mapping(
    source: &Ast,
    target: &Ast,
    config: &MatchConfig,
) -> Result<(Vec<EditOp>, Mapping)> {
    let mapping = match_trees(source, target, config)?;
    let ops = generate_edit_script(source, target, &mapping);
    Ok((ops, mapping))
}

/// Diffs two trees and classifies the mapping directly.
///
/// Added and deleted counts match the full Chawathe script; `moved` only
/// records nodes whose parent changed, so pure sibling reorders are not
/// reported. Use [`chawathe_edit_script`] when those matter.
pub fn edit_script(source: &Ast, target: &Ast) -> Result<EditSummary> {
    let mapping = match_trees(source, target, &MatchConfig::default())?;
    Ok(classify_mapping(source, target, &mapping))
}

/// Diffs two trees and summarizes the full Chawathe edit script.
///
/// Unlike [`edit_script`], `moved` also includes sibling reorders under an
/// unchanged parent, as isolated by LCS alignment.
pub fn chawathe_edit_script(source: &Ast, target: &Ast) -> Result<EditSummary> {
    let (ops, _mapping) = diff_trees_with_mapping(source, target, &MatchConfig::default())?;
    Ok(EditSummary::from_ops(&ops))
}
