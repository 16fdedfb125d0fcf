//! Tree construction from a decoded block-record description.
//!
//! The decoded form mirrors how block-based editors serialize a program: a
//! flat map from block id to record, with `parent`/`next` links encoding
//! script membership and order, and inputs either holding a literal or
//! referencing another block as their expression.

use crate::ast::Ast;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use indextree::NodeId;
use rapidhash::RapidHashSet as HashSet;
use serde::Deserialize;
use std::collections::BTreeMap;

/// What an input slot holds in the decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputValue {
    /// A literal value.
    Literal(String),
    /// A reference to another block, nested as the slot's expression.
    Block(String),
    /// Nothing plugged in.
    Empty,
}

/// One decoded block.
///
/// `BTreeMap` keys give fields and inputs a stable name order, matching the
/// tree's own normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRecord {
    /// The block's opcode.
    pub opcode: String,
    /// Id of the enclosing block, `None` for a top-level block.
    #[serde(default)]
    pub parent: Option<String>,
    /// Id of the block that follows this one in its script.
    #[serde(default)]
    pub next: Option<String>,
    /// Field name to value.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Input name to slot content.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    /// Whether the block is a shadow (placeholder) block.
    #[serde(default)]
    pub is_shadow: bool,
}

/// Builds a rooted program tree from decoded block records.
///
/// Top-level records (no `parent`, not consumed by an input) each start a
/// `Sequence`, in record order; `next` links order the blocks within it.
/// Synthetic nodes get derived ids: the root is `PROGRAM`, a sequence is
/// `:seq@<head-id>`, a field `:field[NAME]@<block-id>`, an input
/// `:input[NAME]@<block-id>`, and a literal `:literal@<input-id>`.
///
/// Dangling references, blocks linked from more than one place, and
/// unreachable blocks are rejected as [`Error::InvariantViolation`];
/// malformed opcodes as [`Error::InvalidOpcode`].
pub fn build_program_tree(records: &IndexMap<String, BlockRecord>) -> Result<Ast> {
    // Validate every cross-reference up front and note which blocks are
    // consumed as input expressions: those do not start or join a script.
    let mut consumed: HashSet<&str> = HashSet::default();
    for (id, record) in records {
        for value in record.inputs.values() {
            if let InputValue::Block(target) = value {
                check_ref(records, id, target)?;
                consumed.insert(target.as_str());
            }
        }
        if let Some(next) = &record.next {
            check_ref(records, id, next)?;
        }
        if let Some(parent) = &record.parent {
            check_ref(records, id, parent)?;
        }
    }

    let mut ast = Ast::new_program("PROGRAM");
    let root = ast.root();
    let mut visited: HashSet<&str> = HashSet::default();

    for (id, record) in records {
        if record.parent.is_some() || consumed.contains(id.as_str()) {
            continue;
        }
        let seq = ast.add_sequence(root, format!(":seq@{id}"))?;
        let mut cursor = Some(id.as_str());
        while let Some(block_id) = cursor {
            attach_block(&mut ast, records, seq, block_id, &mut visited)?;
            // The record exists: attach_block resolved it.
            cursor = records[block_id].next.as_deref();
        }
    }

    for id in records.keys() {
        if !visited.contains(id.as_str()) {
            return Err(Error::InvariantViolation(format!(
                "block `{id}` is not reachable from any script"
            )));
        }
    }

    Ok(ast)
}

fn check_ref(records: &IndexMap<String, BlockRecord>, from: &str, to: &str) -> Result<()> {
    if records.contains_key(to) {
        Ok(())
    } else {
        Err(Error::InvariantViolation(format!(
            "block `{from}` references missing block `{to}`"
        )))
    }
}

/// Attaches one block (with its fields, inputs, and nested expressions)
/// under `parent`. Visiting a block twice means a `next` cycle or a block
/// linked from more than one place.
fn attach_block<'a>(
    ast: &mut Ast,
    records: &'a IndexMap<String, BlockRecord>,
    parent: NodeId,
    block_id: &'a str,
    visited: &mut HashSet<&'a str>,
) -> Result<()> {
    let (block_id, record) = records
        .get_key_value(block_id)
        .ok_or_else(|| {
            Error::InvariantViolation(format!("block `{block_id}` does not exist"))
        })?;
    if !visited.insert(block_id.as_str()) {
        return Err(Error::InvariantViolation(format!(
            "block `{block_id}` is linked more than once"
        )));
    }

    let node = ast.add_block(parent, block_id.clone(), &record.opcode, record.is_shadow)?;
    for (name, value) in &record.fields {
        ast.add_field(node, format!(":field[{name}]@{block_id}"), name, value)?;
    }
    for (name, value) in &record.inputs {
        let input_id = format!(":input[{name}]@{block_id}");
        let input = ast.add_input(node, input_id.clone(), name)?;
        match value {
            InputValue::Literal(literal) => {
                ast.attach_literal(input, format!(":literal@{input_id}"), literal)?;
            }
            InputValue::Block(target) => {
                attach_block(ast, records, input, target, visited)?;
            }
            InputValue::Empty => {}
        }
    }
    Ok(())
}
