//! End-to-end diffs over JSON program fixtures.
//!
//! Five small programs, each grown from the previous one: new scripts,
//! reordered blocks, and blocks traded between scripts.

use blockdiff::{
    build_program_tree, chawathe_edit_script, edit_script, match_trees, Ast, BlockRecord,
    MatchConfig, Traversal,
};
use indexmap::IndexMap;

fn load(json: &str) -> Ast {
    let records: IndexMap<String, BlockRecord> = serde_json::from_str(json).unwrap();
    build_program_tree(&records).unwrap()
}

/// One script: flag, then a move with a literal steps input.
fn t1() -> Ast {
    load(
        r#"{
        "flag": {"opcode": "event_whenflagclicked", "next": "move"},
        "move": {"opcode": "motion_movesteps", "parent": "flag",
                 "inputs": {"STEPS": {"literal": "10"}}}
    }"#,
    )
}

/// T1 plus a second script setting a variable.
fn t2() -> Ast {
    load(
        r#"{
        "flag": {"opcode": "event_whenflagclicked", "next": "move"},
        "move": {"opcode": "motion_movesteps", "parent": "flag",
                 "inputs": {"STEPS": {"literal": "10"}}},
        "set": {"opcode": "data_setvariableto",
                "fields": {"VARIABLE": "score"},
                "inputs": {"VALUE": {"literal": "0"}}}
    }"#,
    )
}

/// T2 with the first script reversed and a wait appended to the second.
fn t3() -> Ast {
    load(
        r#"{
        "move": {"opcode": "motion_movesteps", "next": "flag",
                 "inputs": {"STEPS": {"literal": "10"}}},
        "flag": {"opcode": "event_whenflagclicked", "parent": "move"},
        "set": {"opcode": "data_setvariableto", "next": "wait",
                "fields": {"VARIABLE": "score"},
                "inputs": {"VALUE": {"literal": "0"}}},
        "wait": {"opcode": "control_wait", "parent": "set",
                 "inputs": {"DURATION": {"literal": "1"}}}
    }"#,
    )
}

/// T3 plus a third script: say, then a key-press hat block.
fn t4() -> Ast {
    load(
        r#"{
        "move": {"opcode": "motion_movesteps", "next": "flag",
                 "inputs": {"STEPS": {"literal": "10"}}},
        "flag": {"opcode": "event_whenflagclicked", "parent": "move"},
        "set": {"opcode": "data_setvariableto", "next": "wait",
                "fields": {"VARIABLE": "score"},
                "inputs": {"VALUE": {"literal": "0"}}},
        "wait": {"opcode": "control_wait", "parent": "set",
                 "inputs": {"DURATION": {"literal": "1"}}},
        "say": {"opcode": "looks_say", "next": "key",
                "inputs": {"MESSAGE": {"literal": "hello"}}},
        "key": {"opcode": "event_whenkeypressed", "parent": "say",
                "fields": {"KEY": "space"}}
    }"#,
    )
}

/// T4 with the wait and the key-press block trading scripts.
fn t5() -> Ast {
    load(
        r#"{
        "move": {"opcode": "motion_movesteps", "next": "flag",
                 "inputs": {"STEPS": {"literal": "10"}}},
        "flag": {"opcode": "event_whenflagclicked", "parent": "move"},
        "set": {"opcode": "data_setvariableto", "next": "key",
                "fields": {"VARIABLE": "score"},
                "inputs": {"VALUE": {"literal": "0"}}},
        "key": {"opcode": "event_whenkeypressed", "parent": "set",
                "fields": {"KEY": "space"}},
        "say": {"opcode": "looks_say", "next": "wait",
                "inputs": {"MESSAGE": {"literal": "hello"}}},
        "wait": {"opcode": "control_wait", "parent": "say",
                 "inputs": {"DURATION": {"literal": "1"}}}
    }"#,
    )
}

#[test]
fn fixture_node_counts() {
    assert_eq!(t1().node_count(), 6);
    assert_eq!(t2().node_count(), 11);
    assert_eq!(t3().node_count(), 14);
    assert_eq!(t4().node_count(), 20);
    assert_eq!(t5().node_count(), 20);
}

#[test]
fn visitor_sees_as_many_nodes_as_traversal() {
    for tree in [t1(), t2(), t3(), t4(), t5()] {
        let mut pre = 0usize;
        tree.visit(Traversal::Preorder, |_, _| pre += 1);
        let mut post = 0usize;
        tree.visit(Traversal::Postorder, |_, _| post += 1);
        assert_eq!(pre, tree.node_count());
        assert_eq!(post, tree.node_count());
    }
}

#[test]
fn equivalence_is_reflexive() {
    let tree = t4();
    for id in tree.nodes().collect::<Vec<_>>() {
        assert!(tree.equivalent(id, &tree, id));
    }
}

#[test]
fn self_diff_is_empty() {
    let copies = [
        (t1(), t1()),
        (t2(), t2()),
        (t3(), t3()),
        (t4(), t4()),
        (t5(), t5()),
    ];
    for (source, target) in &copies {
        assert!(edit_script(source, target).unwrap().is_empty());
        assert!(chawathe_edit_script(source, target).unwrap().is_empty());
    }
}

#[test]
fn mapping_is_injective_across_fixtures() {
    let pairs = [(t1(), t2()), (t2(), t3()), (t2(), t4()), (t4(), t5())];
    for (source, target) in &pairs {
        let mapping = match_trees(source, target, &MatchConfig::default()).unwrap();
        let mut seen_src = std::collections::HashSet::new();
        let mut seen_dst = std::collections::HashSet::new();
        for (src, dst) in mapping.pairs() {
            assert!(seen_src.insert(src), "source node mapped twice");
            assert!(seen_dst.insert(dst), "target node mapped twice");
        }
    }
}

#[test]
fn t1_to_t2_new_script_is_pure_addition() {
    let (source, target) = (t1(), t2());

    let summary = edit_script(&source, &target).unwrap();
    // Sequence + block + field + input + literal of the new script.
    assert_eq!(summary.added.len(), 5);
    assert!(summary.added.contains(&"set".to_string()));
    assert!(summary.deleted.is_empty());
    assert!(summary.moved.is_empty());

    let summary = chawathe_edit_script(&source, &target).unwrap();
    assert_eq!(summary.added.len(), 5);
    assert!(summary.deleted.is_empty());
    assert!(summary.moved.is_empty());
}

#[test]
fn t2_to_t3_reorder_and_append() {
    let (source, target) = (t2(), t3());

    // The heuristic summary sees the appended wait block but not the
    // flag/move reorder: their parent did not change.
    let summary = edit_script(&source, &target).unwrap();
    assert_eq!(summary.added.len(), 3); // wait block + input + literal
    assert!(summary.added.contains(&"wait".to_string()));
    assert!(summary.deleted.is_empty());
    assert!(summary.updated.is_empty());
    assert!(summary.moved.is_empty());

    // The full Chawathe script reports the reorder as one move.
    let summary = chawathe_edit_script(&source, &target).unwrap();
    assert_eq!(summary.added.len(), 3);
    assert!(summary.deleted.is_empty());
    assert_eq!(summary.moved.len(), 1);
}

#[test]
fn t2_to_t4_two_new_scripts() {
    let (source, target) = (t2(), t4());

    let summary = edit_script(&source, &target).unwrap();
    assert_eq!(summary.added.len(), 9);
    assert!(summary.deleted.is_empty());
    assert!(summary.moved.is_empty());

    let summary = chawathe_edit_script(&source, &target).unwrap();
    assert_eq!(summary.added.len(), 9);
    assert!(summary.deleted.is_empty());
    assert_eq!(summary.moved.len(), 1);
}

#[test]
fn t4_to_t5_blocks_trade_scripts() {
    let (source, target) = (t4(), t5());

    let summary = edit_script(&source, &target).unwrap();
    assert!(summary.added.is_empty());
    assert!(summary.deleted.is_empty());
    let mut moved = summary.moved.clone();
    moved.sort();
    assert_eq!(moved, vec!["key".to_string(), "wait".to_string()]);

    let summary = chawathe_edit_script(&source, &target).unwrap();
    assert!(summary.added.is_empty());
    assert!(summary.deleted.is_empty());
    let mut moved = summary.moved.clone();
    moved.sort();
    assert_eq!(moved, vec!["key".to_string(), "wait".to_string()]);
}

#[test]
fn value_edit_surfaces_as_update() {
    let source = t2();
    let mut target = t2();
    let literal = target.find(":literal@:input[VALUE]@set").unwrap();
    let input = target.find(":input[VALUE]@set").unwrap();
    target.detach_expression(input, literal).unwrap();
    target
        .attach_literal(input, ":literal@:input[VALUE]@set", "100")
        .unwrap();

    let summary = edit_script(&source, &target).unwrap();
    assert!(summary.added.is_empty());
    assert!(summary.deleted.is_empty());
    assert_eq!(summary.updated, vec![":literal@:input[VALUE]@set".to_string()]);
    assert!(summary.moved.is_empty());
}
