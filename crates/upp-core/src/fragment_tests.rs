//! Tests for fragment synthesis.

use crate::fragment::fragment;
use crate::lang::c;

#[test]
fn declarations_parse_as_translation_unit() {
    let frag = fragment("int x;\nint y;", &c());
    assert_eq!(frag.base, 0);
    assert_eq!(frag.nodes.len(), 2);
    assert!(frag.nodes.iter().all(|n| n.kind() == "declaration"));
    assert_eq!(frag.nodes[0].text(), "int x;");
    assert_eq!(frag.nodes[1].text(), "int y;");
}

#[test]
fn statements_are_wrapped_and_extracted() {
    let frag = fragment("x = 1;", &c());
    assert_eq!(frag.nodes.len(), 1);
    assert_eq!(frag.nodes[0].kind(), "expression_statement");
    assert_eq!(frag.nodes[0].text(), "x = 1;");
    assert!(frag.base > 0, "payload offset by the scratch wrapper");
}

#[test]
fn multiple_statements_reemit_into_a_fresh_tree() {
    let frag = fragment("a = 1;\nb = 2;", &c());
    assert_eq!(frag.nodes.len(), 2);
    assert_eq!(frag.base, 0);
    assert_eq!(frag.tree.text(), "a = 1;\nb = 2;");
    assert_eq!(frag.nodes[0].byte_range(), Some(0..6));
    assert_eq!(frag.nodes[1].byte_range(), Some(7..13));
    assert_eq!(frag.nodes[1].text(), "b = 2;");
}

#[test]
fn single_identifier_yields_a_bare_identifier_node() {
    let frag = fragment("foo", &c());
    let node = frag.single().expect("single node");
    assert_eq!(node.kind(), "identifier");
    assert_eq!(node.text(), "foo");
}

#[test]
fn empty_payload_yields_no_nodes() {
    let frag = fragment("   \n", &c());
    assert!(frag.nodes.is_empty());
}
