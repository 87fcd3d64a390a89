//! Code builder tests.

use std::rc::Rc;

use upp_core::{c, SourceTree};

use super::{CodeBuilder, MacroValue};
use crate::helpers::Helpers;

fn setup(src: &str) -> (SourceTree, Helpers) {
    let tree = SourceTree::new(src, c());
    let helpers = Helpers::new(tree.clone(), Rc::default(), Rc::default(), Rc::default());
    (tree, helpers)
}

#[test]
fn node_interpolation_preserves_identity() {
    let (tree, helpers) = setup("int counter;\n");
    let ident = tree
        .root()
        .expect("root")
        .find_kind("identifier")
        .into_iter()
        .next()
        .expect("identifier");
    let original_id = ident.id();

    let value = CodeBuilder::new(helpers)
        .text("long ")
        .node(&ident)
        .text(" = 5;")
        .build()
        .expect("build");

    let MacroValue::Node(result) = value else {
        panic!("expected a node result");
    };
    assert_eq!(result.text(), "long counter = 5;");
    // The interpolated node was detached from its source tree and lives on
    // inside the assembled fragment, same identity.
    let inner = result
        .find_kind("identifier")
        .into_iter()
        .find(|n| n.text() == "counter")
        .expect("identifier inside result");
    assert_eq!(inner.id(), original_id);
    assert_eq!(tree.text(), "int ;\n");
}

#[test]
fn list_interpolation_in_argument_position_joins_with_commas() {
    let (_tree, helpers) = setup("int x;\n");
    let value = CodeBuilder::new(helpers)
        .text("f(")
        .list(vec![MacroValue::Str("1".into()), MacroValue::Str("2".into())])
        .text(");")
        .build()
        .expect("build");
    let MacroValue::Node(result) = value else {
        panic!("expected a node result");
    };
    assert_eq!(result.text(), "f(1, 2);");
}

#[test]
fn stale_nodes_degrade_to_text() {
    let (tree, helpers) = setup("int a;\n");
    let decl = tree
        .root()
        .expect("root")
        .find_kind("declaration")
        .into_iter()
        .next()
        .expect("declaration");
    // Invalidate the declaration by editing over it.
    tree.edit(0, 6, "long b;");
    assert!(!decl.is_valid());

    let value = CodeBuilder::new(helpers)
        .node(&decl)
        .build()
        .expect("build");
    match value {
        MacroValue::Str(s) => assert!(s.contains("stale node")),
        MacroValue::Node(n) => assert!(n.tree().expect("tree").text().contains("stale node")),
        _ => panic!("unexpected value shape"),
    }
}

#[test]
fn plain_values_stringify() {
    let (_tree, helpers) = setup("int x;\n");
    let value = CodeBuilder::new(helpers)
        .text("int n = ")
        .value(42)
        .text(";")
        .build()
        .expect("build");
    let MacroValue::Node(result) = value else {
        panic!("expected a node result");
    };
    assert_eq!(result.text(), "int n = 42;");
}
