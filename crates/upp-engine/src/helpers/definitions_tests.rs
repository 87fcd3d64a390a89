//! Definition lookup tests.

use std::rc::Rc;

use upp_core::{c, SourceNode, SourceTree};

use super::{FindOptions, Helpers};

fn setup(src: &str) -> (SourceTree, Helpers) {
    let tree = SourceTree::new(src, c());
    let helpers = Helpers::new(tree.clone(), Rc::default(), Rc::default(), Rc::default());
    (tree, helpers)
}

fn last_ident(tree: &SourceTree, text: &str) -> SourceNode {
    tree.root()
        .expect("root")
        .find_where(|n| upp_core::is_identifier_kind(n.kind()) && n.text() == text)
        .into_iter()
        .next_back()
        .unwrap_or_else(|| panic!("no identifier {text}"))
}

#[test]
fn resolves_a_local_declaration() {
    let (tree, helpers) = setup("int main(void) { int x; return x; }\n");
    let x_use = last_ident(&tree, "x");
    let def = helpers
        .find_definition(&x_use, None, FindOptions::default())
        .expect("definition");
    assert_eq!(def.kind(), "declaration");
    assert_eq!(def.text(), "int x;");
}

#[test]
fn resolves_a_global_from_inner_scope() {
    let (tree, helpers) = setup("int g;\nint f(void) { return g; }\n");
    let g_use = last_ident(&tree, "g");
    let def = helpers
        .find_definition(&g_use, None, FindOptions::default())
        .expect("definition");
    assert_eq!(def.text(), "int g;");
}

#[test]
fn resolves_a_parameter() {
    let (tree, helpers) = setup("int f(int a) { return a; }\n");
    let a_use = last_ident(&tree, "a");
    let def = helpers
        .find_definition(&a_use, None, FindOptions::default())
        .expect("definition");
    assert_eq!(def.kind(), "parameter_declaration");
}

#[test]
fn unresolved_name_errors_and_or_null_returns_none() {
    let (tree, helpers) = setup("int y = x;\n");
    let x_use = last_ident(&tree, "x");
    assert!(helpers
        .find_definition(&x_use, None, FindOptions::default())
        .is_err());
    assert!(helpers
        .find_definition_or_null(&x_use, None, FindOptions::default())
        .is_none());
}

#[test]
fn initializer_values_do_not_declare() {
    // `x` appears only inside an initializer value; it must not resolve to
    // the `y` declaration it sits in.
    let (tree, helpers) = setup("int y = x + 1;\n");
    let x_use = last_ident(&tree, "x");
    assert!(helpers
        .find_definition_or_null(&x_use, None, FindOptions::default())
        .is_none());
}

#[test]
fn resolves_a_typedef_name() {
    let (tree, helpers) = setup("typedef int myint;\nmyint v;\n");
    let use_site = last_ident(&tree, "myint");
    let def = helpers
        .find_definition(&use_site, None, FindOptions::default())
        .expect("definition");
    assert_eq!(def.kind(), "type_definition");
}

#[test]
fn resolves_a_struct_tag_with_the_tag_option() {
    let (tree, helpers) = setup("struct point { int x; };\nstruct point p;\n");
    let use_site = last_ident(&tree, "point");
    let def = helpers
        .find_definition(
            &use_site,
            None,
            FindOptions {
                variable: false,
                tag: true,
            },
        )
        .expect("definition");
    assert_eq!(def.kind(), "struct_specifier");
    assert!(def.text().contains("int x;"));
}

#[test]
fn resolves_by_explicit_name_from_a_scope() {
    let (tree, helpers) = setup("int g;\nint main(void) { return 0; }\n");
    let root = tree.root().expect("root");
    let def = helpers
        .find_definition(&root, Some("g"), FindOptions::default())
        .expect("definition");
    assert_eq!(def.text(), "int g;");
}

#[test]
fn renamed_definition_still_resolves_under_the_old_name() {
    let (tree, helpers) = setup("int counter;\nint main(void) { return counter; }\n");
    let decl_ident = tree
        .root()
        .expect("root")
        .find_kind("identifier")
        .into_iter()
        .next()
        .expect("decl identifier");
    assert_eq!(decl_ident.text(), "counter");
    decl_ident.replace_with("ctr", true);
    assert_eq!(decl_ident.text(), "ctr");

    let use_site = last_ident(&tree, "counter");
    let def = helpers
        .find_definition(&use_site, None, FindOptions::default())
        .expect("definition survives rename");
    assert_eq!(def.kind(), "declaration");
    assert!(def.text().starts_with("int ctr"));
}

#[test]
fn find_references_collects_all_uses() {
    let (tree, helpers) = setup(
        "int counter;\nint main(void) {\n    counter++;\n    return counter;\n}\n",
    );
    let decl = tree
        .root()
        .expect("root")
        .find_kind("declaration")
        .into_iter()
        .next()
        .expect("declaration");
    let refs = helpers.find_references(&decl);
    assert_eq!(refs.len(), 2);
    assert!(refs.iter().all(|r| r.text() == "counter"));
}
