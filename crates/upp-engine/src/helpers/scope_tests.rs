//! Scope resolution tests.

use std::rc::Rc;

use upp_core::{c, SourceNode, SourceTree};

use super::Helpers;

fn setup(src: &str) -> (SourceTree, Helpers) {
    let tree = SourceTree::new(src, c());
    let helpers = Helpers::new(tree.clone(), Rc::default(), Rc::default(), Rc::default());
    (tree, helpers)
}

fn ident(tree: &SourceTree, text: &str) -> SourceNode {
    tree.root()
        .expect("root")
        .find_where(|n| upp_core::is_identifier_kind(n.kind()) && n.text() == text)
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no identifier {text}"))
}

#[test]
fn body_identifier_scopes_to_the_compound_statement() {
    let (tree, helpers) = setup("int g;\nint main(void) { return g; }\n");
    let g_use = tree
        .root()
        .expect("root")
        .find_kind("identifier")
        .into_iter()
        .rfind(|n| n.text() == "g")
        .expect("use of g");
    let scope = helpers.enclosing_scope(&g_use).expect("scope");
    assert_eq!(scope.kind(), "compound_statement");
}

#[test]
fn scope_chain_passes_through_the_function_definition() {
    let (tree, helpers) = setup("int main(void) { return 0; }\n");
    let body = tree
        .root()
        .expect("root")
        .find_kind("compound_statement")
        .into_iter()
        .next()
        .expect("body");
    let fn_scope = helpers.enclosing_scope(&body).expect("fn scope");
    assert_eq!(fn_scope.kind(), "function_definition");
    let outer = helpers.enclosing_scope(&fn_scope).expect("outer");
    assert_eq!(outer.kind(), "translation_unit");
}

#[test]
fn parameters_scope_to_the_function_definition() {
    let (tree, helpers) = setup("void f(int a) { }\n");
    let a = ident(&tree, "a");
    let scope = helpers.enclosing_scope(&a).expect("scope");
    assert_eq!(scope.kind(), "function_definition");
}

#[test]
fn function_name_scopes_to_the_parent() {
    let (tree, helpers) = setup("void f(int a) { }\n");
    let f = ident(&tree, "f");
    let scope = helpers.enclosing_scope(&f).expect("scope");
    assert_eq!(scope.kind(), "translation_unit");
}

#[test]
fn struct_fields_scope_to_the_field_list() {
    let (tree, helpers) = setup("struct point { int x; int y; };\n");
    let x = ident(&tree, "x");
    let scope = helpers.enclosing_scope(&x).expect("scope");
    assert_eq!(scope.kind(), "field_declaration_list");
    let idents = helpers.scope_identifiers(&scope);
    let names: Vec<String> = idents.iter().map(|n| n.text()).collect();
    assert!(names.contains(&"x".to_owned()) && names.contains(&"y".to_owned()));
}

#[test]
fn scope_identifiers_exclude_nested_scopes() {
    let (tree, helpers) = setup("int g;\nint main(void) { int local; return local; }\n");
    let root = tree.root().expect("root");
    let idents = helpers.scope_identifiers(&root);
    let names: Vec<String> = idents.iter().map(|n| n.text()).collect();
    assert!(names.contains(&"g".to_owned()));
    assert!(names.contains(&"main".to_owned()));
    assert!(!names.contains(&"local".to_owned()));
}
