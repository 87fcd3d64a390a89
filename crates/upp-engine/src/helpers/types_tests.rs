//! Type extraction and signature tests.

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
fn pointer_declarations_accumulate_stars() {
    let (tree, helpers) = setup("char *s;\n");
    assert_eq!(helpers.get_type(&ident(&tree, "s"), false).expect("type"), "char *");

    let (tree, helpers) = setup("int **pp;\n");
    assert_eq!(helpers.get_type(&ident(&tree, "pp"), false).expect("type"), "int **");
}

#[test]
fn array_declarations_accumulate_brackets() {
    let (tree, helpers) = setup("int arr[3];\n");
    assert_eq!(helpers.get_type(&ident(&tree, "arr"), false).expect("type"), "int[]");
}

#[test]
fn struct_types_keep_their_tag() {
    let (tree, helpers) = setup("struct point { int x; };\nstruct point p;\n");
    let ty = helpers.get_type(&ident(&tree, "p"), false).expect("type");
    assert_eq!(ty, "struct point");
}

#[test]
fn typedefs_resolve_when_asked() {
    let (tree, helpers) = setup("typedef char *str_t;\nstr_t name;\n");
    let name = ident(&tree, "name");
    assert_eq!(helpers.get_type(&name, false).expect("type"), "str_t");
    assert_eq!(helpers.get_type(&name, true).expect("type"), "char *");
}

#[test]
fn typedef_chains_terminate() {
    let (tree, helpers) = setup("typedef int a_t;\ntypedef a_t b_t;\nb_t v;\n");
    assert_eq!(helpers.get_type(&ident(&tree, "v"), true).expect("type"), "int");
}

#[test]
fn function_signature_decomposes() {
    let (tree, helpers) = setup("static int *foo(int a, char *b) { return 0; }\n");
    let fn_node = tree
        .root()
        .expect("root")
        .find_kind("function_definition")
        .into_iter()
        .next()
        .expect("function");
    let sig = helpers.get_function_signature(&fn_node).expect("signature");
    assert_eq!(sig.return_type, "int *");
    assert_eq!(sig.name, "foo");
    assert_eq!(sig.params.len(), 2);
    assert_eq!(sig.params[0].type_text, "int");
    assert_eq!(sig.params[0].name.as_deref(), Some("a"));
    assert_eq!(sig.params[1].type_text, "char");
    assert_eq!(sig.params[1].name.as_deref(), Some("b"));
    assert_eq!(sig.name_node.text(), "foo");
    assert!(sig.body_node.is_some());
}

#[test]
fn declarations_have_no_body() {
    let (tree, helpers) = setup("int bar(void);\n");
    let decl = tree
        .root()
        .expect("root")
        .find_kind("declaration")
        .into_iter()
        .next()
        .expect("declaration");
    let sig = helpers.get_function_signature(&decl).expect("signature");
    assert_eq!(sig.name, "bar");
    assert!(sig.body_node.is_none());
}
