use super::*;

#[test]
fn records_and_counts_messages() {
    let mut diags = Diagnostics::new();
    diags.error(Some("UPP003"), 4..9, "macro body syntax error");
    diags.warning(None, 0..1, "stale node");
    assert_eq!(diags.len(), 2);
    assert!(diags.has_errors());
    assert!(diags.has_warnings());
    assert_eq!(diags.error_count(), 1);
    assert_eq!(diags.warning_count(), 1);
}

#[test]
fn suppressed_codes_are_dropped() {
    let mut diags = Diagnostics::new();
    diags.suppress("UPP003");
    diags.error(Some("UPP003"), 0..1, "macro body syntax error");
    diags.error(Some("UPP001"), 0..1, "unknown macro");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags.iter().next().and_then(|d| d.code()), Some("UPP001"));
}

#[test]
fn plain_format_includes_code_and_range() {
    let mut diags = Diagnostics::new();
    diags.error(Some("UPP002"), 3..7, "wrong number of arguments");
    let rendered = diags.printer().render();
    assert_eq!(rendered, "error[UPP002] at 3..7: wrong number of arguments");
}

#[test]
fn annotated_render_points_at_the_source() {
    let source = "int x = @oops();\n";
    let start = source.find("@oops").expect("marker");
    let mut diags = Diagnostics::new();
    diags.error(Some("UPP001"), start..start + 5, "unknown macro 'oops'");
    let rendered = diags.printer().source(source).path("a.cup").render();
    assert!(rendered.contains("unknown macro 'oops'"));
    assert!(rendered.contains("a.cup"));
    assert!(rendered.contains("@oops"));
}
