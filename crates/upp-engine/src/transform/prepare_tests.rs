//! Source preparation tests.

use indoc::indoc;

use upp_core::c;

use super::prepare::{parse_invocation_text, prepare_source, split_args};

#[test]
fn extracts_a_define_block() {
    let src = indoc! {r#"
        @define greet(name) { return `"hi " + name`; }
        int main(void) { return 0; }
    "#};
    let prepared = prepare_source(src, &c(), false);
    assert_eq!(prepared.defines.len(), 1);
    let def = &prepared.defines[0];
    assert_eq!(def.name, "greet");
    assert_eq!(def.params, "name");
    assert!(def.body.contains("return"));
    assert!(!prepared.clean.contains("@define"));
    // Line structure survives the blanking.
    assert_eq!(
        prepared.clean.lines().count(),
        src.lines().count(),
    );
}

#[test]
fn brace_matching_ignores_braces_in_strings_and_comments() {
    let src = indoc! {r#"
        @define tricky() {
            return "{" + `}`; // }
            /* } */
        }
        int x;
    "#};
    let prepared = prepare_source(src, &c(), false);
    assert_eq!(prepared.defines.len(), 1);
    assert!(prepared.clean.contains("int x;"));
    assert!(!prepared.clean.contains("tricky"));
}

#[test]
fn multiline_bodies_blank_to_matching_lines() {
    let src = "@define two() {\n    return `a`;\n}\nint x;\n";
    let prepared = prepare_source(src, &c(), false);
    assert_eq!(prepared.defines.len(), 1);
    assert_eq!(prepared.clean.lines().count(), src.lines().count());
    assert!(prepared.clean.contains("int x;"));
}

#[test]
fn comments_mode_preserves_the_span_as_a_comment() {
    let src = "@define keep() { return `1`; }\nint x;\n";
    let prepared = prepare_source(src, &c(), true);
    assert!(prepared.clean.starts_with("/*"));
    assert!(prepared.clean.contains("keep"));
    assert!(prepared.clean.contains("int x;"));
    assert_eq!(prepared.clean.len(), src.len());
}

#[test]
fn masks_invocations_as_comments() {
    let src = "const char *msg = @greet(world);\n";
    let prepared = prepare_source(src, &c(), false);
    assert_eq!(prepared.invocations.len(), 1);
    let inv = &prepared.invocations[0];
    assert_eq!(inv.name, "greet");
    assert_eq!(inv.args, vec!["world".to_owned()]);
    assert_eq!(inv.line, 1);
    assert!(prepared.clean.contains("/*@greet(world)*/"));
    assert_eq!(
        &prepared.clean[inv.start..inv.end],
        "/*@greet(world)*/"
    );
}

#[test]
fn bare_and_empty_invocations_both_have_no_args() {
    let prepared = prepare_source("@foo\nint a;\n@bar()\n", &c(), false);
    assert_eq!(prepared.invocations.len(), 2);
    assert!(prepared.invocations[0].args.is_empty());
    assert!(prepared.invocations[1].args.is_empty());
}

#[test]
fn invocations_inside_comments_and_strings_are_skipped() {
    let src = indoc! {r#"
        // @nope()
        /* @also_not() */
        const char *s = "@still_not";
        const char q = '@';
        int x = @yes(1);
    "#};
    let prepared = prepare_source(src, &c(), false);
    assert_eq!(prepared.invocations.len(), 1);
    assert_eq!(prepared.invocations[0].name, "yes");
}

#[test]
fn quoted_arguments_keep_their_quotes() {
    let prepared = prepare_source("@include(\"b.hup\")\n", &c(), false);
    assert_eq!(prepared.invocations[0].args, vec!["\"b.hup\"".to_owned()]);
}

#[test]
fn line_and_column_are_one_based() {
    let prepared = prepare_source("int a;\n  @mark\n", &c(), false);
    let inv = &prepared.invocations[0];
    assert_eq!(inv.line, 2);
    assert_eq!(inv.col, 3);
}

#[test]
fn parses_masked_invocation_text() {
    assert_eq!(
        parse_invocation_text("/*@greet(world)*/"),
        Some(("greet".to_owned(), vec!["world".to_owned()]))
    );
    assert_eq!(
        parse_invocation_text("/*@bare*/"),
        Some(("bare".to_owned(), Vec::new()))
    );
    assert_eq!(parse_invocation_text("/* ordinary comment */"), None);
}

#[test]
fn split_args_trims_and_drops_empties() {
    assert_eq!(split_args("a, b , ,c"), vec!["a", "b", "c"]);
    assert!(split_args("").is_empty());
    assert!(split_args("  ").is_empty());
}
