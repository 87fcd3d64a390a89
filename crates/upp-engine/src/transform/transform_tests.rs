//! End-to-end transformation tests.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indoc::indoc;

use upp_core::is_identifier_kind;

use crate::error::UppError;
use crate::macros::{Expansion, MacroValue};
use crate::registry::{DependencyCache, Registry, RegistryConfig};
use crate::transform::rules::PendingRule;

fn transform(registry: &Registry, source: &str) -> String {
    registry
        .transform(source, Path::new("test.cup"))
        .expect("transform succeeds")
}

#[test]
fn trivial_passthrough() {
    let registry = Registry::new(RegistryConfig::default());
    let source = "int main(void) { return 0; }\n";
    assert_eq!(transform(&registry, source), source);
}

#[test]
fn inline_substitution_emits_the_returned_string_verbatim() {
    let registry = Registry::new(RegistryConfig::default());
    let source = indoc! {r#"
        @define greet(name) { return `"Hello, " + name + "!"`; }
        const char *msg = @greet(world);
    "#};
    let output = transform(&registry, source);
    assert!(
        output.contains(r#"const char *msg = "Hello, " + world + "!";"#),
        "unexpected output: {output}"
    );
    assert!(!output.contains('@'));
}

#[test]
fn rename_with_references_is_hygienic_and_idempotent() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "rename",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            let decl = exp.consume(Some("declaration"))?;
            let ident = decl
                .find_where(|n| is_identifier_kind(n.kind()))
                .into_iter()
                .next()
                .ok_or_else(|| UppError::consume("declaration without a name"))?;
            exp.helpers().with_references(&decl, |_node, is_declaration| {
                if is_declaration {
                    Ok(MacroValue::Undefined)
                } else {
                    Ok(MacroValue::Str("ctr".into()))
                }
            });
            ident.replace_with("ctr", true);
            Ok(MacroValue::Node(decl))
        }),
    );

    let source = indoc! {r#"
        @rename
        int counter;
        int main(void) {
            counter++;
            return counter;
        }
    "#};
    let output = transform(&registry, source);
    assert!(output.contains("int ctr;"), "output: {output}");
    assert!(output.contains("ctr++;"), "output: {output}");
    assert!(output.contains("return ctr;"), "output: {output}");
    assert!(!output.contains("counter"), "output: {output}");

    // Running the engine again over the first output changes nothing.
    let second = Registry::new(RegistryConfig::default());
    assert_eq!(transform(&second, &output), output);
}

#[test]
fn include_materializes_the_header_before_the_including_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("b.hup"),
        "@define pair(a, b) { return `a + b`; }\ntypedef int pair_seed;\n",
    )
    .expect("write b.hup");
    let a_path = dir.path().join("a.cup");
    let a_source = "@include(\"b.hup\")\nint main(void) { return 0; }\n";
    std::fs::write(&a_path, a_source).expect("write a.cup");

    let emitted: Rc<RefCell<Vec<(PathBuf, String, bool)>>> = Rc::default();
    let sink = Rc::clone(&emitted);
    let cache = DependencyCache::new();
    let config = RegistryConfig::default()
        .with_cache(cache.clone())
        .with_materialize(Rc::new(move |path, text, authoritative| {
            sink.borrow_mut()
                .push((path.to_path_buf(), text.to_owned(), authoritative));
        }));
    let registry = Registry::new(config);
    let output = registry
        .transform(a_source, &a_path)
        .expect("transform succeeds");

    assert!(output.contains("#include \"b.h\""), "output: {output}");
    {
        let emitted = emitted.borrow();
        assert_eq!(emitted.len(), 1, "b.h materialized exactly once");
        assert_eq!(emitted[0].0, dir.path().join("b.h"));
        assert!(emitted[0].1.contains("typedef int pair_seed;"));
        assert!(emitted[0].2, "full passes are authoritative");
    }
    // The included file's macros became visible to the including registry.
    assert!(registry.lookup_macro("pair").is_some());

    // A second build against the same cache replays instead of re-running,
    // with identical materialization.
    let first_emit = emitted.borrow()[0].clone();
    let sink = Rc::clone(&emitted);
    let config = RegistryConfig::default()
        .with_cache(cache.clone())
        .with_materialize(Rc::new(move |path, text, authoritative| {
            sink.borrow_mut()
                .push((path.to_path_buf(), text.to_owned(), authoritative));
        }));
    let registry = Registry::new(config);
    let second_output = registry
        .transform(a_source, &a_path)
        .expect("transform succeeds");
    assert_eq!(second_output, output);
    let emitted = emitted.borrow();
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[1], first_emit);
    assert_eq!(cache.len(), 1);
}

#[test]
fn missing_dependencies_are_fatal() {
    let registry = Registry::new(RegistryConfig::default());
    let result = registry.transform("@include(\"nowhere.hup\")\n", Path::new("a.cup"));
    assert!(result.is_err());
}

#[test]
fn pending_rules_fire_on_nodes_inserted_after_registration() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "rule",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            exp.helpers().inner_add_rule_for_tests();
            Ok(MacroValue::Null)
        }),
    );
    registry.register_native(
        "insert",
        "",
        Rc::new(|_exp: &mut Expansion<'_>, _args: &[String]| {
            Ok(MacroValue::Str("int AA;".into()))
        }),
    );

    let source = "@rule\nint main(void) { return 0; }\n@insert\n";
    let output = transform(&registry, source);
    assert!(output.contains("int BB;"), "output: {output}");
    assert!(!output.contains("AA"), "output: {output}");
}

#[test]
fn variadic_macros_collect_rest_and_enforce_arity() {
    let registry = Registry::new(RegistryConfig::default());
    let source = indoc! {"
        @define args(fmt, ...rest) { rest.length }
        const int n = @args(a, b, c);
    "};
    let output = transform(&registry, source);
    assert!(output.contains("const int n = 2;"), "output: {output}");

    let registry = Registry::new(RegistryConfig::default());
    let source = indoc! {"
        @define args(fmt, ...rest) { rest.length }
        const int n = @args();
    "};
    let output = transform(&registry, source);
    // The invocation contributed nothing and the arity error was reported.
    assert!(output.contains("/*@args()*/"), "output: {output}");
    let diags = registry.diagnostics();
    assert!(diags.borrow().iter().any(|d| d.code() == Some("UPP002")));
}

#[test]
fn unknown_macros_report_and_leave_the_comment() {
    let registry = Registry::new(RegistryConfig::default());
    let output = transform(&registry, "int x = 1;\n@nosuch(1)\n");
    assert!(output.contains("/*@nosuch(1)*/"));
    let diags = registry.diagnostics();
    assert!(diags.borrow().iter().any(|d| d.code() == Some("UPP001")));
}

#[test]
fn consume_mismatch_reports_a_typed_error() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "wants_decl",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            exp.consume(Some("declaration")).map(MacroValue::Node)
        }),
    );
    let source = "@wants_decl\nvoid f(void) { }\n";
    let output = transform(&registry, source);
    assert!(output.contains("void f(void)"), "output: {output}");
    let diags = registry.diagnostics();
    assert!(diags.borrow().iter().any(|d| d.code() == Some("UPP008")));
}

#[test]
fn with_pattern_rules_fire_eagerly_during_the_walk() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "pat",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            exp.helpers().with_pattern(
                "number_literal",
                |n, _| n.text() == "7",
                |_, _| Ok(MacroValue::Str("42".into())),
            );
            Ok(MacroValue::Null)
        }),
    );
    let output = transform(&registry, "@pat\nint x = 7;\nint y = 8;\n");
    assert!(output.contains("int x = 42;"), "output: {output}");
    assert!(output.contains("int y = 8;"), "output: {output}");
}

#[test]
fn with_match_rules_fire_on_kinds_within_the_scope() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "m",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            let root = exp
                .helpers()
                .tree()
                .root()
                .ok_or_else(|| UppError::consume("empty tree"))?;
            exp.helpers().with_match(&root, &["number_literal"], |n, _| {
                if n.text() == "7" {
                    Ok(MacroValue::Str("42".into()))
                } else {
                    Ok(MacroValue::Undefined)
                }
            });
            Ok(MacroValue::Null)
        }),
    );
    let output = transform(&registry, "@m\nint x = 7;\n");
    assert!(output.contains("int x = 42;"), "output: {output}");
}

#[test]
fn deferred_tasks_run_when_the_walk_reaches_them() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "later",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            let trigger = exp.defer(|_exp| Ok(MacroValue::Str("int deferred_done;".into())));
            Ok(MacroValue::Str(trigger))
        }),
    );
    let output = transform(&registry, "@later\nint main(void) { return 0; }\n");
    assert!(output.contains("int deferred_done;"), "output: {output}");
    assert!(!output.contains("deferred_task"), "output: {output}");
}

#[test]
fn runaway_pending_rules_hit_the_iteration_bound() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_native(
        "runaway",
        "",
        Rc::new(|exp: &mut Expansion<'_>, _args: &[String]| {
            exp.helpers().inner_add_runaway_rule_for_tests();
            Ok(MacroValue::Null)
        }),
    );
    let source = "@runaway\nint qseed;\n";
    // Must terminate despite the rule producing a fresh node every firing.
    let _ = transform(&registry, source);
    let diags = registry.diagnostics();
    assert!(diags.borrow().iter().any(|d| d.code() == Some("UPP005")));
}

impl crate::helpers::Helpers {
    /// Test shim: identifier `AA` rewrites to `BB`.
    fn inner_add_rule_for_tests(&self) {
        self.add_pending_rule(PendingRule::new(
            Rc::new(|n, _| n.kind() == "identifier" && n.text() == "AA"),
            Rc::new(|_, _| Ok(MacroValue::Str("BB".into()))),
            None,
        ));
    }

    /// Test shim: a rule that never converges (every firing mints a fresh
    /// identifier that matches again).
    fn inner_add_runaway_rule_for_tests(&self) {
        self.add_pending_rule(PendingRule::new(
            Rc::new(|n, _| n.kind() == "identifier" && n.text().starts_with('q')),
            Rc::new(|_, _| {
                Ok(MacroValue::Nodes(vec![MacroValue::Str("qq".into())]))
            }),
            None,
        ));
    }
}
