//! Macro script compilation and evaluation tests.

use super::script::{BoundArg, Script};
use super::MacroValue;

fn eval(body: &str, env: &[(&str, BoundArg)]) -> MacroValue {
    let script = Script::compile(body).expect("script compiles");
    let env: Vec<(String, BoundArg)> = env
        .iter()
        .map(|(n, a)| ((*n).to_owned(), a.clone()))
        .collect();
    script.eval(&env).expect("script evaluates")
}

fn expect_str(value: MacroValue) -> String {
    match value {
        MacroValue::Str(s) => s,
        _ => panic!("expected a string result"),
    }
}

#[test]
fn templates_substitute_parameters_by_argument_text() {
    let value = eval(
        r#"return `"Hello, " + name + "!"`;"#,
        &[("name", BoundArg::One("world".to_owned()))],
    );
    assert_eq!(expect_str(value), r#""Hello, " + world + "!""#);
}

#[test]
fn single_expression_bodies_return_implicitly() {
    let value = eval(
        "`int name;`",
        &[("name", BoundArg::One("x".to_owned()))],
    );
    assert_eq!(expect_str(value), "int x;");
}

#[test]
fn concatenation_mixes_strings_and_parameters() {
    let value = eval(
        r#"return "a" + sep + "b";"#,
        &[("sep", BoundArg::One("-".to_owned()))],
    );
    assert_eq!(expect_str(value), "a-b");
}

#[test]
fn numbers_add_and_stringify() {
    assert_eq!(expect_str(eval("1 + 2", &[])), "3");
}

#[test]
fn rest_length_counts_variadic_arguments() {
    let value = eval(
        "rest.length",
        &[(
            "rest",
            BoundArg::Rest(vec!["b".to_owned(), "c".to_owned()]),
        )],
    );
    assert_eq!(expect_str(value), "2");
}

#[test]
fn rest_joins_with_commas() {
    let value = eval(
        "return rest;",
        &[(
            "rest",
            BoundArg::Rest(vec!["b".to_owned(), "c".to_owned()]),
        )],
    );
    assert_eq!(expect_str(value), "b, c");
}

#[test]
fn bodies_without_return_contribute_nothing() {
    let script = Script::compile("\"a\";\n\"b\";").expect("compiles");
    assert!(matches!(
        script.eval(&[]).expect("evaluates"),
        MacroValue::Undefined
    ));
}

#[test]
fn syntax_errors_carry_the_script_code() {
    let err = Script::compile("return )").expect_err("must not compile");
    assert_eq!(err.code(), Some("UPP003"));
}

#[test]
fn unknown_identifiers_error_at_evaluation() {
    let script = Script::compile("return nope;").expect("compiles");
    assert!(script.eval(&[]).is_err());
}
