//! The AST dump command: prepared (masked) source, parsed, as JSON.

use std::path::PathBuf;

use serde_json::{json, Value};

use upp_core::{c, SourceNode, SourceTree};
use upp_engine::prepare_source;

use super::collect_sources;

pub fn run(paths: Vec<PathBuf>) -> i32 {
    let sources = collect_sources(&paths);
    if sources.is_empty() {
        eprintln!("upp: no input files");
        return 1;
    }
    let mut status = 0;
    for path in sources {
        let source = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("upp: {}: {err}", path.display());
                status = 1;
                continue;
            }
        };
        let prepared = prepare_source(&source, &c(), false);
        let tree = SourceTree::new(&prepared.clean, c());
        let dump = json!({
            "file": path.display().to_string(),
            "invocations": prepared
                .invocations
                .iter()
                .map(|inv| json!({
                    "name": inv.name,
                    "args": inv.args,
                    "line": inv.line,
                    "col": inv.col,
                }))
                .collect::<Vec<Value>>(),
            "macros": prepared
                .defines
                .iter()
                .map(|d| json!({ "name": d.name, "params": d.params }))
                .collect::<Vec<Value>>(),
            "root": tree.root().map(|r| node_json(&r)),
        });
        match serde_json::to_string_pretty(&dump) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("upp: {}: {err}", path.display());
                status = 1;
            }
        }
    }
    status
}

fn node_json(node: &SourceNode) -> Value {
    let children: Vec<Value> = node
        .named_children()
        .iter()
        .map(node_json)
        .collect();
    let mut obj = json!({
        "kind": node.kind(),
        "start": node.start(),
        "end": node.end(),
    });
    if let Some(field) = node.field_name() {
        obj["field"] = json!(field);
    }
    if children.is_empty() {
        obj["text"] = json!(node.text());
    } else {
        obj["children"] = Value::Array(children);
    }
    obj
}
