//! `uppcc`: C compiler wrapper.
//!
//! Usage: `uppcc <cc> <args...>`. Every `.c` argument with a `.cup`
//! neighbor is transpiled in place first; `-I` arguments become include
//! search roots for `@include`; dependency-generation flags
//! (`-MD`/`-MMD`/`-MF`/`-MT`/`-MQ`) pass through to the compiler
//! untouched. Finally the wrapped compiler command is executed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use upp_engine::{Registry, RegistryConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((cc, cc_args)) = args.split_first() else {
        eprintln!("usage: uppcc <cc> <args...>");
        std::process::exit(1);
    };

    let include_paths = include_paths(cc_args);
    for source in cup_sources(cc_args) {
        if let Err(code) = transpile_in_place(&source, &include_paths) {
            std::process::exit(code);
        }
    }

    match Command::new(cc).args(cc_args).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => {
            eprintln!("uppcc: {cc}: {err}");
            std::process::exit(1);
        }
    }
}

/// `-I` roots, in both fused (`-Ipath`) and split (`-I path`) forms.
fn include_paths(args: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-I" {
            if let Some(path) = iter.next() {
                out.push(PathBuf::from(path));
            }
        } else if let Some(rest) = arg.strip_prefix("-I") {
            out.push(PathBuf::from(rest));
        }
    }
    out
}

/// The `.cup` neighbors of `.c` arguments. Values of flags that take a
/// file operand are not source candidates.
fn cup_sources(args: &[String]) -> Vec<PathBuf> {
    const TAKES_VALUE: &[&str] = &["-o", "-MF", "-MT", "-MQ", "-I", "-include"];
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if TAKES_VALUE.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        let path = Path::new(arg);
        if path.extension().and_then(|e| e.to_str()) == Some("c") {
            let cup = path.with_extension("cup");
            if cup.is_file() {
                out.push(cup);
            }
        }
    }
    out
}

fn transpile_in_place(source_path: &Path, include_paths: &[PathBuf]) -> Result<(), i32> {
    let source = std::fs::read_to_string(source_path).map_err(|err| {
        eprintln!("uppcc: {}: {err}", source_path.display());
        1
    })?;
    let mut config = RegistryConfig {
        file_path: Some(source_path.to_path_buf()),
        include_paths: include_paths.to_vec(),
        ..RegistryConfig::default()
    };
    config = config.with_materialize(Rc::new(|path, text, _authoritative| {
        if let Err(err) = std::fs::write(path, text) {
            eprintln!("uppcc: {}: {err}", path.display());
        }
    }));
    let registry = Registry::new(config);

    let output = registry.transform(&source, source_path).map_err(|err| {
        eprintln!("uppcc: {}: {err}", source_path.display());
        1
    })?;
    {
        let diags = registry.diagnostics();
        let diags = diags.borrow();
        if !diags.is_empty() {
            eprintln!("{}", diags.printer().source(&source).render());
        }
        if diags.has_errors() {
            return Err(1);
        }
    }
    let out = source_path.with_extension("c");
    std::fs::write(&out, output).map_err(|err| {
        eprintln!("uppcc: {}: {err}", out.display());
        1
    })
}
