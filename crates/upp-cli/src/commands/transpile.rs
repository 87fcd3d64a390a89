//! The transpile command.

use std::path::PathBuf;
use std::process::Command;
use std::rc::Rc;

use upp_engine::{DependencyCache, Registry, RegistryConfig};

use super::{collect_sources, output_path};

pub struct TranspileOptions {
    pub paths: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub write: bool,
    pub run: bool,
}

pub fn run(opts: TranspileOptions) -> i32 {
    let sources = collect_sources(&opts.paths);
    if sources.is_empty() {
        eprintln!("upp: no input files");
        return 1;
    }
    if opts.output.is_some() && sources.len() != 1 {
        eprintln!("upp: -o requires exactly one input file");
        return 1;
    }

    let cache = DependencyCache::new();
    let mut written: Vec<PathBuf> = Vec::new();
    let mut status = 0;

    for source_path in &sources {
        let source = match std::fs::read_to_string(source_path) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("upp: {}: {err}", source_path.display());
                status = 1;
                continue;
            }
        };

        let write = opts.write;
        let config = RegistryConfig {
            file_path: Some(source_path.clone()),
            ..RegistryConfig::default()
        }
        .with_cache(cache.clone())
        .with_materialize(Rc::new(move |path, text, _authoritative| {
            if write {
                if let Err(err) = std::fs::write(path, text) {
                    eprintln!("upp: {}: {err}", path.display());
                }
            }
        }));
        let registry = Registry::new(config);

        match registry.transform(&source, source_path) {
            Ok(output) => {
                let diags = registry.diagnostics();
                let diags = diags.borrow();
                if !diags.is_empty() {
                    eprintln!("{}", diags.printer().source(&source).render());
                }
                if diags.has_errors() {
                    status = 1;
                }

                if let Some(out) = &opts.output {
                    if let Err(err) = std::fs::write(out, &output) {
                        eprintln!("upp: {}: {err}", out.display());
                        status = 1;
                    } else {
                        written.push(out.clone());
                    }
                } else if opts.write {
                    let out = output_path(source_path);
                    if let Err(err) = std::fs::write(&out, &output) {
                        eprintln!("upp: {}: {err}", out.display());
                        status = 1;
                    } else {
                        written.push(out);
                    }
                } else {
                    print!("{output}");
                }
            }
            Err(err) => {
                eprintln!("upp: {}: {err}", source_path.display());
                status = 1;
            }
        }
    }

    if opts.run && status == 0 {
        status = compile_and_run(&written);
    }
    status
}

/// Best-effort `cc` invocation over the written C files, then run the
/// produced binary.
fn compile_and_run(written: &[PathBuf]) -> i32 {
    let c_files: Vec<&PathBuf> = written
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("c"))
        .collect();
    if c_files.is_empty() {
        eprintln!("upp: --run needs written .c output (use -w or -o)");
        return 1;
    }
    let exe = std::env::temp_dir().join("upp-run");
    let compile = Command::new("cc")
        .args(c_files.iter().map(|p| p.as_path()))
        .arg("-o")
        .arg(&exe)
        .status();
    match compile {
        Ok(s) if s.success() => {}
        Ok(s) => return s.code().unwrap_or(1),
        Err(err) => {
            eprintln!("upp: cc: {err}");
            return 1;
        }
    }
    match Command::new(&exe).status() {
        Ok(s) => s.code().unwrap_or(1),
        Err(err) => {
            eprintln!("upp: {}: {err}", exe.display());
            1
        }
    }
}
