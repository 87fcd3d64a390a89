//! The golden test command: transform each source and compare against its
//! `*.expected.c` (or `.expected.h`) neighbor.

use std::path::{Path, PathBuf};

use upp_engine::{DependencyCache, Registry, RegistryConfig};

use super::collect_sources;

pub fn run(paths: Vec<PathBuf>) -> i32 {
    let sources = collect_sources(&paths);
    if sources.is_empty() {
        eprintln!("upp: no input files");
        return 1;
    }
    let cache = DependencyCache::new();
    let mut failures = 0usize;
    let mut ran = 0usize;

    for path in &sources {
        let Some(expected_path) = expected_neighbor(path) else {
            continue;
        };
        ran += 1;
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("FAIL {} ({err})", path.display());
                failures += 1;
                continue;
            }
        };
        let expected = match std::fs::read_to_string(&expected_path) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("FAIL {} ({err})", expected_path.display());
                failures += 1;
                continue;
            }
        };
        let config = RegistryConfig {
            file_path: Some(path.clone()),
            ..RegistryConfig::default()
        }
        .with_cache(cache.clone());
        let registry = Registry::new(config);
        match registry.transform(&source, path) {
            Ok(output) if output == expected => println!("ok   {}", path.display()),
            Ok(output) => {
                eprintln!("FAIL {}", path.display());
                eprintln!("--- expected\n{expected}--- actual\n{output}");
                failures += 1;
            }
            Err(err) => {
                eprintln!("FAIL {} ({err})", path.display());
                failures += 1;
            }
        }
    }

    println!("{} test(s), {} failure(s)", ran, failures);
    if failures > 0 {
        1
    } else {
        0
    }
}

fn expected_neighbor(source: &Path) -> Option<PathBuf> {
    let stem = source.file_stem()?.to_str()?;
    let ext = match source.extension()?.to_str()? {
        "cup" => "c",
        "hup" => "h",
        _ => return None,
    };
    let candidate = source.with_file_name(format!("{stem}.expected.{ext}"));
    candidate.is_file().then_some(candidate)
}
