pub mod ast;
pub mod test;
pub mod transpile;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Expand the given paths: directories are searched recursively for
/// `.cup`/`.hup` sources.
pub fn collect_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() && is_upp_source(entry.path()) {
                    out.push(entry.path().to_path_buf());
                }
            }
        } else {
            out.push(path.clone());
        }
    }
    out
}

fn is_upp_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("cup") | Some("hup")
    )
}

/// Companion output path: `.cup` -> `.c`, `.hup` -> `.h`, anything else
/// gains `.out`.
pub fn output_path(source: &Path) -> PathBuf {
    match source.extension().and_then(|e| e.to_str()) {
        Some("cup") => source.with_extension("c"),
        Some("hup") => source.with_extension("h"),
        _ => source.with_extension("out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_map_suffixes() {
        assert_eq!(output_path(Path::new("a.cup")), PathBuf::from("a.c"));
        assert_eq!(output_path(Path::new("dir/b.hup")), PathBuf::from("dir/b.h"));
        assert_eq!(output_path(Path::new("odd.txt")), PathBuf::from("odd.out"));
    }

    #[test]
    fn directories_are_searched_for_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.cup"), "int x;\n").expect("write");
        std::fs::write(dir.path().join("b.hup"), "int y;\n").expect("write");
        std::fs::write(dir.path().join("ignored.c"), "int z;\n").expect("write");

        let found = collect_sources(&[dir.path().to_path_buf()]);
        let names: Vec<String> = found
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["a.cup", "b.hup"]);
    }

    #[test]
    fn explicit_files_pass_through() {
        let found = collect_sources(&[PathBuf::from("whatever.weird")]);
        assert_eq!(found, vec![PathBuf::from("whatever.weird")]);
    }
}
