mod cli;
mod commands;

use std::path::PathBuf;

use commands::transpile::TranspileOptions;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = match cli::build_cli().try_get_matches() {
        Ok(m) => m,
        Err(err) => {
            // clap renders --help/--version through the error path too.
            if err.use_stderr() {
                eprintln!("{err}");
                std::process::exit(1);
            }
            err.print().ok();
            std::process::exit(0);
        }
    };

    let paths: Vec<PathBuf> = matches
        .get_many::<PathBuf>("paths")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let status = if matches.get_flag("ast") {
        commands::ast::run(paths)
    } else if matches.get_flag("test") {
        commands::test::run(paths)
    } else if matches.get_flag("transpile") {
        commands::transpile::run(TranspileOptions {
            paths,
            output: matches.get_one::<PathBuf>("output").cloned(),
            write: matches.get_flag("write"),
            run: matches.get_flag("run"),
        })
    } else {
        eprintln!("upp: pick a mode: --transpile/-T, --ast, or --test/-t (see --help)");
        1
    };
    std::process::exit(status);
}
