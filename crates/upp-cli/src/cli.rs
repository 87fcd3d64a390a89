//! Shared argument builders for the `upp` front end.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

/// Transpile mode (-T/--transpile/--translate).
pub fn transpile_arg() -> Arg {
    Arg::new("transpile")
        .short('T')
        .long("transpile")
        .alias("translate")
        .action(ArgAction::SetTrue)
        .help("Transform the given files and emit standard C")
}

/// AST dump mode (--ast).
pub fn ast_arg() -> Arg {
    Arg::new("ast")
        .long("ast")
        .action(ArgAction::SetTrue)
        .help("Dump the prepared syntax tree as JSON")
}

/// Golden test mode (-t/--test).
pub fn test_arg() -> Arg {
    Arg::new("test")
        .short('t')
        .long("test")
        .action(ArgAction::SetTrue)
        .help("Transform files and compare against *.expected.c neighbors")
}

/// Single output file (-o).
pub fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("Write the (single) output to FILE")
}

/// Materialize in place (-w/--write).
pub fn write_arg() -> Arg {
    Arg::new("write")
        .short('w')
        .long("write")
        .action(ArgAction::SetTrue)
        .help("Materialize generated files next to their sources")
}

/// Compile and run the result (-r/--run).
pub fn run_arg() -> Arg {
    Arg::new("run")
        .short('r')
        .long("run")
        .action(ArgAction::SetTrue)
        .help("Compile the transformed output with cc and run it")
}

/// Input files or directories (positional).
pub fn paths_arg() -> Arg {
    Arg::new("paths")
        .value_name("PATH")
        .num_args(1..)
        .value_parser(value_parser!(PathBuf))
        .help("Files or directories (directories are searched for .cup/.hup)")
}

pub fn build_cli() -> Command {
    Command::new("upp")
        .about("Hygienic tree-aware macro preprocessor for C")
        .arg(transpile_arg())
        .arg(ast_arg())
        .arg(test_arg())
        .arg(output_arg())
        .arg(write_arg())
        .arg(run_arg())
        .arg(paths_arg())
}
