//! qcc - a small compiler for a C subset
//!
//! Pipeline: source text -> tokens -> AST -> type-checked AST -> QBE IL.

mod frontend;
mod middle;
mod types;
mod utils;

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser as ClapParser;
use log::debug;

use frontend::dumper::AstDumper;
use frontend::lexer::Lexer;
use frontend::parser::Parser;
use frontend::semantic::TypeChecker;
use middle::ir_gen::QbeIrGen;

/// A simple C compiler.
#[derive(ClapParser, Debug)]
#[command(name = "qcc")]
#[command(version = "0.1.0")]
#[command(about = "A small compiler for a C subset, emitting QBE intermediate language")]
struct Cli {
    /// Input source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Write output to <file>
    #[arg(short, long, value_name = "FILE", default_value = "test.ssa")]
    output: PathBuf,

    /// Dump the abstract syntax tree
    #[arg(short, long)]
    dump: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let tokens = Lexer::new(&source).tokenize()?;
    debug!("lexed {} token(s)", tokens.len());

    let mut program = Parser::new(tokens).parse_program()?;
    debug!("parsed {} function(s)", program.funcs.len());

    // Analyses and transformations on the AST. The check must complete
    // before any IR is emitted.
    TypeChecker::new().check(&mut program)?;

    if cli.dump {
        print!("{}", AstDumper::new().dump(&program));
    }

    let ir = QbeIrGen::new().generate(&program);
    fs::write(&cli.output, ir)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    Ok(())
}
