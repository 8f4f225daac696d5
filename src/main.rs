use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use num_traits::ToPrimitive;

use plcparse::interpreter::{Interpreter, Value};
use plcparse::{analyzer, emitter, lexer, logger, parser};

#[derive(Parser, Debug)]
#[command(name = "plcparse", about = "PLC language toolchain")]
struct Args {
    /// Turn on verbose logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Tokenize the source and print the token stream.
    Lex { path: Option<PathBuf> },
    /// Parse the source and print the AST.
    Parse { path: Option<PathBuf> },
    /// Run semantic analysis and report the first violation, if any.
    Analyze { path: Option<PathBuf> },
    /// Evaluate the program and exit with main's return value.
    Run { path: Option<PathBuf> },
    /// Emit equivalent Java source.
    Emit { path: Option<PathBuf> },
}

fn read_source(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            Ok(buffer)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let (mode_name, path) = match &args.mode {
        Mode::Lex { path } => ("lex", path),
        Mode::Parse { path } => ("parse", path),
        Mode::Analyze { path } => ("analyze", path),
        Mode::Run { path } => ("run", path),
        Mode::Emit { path } => ("emit", path),
    };
    let source = read_source(path.as_ref())?;
    debug!("{mode_name}: read {} bytes of source", source.len());

    let tokens = lexer::tokenize(&source)?;
    debug!("lexed {} tokens", tokens.len());
    if let Mode::Lex { .. } = args.mode {
        for token in &tokens {
            println!("{:?} {:?} @{}", token.kind, token.literal, token.start);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let program = parser::parse_tokens(tokens)?;
    debug!(
        "parsed {} fields and {} methods",
        program.fields.len(),
        program.methods.len()
    );
    if let Mode::Parse { .. } = args.mode {
        println!("{program:#?}");
        return Ok(ExitCode::SUCCESS);
    }

    let analysis = analyzer::analyze(&program)?;
    if let Mode::Analyze { .. } = args.mode {
        println!("ok");
        return Ok(ExitCode::SUCCESS);
    }

    if let Mode::Emit { .. } = args.mode {
        print!("{}", emitter::emit(&program, &analysis)?);
        return Ok(ExitCode::SUCCESS);
    }

    let evaluation = Interpreter::new().run(&program)?;
    for line in &evaluation.output {
        println!("{line}");
    }
    debug!("main returned {:?}", evaluation.value);
    let code = match &evaluation.value {
        Value::Integer(value) => value.to_u8().unwrap_or(u8::MAX),
        _ => 0,
    };
    Ok(ExitCode::from(code))
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::configure(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
