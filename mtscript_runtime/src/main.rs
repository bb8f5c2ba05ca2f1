use anyhow::{Context, Result};
use clap::Parser;
use mtscript_runtime::{
    config::EvalConfig,
    environment::Env,
    interpret::Interpreter,
    output::{Channel, OutputEvent, OutputSink},
    run, stdlib,
    value::Value,
};
use mtscript_syntax::{compile, error::Diagnostic, parse::ParseMode};
use std::{
    fs,
    io::{self, Write},
};

/// Run mtscript programs, or start an interactive prompt.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Script file to run
    file: Option<String>,

    /// Program text to run instead of a file
    #[arg(short, long, conflicts_with = "file")]
    program: Option<String>,

    /// Evaluation steps allowed per run
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: usize,

    /// Maximum number of nested function calls
    #[arg(long, default_value_t = 64)]
    max_call_depth: usize,

    /// Statements and expressions evaluated at once across all calls
    #[arg(long, default_value_t = 512)]
    max_nesting: usize,

    /// Recover from syntax errors and report all of them
    #[arg(long)]
    lenient: bool,

    /// Print the parsed program instead of running it
    #[arg(long)]
    ast: bool,
}

/// Chat goes to stdout, debug output to stderr.
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, event: OutputEvent) {
        match event.channel {
            Channel::Chat => println!("{}", event.text),
            Channel::Debug => eprintln!("[debug] {}", event.text),
        }
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = EvalConfig::default()
        .with_max_steps(cli.max_steps)
        .with_max_call_depth(cli.max_call_depth)
        .with_max_nesting(cli.max_nesting)
        .with_parse_mode(if cli.lenient {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        });

    let source = match (&cli.file, &cli.program) {
        (Some(path), _) => {
            Some(fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?)
        }
        (None, Some(program)) => Some(program.clone()),
        (None, None) => None,
    };

    let registry = stdlib::registry().context("failed to set up built-in functions")?;
    let mut sink = StdoutSink;
    let mut interpreter = Interpreter::new(Env::new(), registry, config, &mut sink);
    match source {
        Some(source) if cli.ast => print_ast(&source, config.parse_mode),
        Some(source) => {
            if !run_source(&source, &mut interpreter) {
                std::process::exit(1);
            }
        }
        None => run_repl(&mut interpreter)?,
    }
    Ok(())
}

fn run_repl(interpreter: &mut Interpreter) -> Result<()> {
    let (stdin, mut stdout) = (io::stdin(), io::stdout());
    loop {
        let mut line = String::default();
        print!(">>> ");
        stdout.flush().context("failed to flush stdout")?;
        let n = stdin
            .read_line(&mut line)
            .context("failed to read line")?;
        // If zero bytes are read, then exit (usually triggered by Ctrl-D)
        if n == 0 {
            break;
        }
        match run(&line, interpreter) {
            Ok(Value::Undefined) => (),
            Ok(value) => println!("{}", value.describe()),
            Err(errors) => report(&errors),
        }
    }
    Ok(())
}

/// Returns whether the script ran without errors.
fn run_source(source: &str, interpreter: &mut Interpreter) -> bool {
    match run(source, interpreter) {
        Ok(_) => true,
        Err(errors) => {
            report(&errors);
            false
        }
    }
}

fn print_ast(source: &str, mode: ParseMode) {
    match compile(source, mode) {
        Ok(parsed) => {
            report(&parsed.diagnostics);
            println!("{}", parsed.ast);
        }
        Err(errors) => report(&errors),
    }
}

fn report(errors: &[Diagnostic]) {
    errors.iter().for_each(|e| eprintln!("{}", e.report()));
}
