//! `ifj23c`: command-line front end for the compiler library.

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use ifj23c::{compile, CompilerConfig};

/// Compile a small Swift-like source program to IFJcode23.
#[derive(Parser, Debug)]
#[command(name = "ifj23c", version, about)]
struct Cli {
    /// Source file to compile. Reads from stdin when omitted.
    file: Option<String>,

    /// Always inline the `substring` runtime helper, even if unused.
    #[arg(long)]
    always_inline_substring: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt().with_env_filter(filter.clone()).with_writer(io::stderr).init();

    let source = match &cli.file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: could not read '{path}': {e}");
                return ExitCode::from(99);
            }
        },
        None => {
            let mut buf = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buf) {
                eprintln!("error: could not read stdin: {e}");
                return ExitCode::from(99);
            }
            buf
        }
    };

    let config = CompilerConfig::new().with_always_inline_substring(cli.always_inline_substring).with_log_filter(filter);

    match compile(&source, &config) {
        Ok(program) => {
            println!("{program}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "compilation failed");
            eprintln!("{err}");
            ExitCode::from(err.code() as u8)
        }
    }
}
