use std::{
    fs::File,
    path::{Path, PathBuf},
    process::exit,
};

use clap::{Parser, Subcommand};
use fnptr::{
    check::{check, ExitCode},
    line_names::{parse_lines, LineNames, ParseError},
};
use thiserror::Error;

#[derive(Subcommand, Debug)]
enum Command {
    /// Compares a call-site report against an expected answer
    Check {
        /// Report to check
        file: PathBuf,
        /// Expected answer
        #[arg(long = "std")]
        standard: Option<PathBuf>,
        /// Requires exactly one space around colons and after commas
        #[arg(short, long)]
        strict: bool,
        /// Only checks the format of the report
        #[arg(short, long)]
        format_only: bool,
    },
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    log: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let args = Args::parse();

    if let Some(log) = args.log {
        let log_file = match File::create(&log) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Cannot create {}: {}", log.display(), e);
                exit(ExitCode::Usage as i32);
            }
        };
        let level = if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(log_file)
            .init();
    }

    match args.command {
        Command::Check {
            file,
            standard,
            strict,
            format_only,
        } => {
            if !format_only && standard.is_none() {
                eprintln!("Neither format-only flag nor standard file is given!");
                exit(ExitCode::Usage as i32);
            }
            if format_only && standard.is_some() {
                eprintln!("Warning: standard file is ignored due to format-only flag.");
            }

            let yours = match parse_file(&file, strict) {
                Ok(lines) => lines,
                Err(e) => {
                    println!("Input file format error\n{}", e);
                    exit(ExitCode::InputFormatError as i32);
                }
            };
            tracing::info!("{} lines in {}", yours.len(), file.display());
            let standard = match standard {
                Some(standard) if !format_only => standard,
                _ => return,
            };
            let answer = match parse_file(&standard, strict) {
                Ok(lines) => lines,
                Err(e) => {
                    println!("Answer file format error\n{}", e);
                    exit(ExitCode::AnswerFormatError as i32);
                }
            };

            if let Err(e) = check(&yours, &answer) {
                println!("{}\n", e);
                exit(e.code() as i32);
            }
            println!("Correct");
        }
    }
}

#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn parse_file(path: &Path, strict: bool) -> Result<Vec<LineNames>, FileError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_lines(&text, strict)?)
}
