use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result, WrapErr};

use weft::{parser, RunState};

#[derive(Parser)]
#[command(name = "weft", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    /// Program to run, equivalent to `weft run`
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an assembly file or a binary image
    Run {
        /// The program to run
        name: PathBuf,
    },
    /// Assemble a source file into a binary image
    Asm {
        /// The source file to assemble
        name: PathBuf,
        /// Output path, defaulting to the source name with an `.obj`
        /// extension
        dest: Option<PathBuf>,
    },
    /// Assemble a source file without writing an image
    Check {
        /// The source file to check
        name: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .context_lines(weft::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))
    .into_diagnostic()?;

    let args = Args::parse();
    match args.command {
        Some(Command::Run { name }) => run(&name),
        Some(Command::Asm { name, dest }) => asm(&name, dest),
        Some(Command::Check { name }) => check(&name),
        None => match args.path {
            Some(path) => run(&path),
            None => {
                banner();
                Ok(())
            }
        },
    }
}

fn run(name: &Path) -> Result<()> {
    let mut state = load_program(name)?;
    state.run();
    Ok(())
}

/// Binary images run as-is; anything else is assembled first.
fn load_program(name: &Path) -> Result<RunState> {
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("obj" | "lc3") => {
            let bytes = fs::read(name)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read {}", name.display()))?;
            let words: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(RunState::from_raw(&words))
        }
        _ => {
            let src = read_source(name)?;
            let image = parser::assemble(&src)?;
            Ok(RunState::from_image(&image))
        }
    }
}

fn asm(name: &Path, dest: Option<PathBuf>) -> Result<()> {
    let src = read_source(name)?;
    let image = parser::assemble(&src)?;
    let out = dest.unwrap_or_else(|| name.with_extension("obj"));
    fs::write(&out, image.to_bytes())
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to write {}", out.display()))?;
    status("Finished", &format!("image written to {}", out.display()));
    Ok(())
}

fn check(name: &Path) -> Result<()> {
    let src = read_source(name)?;
    parser::assemble(&src)?;
    status("Success", &format!("{} assembles cleanly", name.display()));
    Ok(())
}

fn read_source(name: &Path) -> Result<String> {
    fs::read_to_string(name)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", name.display()))
}

/// Cargo-style right-aligned status line.
fn status(verb: &str, msg: &str) {
    println!("{:>12} {msg}", verb.green().bold());
}

fn banner() {
    println!("{}", "weft".bold());
    println!("An assembler and interpreter for the LC3 assembly language.");
    println!("Run with {} for usage information.", "--help".cyan());
}
