use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use jlite::{
    parser, printer, Declaration, DiagnosticKind, ExecutionContext, Interpreter, JliteError,
    DEFAULT_MAX_CALL_DEPTH,
};

#[derive(Parser)]
#[command(author, version, about = "jlite language interpreter")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Class whose entry method starts the program
    #[arg(long, global = true, default_value = "Main")]
    entry_class: String,

    /// Zero-argument method called on a fresh entry-class instance
    #[arg(long, global = true, default_value = "main")]
    entry_method: String,

    /// Nested method calls allowed before the run aborts
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run a jlite program
    Run { script: PathBuf },
    /// Scan and parse a program, reporting diagnostics without running it
    Check { script: PathBuf },
    /// Print the canonical form of a program
    Fmt { script: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}

fn execute(args: Args) -> Result<(), JliteError> {
    let context = ExecutionContext {
        entry_class: args.entry_class,
        entry_method: args.entry_method,
        max_call_depth: args.max_call_depth,
    };
    match args.command {
        Command::Run { script } => {
            let source = read_source(&script)?;
            info!("running {}", script.display());
            Interpreter::new(context).run_source(&source)
        }
        Command::Check { script } => {
            let declarations = load(&script)?;
            println!(
                "{}: ok ({} declaration(s))",
                script.display(),
                declarations.len()
            );
            Ok(())
        }
        Command::Fmt { script } => {
            let declarations = load(&script)?;
            print!("{}", printer::print_program(&declarations));
            Ok(())
        }
    }
}

fn read_source(path: &Path) -> Result<String, JliteError> {
    let source = fs::read_to_string(path)
        .map_err(|err| io::Error::new(err.kind(), format!("{}: {err}", path.display())))?;
    Ok(source)
}

/// Reads and parses `path`, rejecting the program on any diagnostic.
fn load(path: &Path) -> Result<Vec<Declaration>, JliteError> {
    let source = read_source(path)?;
    info!("parsing {}", path.display());
    let parsed = parser::parse_source(&source);
    if parsed.has_errors() {
        return Err(JliteError::Rejected(parsed.diagnostics));
    }
    info!(declarations = parsed.declarations.len(), "parse finished");
    Ok(parsed.declarations)
}

fn report(err: &JliteError) {
    match err {
        JliteError::Rejected(diagnostics) => {
            for diagnostic in diagnostics {
                eprintln!("{diagnostic}");
            }
            eprintln!("error: {err}");
        }
        JliteError::Diagnostic(diagnostic) if !diagnostic.kind.is_language_error() => {
            eprintln!("fatal: {diagnostic}");
        }
        JliteError::Diagnostic(diagnostic) => eprintln!("{diagnostic}"),
        JliteError::Io(_) => eprintln!("error: {err}"),
    }
    if let Some(diagnostic) = err.diagnostic() {
        if diagnostic.kind == DiagnosticKind::Startup {
            eprintln!("  note: a program starts at a zero-argument method of its entry class");
        }
    }
}
