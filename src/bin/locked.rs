//! locked CLI - lock files into password-protected containers
//!
//! Command-line interface over the locker service: Argon2id key
//! derivation and AES-256-GCM authenticated encryption.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::process;

use locked::password::{PasswordReader, ReaderPasswordReader, TerminalPasswordReader};
use locked::{LockerError, locker};

#[derive(Parser)]
#[command(name = "locked")]
#[command(version)]
#[command(about = "Password-based file locker.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Log pipeline steps to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock a file into a container
    #[command(alias = "l")]
    Lock {
        /// Path to the file to lock
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Path of the container to create (default: <FILE>.locker)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Unlock a container back into a plain file
    #[command(alias = "u")]
    Unlock {
        /// Path to the .locker file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Path of the file to write (default: <original>_unlocked.<ext>)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the original filename stored in a container
    Peek {
        /// Path to the .locker file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn run(cli: Cli) -> locked::Result<()> {
    match cli.command {
        Commands::Lock { input, output } => {
            let output = output.unwrap_or_else(|| locker::default_locked_path(&input));
            let password = get_password_reader(cli.password_stdin).read_password()?;
            println!("Locking: {}", input.display());
            locker::lock_file(&input, &output, &password)?;
            println!("Locked to: {}", output.display());
        }
        Commands::Unlock { input, output } => {
            let output = match output {
                Some(output) => output,
                None => locker::default_unlocked_path(&locker::peek_filename(&input)?),
            };
            let password = get_password_reader(cli.password_stdin).read_password()?;
            println!("Unlocking: {}", input.display());
            locker::unlock_file(&input, &output, &password)?;
            println!("Unlocked to: {}", output.display());
        }
        Commands::Peek { input } => {
            println!("{}", locker::peek_filename(&input)?);
        }
    }
    Ok(())
}

fn get_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        Box::new(ReaderPasswordReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPasswordReader::new())
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Joins the error and its sources into one line.
fn error_chain(err: &LockerError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
