//! Passgate CLI - inspect and verify captured WebAuthn ceremonies.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const AFTER_HELP: &str = "Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Verification failed or malformed ceremony data
  66  Input file missing or unreadable
  74  Cannot write output file";

#[derive(Parser)]
#[command(name = "passgate")]
#[command(author, version, about = "WebAuthn ceremony inspection and verification", long_about = None)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print machine-readable JSON instead of the human summary
    #[arg(long, global = true)]
    json: bool,

    /// When to color output
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// How a binary input file is encoded on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputEncoding {
    /// Hex if the text is valid hex, else base64url, else raw bytes
    Auto,
    Hex,
    Base64url,
    Raw,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump a CBOR item in diagnostic notation
    Decode {
        /// File holding the CBOR item
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Encoding of the file contents
        #[arg(short, long, value_enum, default_value_t = InputEncoding::Auto)]
        encoding: InputEncoding,
    },

    /// Summarize an attestation object or authenticator data
    Inspect {
        /// File holding the attestation object or authenticator data
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Encoding of the file contents
        #[arg(short, long, value_enum, default_value_t = InputEncoding::Auto)]
        encoding: InputEncoding,
    },

    /// Verify a registration response and emit the new credential source
    Register {
        /// Creation options JSON issued for this ceremony
        #[arg(long, value_name = "OPTIONS")]
        options: PathBuf,

        /// Credential JSON returned by the browser
        #[arg(long, value_name = "CREDENTIAL")]
        credential: PathBuf,

        /// Host the response was received on (defaults to the RP ID)
        #[arg(long)]
        host: Option<String>,

        /// Write the credential source here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Verify an assertion against a stored credential source
    Authenticate {
        /// Request options JSON issued for this ceremony
        #[arg(long, value_name = "OPTIONS")]
        options: PathBuf,

        /// Credential JSON returned by the browser
        #[arg(long, value_name = "CREDENTIAL")]
        credential: PathBuf,

        /// Stored credential source JSON
        #[arg(long, value_name = "SOURCE")]
        source: PathBuf,

        /// Base64url user handle of the user the server expects
        #[arg(long)]
        user_handle: Option<String>,

        /// Host the response was received on (defaults to the RP ID)
        #[arg(long)]
        host: Option<String>,

        /// Write the updated credential source here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Output switches shared by every command.
#[derive(Clone, Copy, Debug)]
pub struct Output {
    pub quiet: bool,
    pub json: bool,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet);

    let output = Output {
        quiet: cli.quiet,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Decode { file, encoding } => commands::decode::execute(file, encoding, output),
        Commands::Inspect { file, encoding } => commands::inspect::execute(file, encoding, output),
        Commands::Register {
            options,
            credential,
            host,
            output: out,
        } => commands::register::execute(options, credential, host, out, output),
        Commands::Authenticate {
            options,
            credential,
            source,
            user_handle,
            host,
            output: out,
        } => commands::authenticate::execute(
            commands::authenticate::Inputs {
                options,
                credential,
                source,
                user_handle,
                host,
            },
            out,
            output,
        ),
    };

    let exit = match result {
        Ok(()) => ExitCode::success(),
        Err(err) => {
            let exit = ExitCode::from_anyhow(&err);
            if output.json {
                println!("{}", exit.to_json());
            }
            if let Some(message) = &exit.message {
                eprintln!("{} {}", "error:".red().bold(), message);
            }
            exit
        }
    };

    std::process::exit(exit.code);
}
