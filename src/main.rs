use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jwtauth::config::{self, ConfigError};
use jwtauth::crypto::{SECRET_LENGTH, generate_secret};
use jwtauth::telemetry;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Generate the secret used to sign tokens.
    Secret {
        /// Configuration file receiving the secret.
        #[clap(long, short, default_value = config::DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Print the secret instead of writing it.
        #[clap(long, short)]
        show: bool,
        /// Number of characters of the secret.
        #[clap(long, short, default_value_t = SECRET_LENGTH)]
        length: usize,
    },
}

/// Generate a secret and store it in `path` unless `show` is set.
fn secret(path: &Path, show: bool, length: usize) -> Result<String, ConfigError> {
    let secret = generate_secret(length);
    if !show {
        config::write_secret(path, &secret)?;
    }

    Ok(secret)
}

fn main() -> ExitCode {
    telemetry::setup_tracing();

    let args = Args::parse();
    match args.cmd {
        Commands::Secret {
            config,
            show,
            length,
        } => match secret(&config, show, length) {
            Ok(secret) if show => {
                println!("{secret}");
                ExitCode::SUCCESS
            },
            Ok(_) => {
                println!("Secret has been written to {}.", config.display());
                ExitCode::SUCCESS
            },
            Err(err) => {
                tracing::error!(error = %err, path = %config.display(), "cannot write secret");
                ExitCode::FAILURE
            },
        },
    }
}
