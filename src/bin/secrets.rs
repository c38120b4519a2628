//! Secrets management CLI — the operator-facing front-end for the
//! encrypted secrets store described in spec.md §4.2/§6.

use clap::{Parser, Subcommand};
use gitjob_supervisor::config::{DEFAULT_KEY_FILE, DEFAULT_SECRETS_FILE};
use gitjob_supervisor::secrets::SecretStore;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "gitjob-secrets", version, about = "Manage encrypted job secrets")]
struct Cli {
    /// Path to the encrypted secrets file.
    #[arg(short = 'f', long = "secrets-file", default_value = DEFAULT_SECRETS_FILE, global = true)]
    secrets_file: PathBuf,

    /// Path to the encryption key file.
    #[arg(short = 'k', long = "key-file", default_value = DEFAULT_KEY_FILE, global = true)]
    key_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a secret.
    Set { key: String, value: String },
    /// Print a masked secret.
    Get { key: String },
    /// Remove a secret.
    Delete { key: String },
    /// List all secret keys, sorted.
    List,
    /// Check whether a secret exists.
    Exists { key: String },
    /// Import secrets from environment variables sharing a prefix.
    Import {
        #[arg(default_value = SecretStore::DEFAULT_IMPORT_PREFIX)]
        prefix: String,
    },
    /// Copy the encrypted store to another file.
    Backup { file: PathBuf },
}

/// `clap::Parser::parse()` exits with code 2 on a usage error, but spec §6
/// documents "unknown command / missing required operands → exit 1" for
/// this CLI's surface. Parse manually so usage errors honor that contract
/// while `--help`/`--version` still exit 0.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

fn main() -> ExitCode {
    let cli = parse_args();
    let store = SecretStore::new(cli.secrets_file, cli.key_file);

    match run(&store, cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(store: &SecretStore, command: Command) -> gitjob_supervisor::Result<ExitCode> {
    match command {
        Command::Set { key, value } => {
            store.set(&key, &value)?;
            println!("Secret '{key}' set");
            Ok(ExitCode::SUCCESS)
        }
        Command::Get { key } => match store.get(&key)? {
            Some(value) => {
                println!("Secret '{key}': {}", mask(&value));
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Secret '{key}' not found");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Delete { key } => {
            if store.delete(&key)? {
                println!("Secret '{key}' deleted");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("Secret '{key}' not found");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::List => {
            let mut keys = store.keys()?;
            keys.sort();
            if keys.is_empty() {
                println!("No secrets stored");
            } else {
                for key in keys {
                    println!("{key}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Exists { key } => {
            if store.exists(&key)? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Import { prefix } => {
            let count = store.import_from_env(&prefix)?;
            println!("Imported {count} secret(s)");
            Ok(ExitCode::SUCCESS)
        }
        Command::Backup { file } => {
            if store.backup(&file)? {
                println!("Backed up to {}", file.display());
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("No secrets store to back up");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// A value of 8 characters or fewer is fully masked; longer values keep
/// their first and last 3 characters visible.
fn mask(value: &str) -> String {
    let len = value.chars().count();
    if len <= 8 {
        "*".repeat(len)
    } else {
        let chars: Vec<char> = value.chars().collect();
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[len - 3..].iter().collect();
        format!("{head}{}{tail}", "*".repeat(len - 6))
    }
}

#[cfg(test)]
mod tests {
    use super::mask;

    #[test]
    fn short_values_fully_masked() {
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask("12345678"), "********");
    }

    #[test]
    fn long_values_keep_head_and_tail() {
        let value = "secret_api_key_123";
        let expected = format!("sec{}123", "*".repeat(value.chars().count() - 6));
        assert_eq!(mask(value), expected);
    }
}
