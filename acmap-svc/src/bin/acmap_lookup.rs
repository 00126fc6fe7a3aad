//! Alias lookup tool
//!
//! Prints the account names mapped to an alias.
//!
//! **Usage:**
//! ```bash
//! acmap-lookup [--config <FILE>] [--primary] [ALIAS...]
//! ```
//!
//! Words are joined with single spaces. With no words the alias is read from stdin.
//!
//! Exit codes: 0 success (matched or not), 1 empty alias, 2 store failure, 3 any
//! other error.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use acmap_common::config::load_config;
use acmap_common::{open_store, LookupService};
use acmap_svc::logging::init_tracing;

/// Alias lookup
#[derive(Parser, Debug)]
#[command(name = "acmap-lookup")]
#[command(about = "Look up the account names mapped to an alias")]
struct Args {
    /// Path to TOML config file (overrides ACMAP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print only the primary (first non-blank) account
    #[arg(long)]
    primary: bool,

    /// Alias to look up
    alias: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing("warn");

    let alias = if args.alias.is_empty() {
        match prompt("Enter Salesforce Account Name for lookup: ") {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read alias: {}", e);
                return ExitCode::from(3);
            }
        }
    } else {
        args.alias.join(" ")
    };

    let alias = alias.trim();
    if alias.is_empty() {
        eprintln!("Salesforce Account Name is required.");
        return ExitCode::from(1);
    }

    match run(&args, alias).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_store_failure() => {
            eprintln!("Store error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(3)
        }
    }
}

async fn run(args: &Args, alias: &str) -> acmap_common::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let lookup = LookupService::new(open_store(&config.store).await?);

    if args.primary {
        match lookup.find_primary_account(alias).await? {
            Some(primary) => println!("Primary_Name: {}", primary),
            None => println!("No match found."),
        }
        return Ok(());
    }

    let accounts = lookup.find_accounts_for_alias(alias).await?;
    if accounts.is_empty() {
        println!("No Account Name mapping found for Salesforce Account Name: '{}'.", alias);
    } else {
        println!("Mapped Account Name(s):");
        for name in accounts {
            println!("- {}", name);
        }
    }
    Ok(())
}

fn prompt(message: &str) -> io::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
