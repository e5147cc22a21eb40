//! hive-bootstrap entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (file, then env overrides)
//!   3. Resolve effective log level (CLI `-v` flags > RUST_LOG > config)
//!   4. Init logger once
//!   5. Read the mint list and build the project spec
//!   6. Run the bootstrap stages and print the summary

use hive_bootstrap::{
    bootstrap::Bootstrap,
    config::{self, LedgerBackend},
    error::{AppError, sol},
    logger,
    project::{self, ProjectSpec, default_profile_data_configs},
};
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;
    if args.dry_run {
        config.ledger.backend = LedgerBackend::Simulated;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        network = %config.network_selector.as_deref().unwrap_or("devnet"),
        authority_key = %config.authority_key_path.display(),
        mints_file = %config.mints_path.display(),
        ledger = ?config.ledger.backend,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let mints = project::load_unique_mints(&config.mints_path)?;
    info!(count = mints.len(), "unique mints loaded");

    let spec = ProjectSpec::new(
        config.project_name.clone(),
        mints.len() as u64,
        default_profile_data_configs(),
    )?;

    let report = Bootstrap::new(config, spec).run().await?;

    println!(
        "✓ {} bootstrapped on {}: project {}, driver {}, {} service(s), signer balance {} SOL",
        report.project_name,
        report.network.name,
        report.project.address,
        report.driver,
        report.services.len(),
        sol(report.balance_lamports)
    );
    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    dry_run: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0usize;
    let mut config_path = None;
    let mut dry_run = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: hive-bootstrap [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!("      --dry-run              Rehearse against an in-memory ledger");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--dry-run" => dry_run = true,
            "--verbose" => verbosity += 1,
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity += a.len() - 1;
            }
            _ => {}
        }
    }

    let log_level = (verbosity > 0).then(|| logger::verbosity_level(verbosity));
    CliArgs { log_level, config_path, dry_run }
}
