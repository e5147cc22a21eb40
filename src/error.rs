//! Application-wide error types.
//!
//! Every variant is fatal to a bootstrap run; `main` prints it and exits 1.

use std::path::PathBuf;

use thiserror::Error;

use solana_sdk::pubkey::Pubkey;

/// Lamports per SOL, for operator-facing amounts.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("credential io error: {0}")]
    CredentialIo(String),

    #[error(
        "credential slot {} exists but is corrupt; refusing to overwrite it (move it aside or set refuse_corrupt_keys = false)",
        .path.display()
    )]
    CorruptCredential { path: PathBuf },

    #[error(
        "insufficient SOL: {address} holds {} SOL, at least {} SOL is needed to create a project; fund the key in {}",
        sol_of(.balance),
        sol_of(.required),
        .slot.display()
    )]
    InsufficientFunds {
        address: Pubkey,
        balance: u64,
        required: u64,
        slot: PathBuf,
    },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("unknown service: '{0}'")]
    UnknownService(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render lamports as SOL for messages.
pub fn sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

fn sol_of(lamports: &u64) -> f64 {
    sol(*lamports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn insufficient_funds_carries_guidance() {
        let e = AppError::InsufficientFunds {
            address: Pubkey::default(),
            balance: 50_000_000,
            required: 100_000_000,
            slot: PathBuf::from("./keys/authority.json"),
        };
        let msg = e.to_string();
        assert!(msg.contains("0.05 SOL"));
        assert!(msg.contains("0.1 SOL"));
        assert!(msg.contains("./keys/authority.json"));
    }

    #[test]
    fn unknown_service_names_the_input() {
        let e = AppError::UnknownService("lottery".into());
        assert_eq!(e.to_string(), "unknown service: 'lottery'");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
