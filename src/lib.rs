//! hive-bootstrap: provisions keys, creates a hive-control project on Solana
//! and configures it in one pass.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod logger;
pub mod project;
pub mod services;
