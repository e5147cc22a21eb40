//! Configuration loading with env-var overrides.
//!
//! Compiled-in defaults, optionally overlaid by a TOML file
//! (`config/default.toml` or `-f <path>`), then by environment variables:
//! `TEST_NETWORK_SOL`, `SOLANA_WALLET`, `SOLANA_DRIVER_WALLET`,
//! `HIVE_MINTS_FILE`, `HIVE_RPC_URL`, `HIVE_LEDGER`, `HIVE_LOG_LEVEL`.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use solana_sdk::pubkey::Pubkey;

use crate::{error::AppError, logger, services::ALL_SERVICES};

pub const DEVNET_ENDPOINT: &str =
    "https://lingering-newest-sheet.solana-devnet.quiknode.pro/fb6e6465df3955a06fd5ddec2e5b003896f56adb/";
pub const MAINNET_ENDPOINT: &str = "https://api.metaplex.solana.com";

/// hive-control program on both clusters.
pub const HIVE_CONTROL_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("HivezrprVqHR6APKKQkkLHmUG8waZorXexEBRZWh5LRm");

pub const DEFAULT_PROJECT_NAME: &str = "SolPatrol";
pub const DEFAULT_CRITERIA_COLLECTION: &str = "7Zcfq1fdQYYjKreRoKSf6ungwrFGCgoPcapEeTkj1cQX";
pub const DEFAULT_SERVICE_COUNT: usize = 6;
/// 0.1 SOL.
pub const DEFAULT_MIN_BALANCE_LAMPORTS: u64 = 100_000_000;

// ── network ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Devnet,
    Mainnet,
}

impl Network {
    /// Map the operator's selector onto a cluster. Only the exact tokens
    /// `mainnet` and `devnet` are recognised; everything else is devnet.
    pub fn select(selector: Option<&str>) -> Self {
        match selector.map(str::trim) {
            Some("mainnet") => Network::Mainnet,
            _ => Network::Devnet,
        }
    }
}

/// Immutable cluster settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: Network,
    /// Cluster name as reported to the operator.
    pub name: String,
    pub endpoint: String,
}

impl NetworkConfig {
    pub fn preset(network: Network) -> Self {
        match network {
            Network::Devnet => Self {
                network,
                name: "devnet".to_string(),
                endpoint: DEVNET_ENDPOINT.to_string(),
            },
            Network::Mainnet => Self {
                network,
                name: "mainnet-beta".to_string(),
                endpoint: MAINNET_ENDPOINT.to_string(),
            },
        }
    }

    /// Preset for `selector`, with the RPC URL replaced when an override is set.
    pub fn select(selector: Option<&str>, endpoint_override: Option<&str>) -> Self {
        let mut config = Self::preset(Network::select(selector));
        if let Some(url) = endpoint_override.filter(|u| !u.trim().is_empty()) {
            config.endpoint = url.trim().to_string();
        }
        config
    }
}

// ── resolved config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Rpc,
    /// In-memory ledger; nothing leaves the process.
    Simulated,
}

impl LedgerBackend {
    fn parse(s: &str) -> Result<Self, AppError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(Self::Rpc),
            "simulated" | "dry-run" => Ok(Self::Simulated),
            other => Err(AppError::Config(format!("unknown ledger backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub program_id: Pubkey,
    /// Commitment level used for reads and confirmation.
    pub commitment: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// How long to poll for a submitted transaction before giving up.
    pub confirm_timeout_seconds: u64,
}

/// Fully-resolved bootstrap configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw network selector; mapped to a cluster by the orchestrator.
    pub network_selector: Option<String>,
    pub rpc_url_override: Option<String>,
    pub authority_key_path: PathBuf,
    pub driver_key_path: PathBuf,
    pub mints_path: PathBuf,
    pub log_level: String,
    pub project_name: String,
    pub criteria_collection: Pubkey,
    /// Ordered service names; the run resolves a prefix of them.
    pub services: Vec<String>,
    /// How many entries of `services` to resolve.
    pub service_count: usize,
    pub min_balance_lamports: u64,
    /// Fail instead of regenerating when a key slot holds garbage.
    pub refuse_corrupt_keys: bool,
    pub ledger: LedgerConfig,
}

/// Environment-sourced overrides. Tests build this directly instead of
/// mutating process env.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network: Option<String>,
    pub authority_wallet: Option<String>,
    pub driver_wallet: Option<String>,
    pub mints_file: Option<String>,
    pub rpc_url: Option<String>,
    pub ledger: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            network: env::var("TEST_NETWORK_SOL").ok(),
            authority_wallet: env::var("SOLANA_WALLET").ok(),
            driver_wallet: env::var("SOLANA_DRIVER_WALLET").ok(),
            mints_file: env::var("HIVE_MINTS_FILE").ok(),
            rpc_url: env::var("HIVE_RPC_URL").ok(),
            ledger: env::var("HIVE_LEDGER").ok(),
            log_level: env::var("HIVE_LOG_LEVEL").ok(),
        }
    }
}

// ── raw TOML shape ───────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    bootstrap: RawBootstrap,
    #[serde(default)]
    project: RawProject,
    #[serde(default)]
    ledger: RawLedger,
}

#[derive(Deserialize)]
struct RawBootstrap {
    #[serde(default)]
    network: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_authority_key")]
    authority_key: String,
    #[serde(default = "default_driver_key")]
    driver_key: String,
    #[serde(default = "default_mints_file")]
    mints_file: String,
    #[serde(default = "default_services")]
    services: Vec<String>,
    #[serde(default = "default_service_count")]
    service_count: usize,
    #[serde(default = "default_min_balance_lamports")]
    min_balance_lamports: u64,
    #[serde(default)]
    refuse_corrupt_keys: bool,
}

impl Default for RawBootstrap {
    fn default() -> Self {
        Self {
            network: None,
            log_level: default_log_level(),
            authority_key: default_authority_key(),
            driver_key: default_driver_key(),
            mints_file: default_mints_file(),
            services: default_services(),
            service_count: default_service_count(),
            min_balance_lamports: default_min_balance_lamports(),
            refuse_corrupt_keys: false,
        }
    }
}

#[derive(Deserialize)]
struct RawProject {
    #[serde(default = "default_project_name")]
    name: String,
    #[serde(default = "default_criteria_collection")]
    criteria_collection: String,
}

impl Default for RawProject {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            criteria_collection: default_criteria_collection(),
        }
    }
}

#[derive(Deserialize)]
struct RawLedger {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default)]
    rpc_url: Option<String>,
    #[serde(default = "default_program_id")]
    program_id: String,
    #[serde(default = "default_commitment")]
    commitment: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_confirm_timeout_seconds")]
    confirm_timeout_seconds: u64,
}

impl Default for RawLedger {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            rpc_url: None,
            program_id: default_program_id(),
            commitment: default_commitment(),
            timeout_seconds: default_timeout_seconds(),
            confirm_timeout_seconds: default_confirm_timeout_seconds(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_authority_key() -> String { "./keys/authority.json".to_string() }
fn default_driver_key() -> String { "./keys/driver.json".to_string() }
fn default_mints_file() -> String { "./mints.json".to_string() }
fn default_services() -> Vec<String> { ALL_SERVICES.iter().map(|s| s.to_string()).collect() }
fn default_service_count() -> usize { DEFAULT_SERVICE_COUNT }
fn default_min_balance_lamports() -> u64 { DEFAULT_MIN_BALANCE_LAMPORTS }
fn default_project_name() -> String { DEFAULT_PROJECT_NAME.to_string() }
fn default_criteria_collection() -> String { DEFAULT_CRITERIA_COLLECTION.to_string() }
fn default_backend() -> String { "rpc".to_string() }
fn default_program_id() -> String { HIVE_CONTROL_PROGRAM_ID.to_string() }
fn default_commitment() -> String { "processed".to_string() }
fn default_timeout_seconds() -> u64 { 30 }
fn default_confirm_timeout_seconds() -> u64 { 60 }

// ── loading ──────────────────────────────────────────────────────────────────

/// Load config from the given path, or `config/default.toml` when present,
/// then apply env-var overrides. Without any file the compiled-in defaults apply.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        defaults(&overrides)
    }
}

/// Load an explicit TOML file and apply `overrides`.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

/// Compiled-in defaults with `overrides` applied.
pub fn defaults(overrides: &Overrides) -> Result<Config, AppError> {
    resolve(RawConfig::default(), overrides)
}

fn resolve(raw: RawConfig, overrides: &Overrides) -> Result<Config, AppError> {
    let b = raw.bootstrap;

    if b.service_count > b.services.len() {
        return Err(AppError::Config(format!(
            "service_count {} exceeds the {} listed services",
            b.service_count,
            b.services.len()
        )));
    }

    let log_level = overrides.log_level.clone().unwrap_or(b.log_level);
    logger::parse_level(&log_level).map_err(|e| AppError::Config(e.to_string()))?;

    let criteria_collection = raw.project.criteria_collection.parse::<Pubkey>().map_err(|e| {
        AppError::Config(format!(
            "invalid criteria_collection '{}': {e}",
            raw.project.criteria_collection
        ))
    })?;
    let program_id = raw
        .ledger
        .program_id
        .parse::<Pubkey>()
        .map_err(|e| AppError::Config(format!("invalid program_id '{}': {e}", raw.ledger.program_id)))?;

    let backend_str = overrides.ledger.as_deref().unwrap_or(&raw.ledger.backend);
    let backend = LedgerBackend::parse(backend_str)?;

    let pick = |over: &Option<String>, base: &str| expand_home(over.as_deref().unwrap_or(base));
    let authority_key_path = pick(&overrides.authority_wallet, &b.authority_key);
    let driver_key_path = pick(&overrides.driver_wallet, &b.driver_key);
    if authority_key_path == driver_key_path {
        return Err(AppError::Config(format!(
            "authority and driver key slots must differ, both are {}",
            authority_key_path.display()
        )));
    }

    Ok(Config {
        network_selector: overrides.network.clone().or(b.network),
        rpc_url_override: overrides.rpc_url.clone().or(raw.ledger.rpc_url),
        authority_key_path,
        driver_key_path,
        mints_path: pick(&overrides.mints_file, &b.mints_file),
        log_level,
        project_name: raw.project.name,
        criteria_collection,
        services: b.services,
        service_count: b.service_count,
        min_balance_lamports: b.min_balance_lamports,
        refuse_corrupt_keys: b.refuse_corrupt_keys,
        ledger: LedgerConfig {
            backend,
            program_id,
            commitment: raw.ledger.commitment,
            timeout_seconds: raw.ledger.timeout_seconds,
            confirm_timeout_seconds: raw.ledger.confirm_timeout_seconds,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Compiled-in defaults with the simulated ledger and every file path
    /// under `dir`. Used for rehearsals in a scratch directory and in tests.
    pub fn rooted_at(dir: &Path) -> Result<Self, AppError> {
        let mut config = defaults(&Overrides {
            ledger: Some("simulated".into()),
            ..Overrides::default()
        })?;
        config.authority_key_path = dir.join("keys/authority.json");
        config.driver_key_path = dir.join("keys/driver.json");
        config.mints_path = dir.join("mints.json");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn mainnet_selector_picks_mainnet_pair() {
        let net = NetworkConfig::select(Some("mainnet"), None);
        assert_eq!(net.network, Network::Mainnet);
        assert_eq!(net.name, "mainnet-beta");
        assert_eq!(net.endpoint, MAINNET_ENDPOINT);
    }

    #[test]
    fn devnet_selector_picks_devnet_pair() {
        let net = NetworkConfig::select(Some("devnet"), None);
        assert_eq!(net.network, Network::Devnet);
        assert_eq!(net.name, "devnet");
        assert_eq!(net.endpoint, DEVNET_ENDPOINT);
    }

    #[test]
    fn unknown_or_missing_selector_defaults_to_devnet() {
        for selector in [None, Some(""), Some("testnet"), Some("MAINNET"), Some("mainnet-beta")] {
            let net = NetworkConfig::select(selector, None);
            assert_eq!(net, NetworkConfig::preset(Network::Devnet), "selector {selector:?}");
        }
    }

    #[test]
    fn endpoint_override_keeps_cluster_name() {
        let net = NetworkConfig::select(Some("mainnet"), Some("http://localhost:8899"));
        assert_eq!(net.name, "mainnet-beta");
        assert_eq!(net.endpoint, "http://localhost:8899");
    }

    #[test]
    fn compiled_in_defaults() {
        let cfg = defaults(&Overrides::default()).unwrap();
        assert_eq!(cfg.project_name, "SolPatrol");
        assert_eq!(cfg.service_count, 6);
        assert_eq!(cfg.services, ALL_SERVICES.map(String::from).to_vec());
        assert_eq!(cfg.min_balance_lamports, 100_000_000);
        assert_eq!(cfg.authority_key_path, PathBuf::from("./keys/authority.json"));
        assert_eq!(cfg.driver_key_path, PathBuf::from("./keys/driver.json"));
        assert_eq!(cfg.criteria_collection.to_string(), DEFAULT_CRITERIA_COLLECTION);
        assert_eq!(cfg.ledger.backend, LedgerBackend::Rpc);
        assert!(!cfg.refuse_corrupt_keys);
    }

    #[test]
    fn file_values_override_defaults() {
        let f = write_toml(
            r#"
[bootstrap]
network = "mainnet"
service_count = 3
refuse_corrupt_keys = true

[project]
name = "Other"

[ledger]
backend = "simulated"
"#,
        );
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.network_selector.as_deref(), Some("mainnet"));
        assert_eq!(cfg.service_count, 3);
        assert!(cfg.refuse_corrupt_keys);
        assert_eq!(cfg.project_name, "Other");
        assert_eq!(cfg.ledger.backend, LedgerBackend::Simulated);
    }

    #[test]
    fn env_overrides_beat_file() {
        let f = write_toml("[bootstrap]\nnetwork = \"mainnet\"\nlog_level = \"warn\"\n");
        let overrides = Overrides {
            network: Some("devnet".into()),
            authority_wallet: Some("/tmp/a.json".into()),
            driver_wallet: Some("/tmp/d.json".into()),
            log_level: Some("debug".into()),
            ..Overrides::default()
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.network_selector.as_deref(), Some("devnet"));
        assert_eq!(cfg.authority_key_path, PathBuf::from("/tmp/a.json"));
        assert_eq!(cfg.driver_key_path, PathBuf::from("/tmp/d.json"));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn oversized_service_count_rejected() {
        let f = write_toml("[bootstrap]\nservice_count = 11\n");
        let err = load_from(f.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("service_count"));
    }

    #[test]
    fn custom_service_list_bounds_the_count() {
        let f = write_toml("[bootstrap]\nservices = [\"staking\", \"missions\"]\nservice_count = 2\n");
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.services, vec!["staking", "missions"]);
        assert_eq!(cfg.service_count, 2);
    }

    #[test]
    fn shared_key_slot_rejected() {
        let overrides = Overrides {
            authority_wallet: Some("/tmp/same.json".into()),
            driver_wallet: Some("/tmp/same.json".into()),
            ..Overrides::default()
        };
        let err = defaults(&overrides).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("/tmp/same.json")));
    }

    #[test]
    fn default_program_id_is_hive_control() {
        let cfg = defaults(&Overrides::default()).unwrap();
        assert_eq!(cfg.ledger.program_id, HIVE_CONTROL_PROGRAM_ID);
    }

    #[test]
    fn invalid_log_level_rejected() {
        let overrides = Overrides { log_level: Some("loud".into()), ..Overrides::default() };
        assert!(matches!(defaults(&overrides), Err(AppError::Config(_))));
    }

    #[test]
    fn bad_collection_rejected() {
        let f = write_toml("[project]\ncriteria_collection = \"nope\"\n");
        assert!(matches!(
            load_from(f.path(), &Overrides::default()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn unknown_backend_rejected() {
        let overrides = Overrides { ledger: Some("carrier-pigeon".into()), ..Overrides::default() };
        assert!(defaults(&overrides).is_err());
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/keys/authority.json");
        assert!(expanded.starts_with(&home));
    }
}
