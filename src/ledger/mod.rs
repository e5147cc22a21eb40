//! Ledger client abstraction.
//!
//! `LedgerClient` is an enum over concrete backends: JSON-RPC against a live
//! cluster, or an in-memory simulation for rehearsals and tests. Enum
//! dispatch keeps the async methods plain `async fn`s with no trait-object
//! machinery.
//!
//! A [`Session`] binds a client to the identity that signs and pays for
//! every mutating call.

pub mod program;
pub mod rpc;
pub mod simulated;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::{
    config::{LedgerBackend, LedgerConfig, NetworkConfig},
    keys::Credential,
    project::{Criteria, ProjectHandle, ProjectSpec},
};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transaction {signature} rejected: {reason}")]
    Rejected { signature: String, reason: String },
    #[error("project {0} already exists")]
    AlreadyExists(Pubkey),
    #[error("unknown project {0}")]
    UnknownProject(Pubkey),
    #[error("not the project authority: {0}")]
    Unauthorized(Pubkey),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("transaction {0} not confirmed before timeout")]
    Unconfirmed(String),
}

// ── Client enum ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LedgerClient {
    Rpc(rpc::RpcLedger),
    Simulated(simulated::SimulatedLedger),
}

impl LedgerClient {
    /// Build the client `config` asks for. A `simulated` ledger passed in
    /// wins over the configured backend so callers can share one instance;
    /// either way it runs under the configured program id.
    pub fn connect(
        config: &LedgerConfig,
        network: &NetworkConfig,
        simulated: Option<simulated::SimulatedLedger>,
    ) -> Result<Self, LedgerError> {
        match (simulated, config.backend) {
            (Some(ledger), _) => Ok(Self::Simulated(ledger.with_program_id(config.program_id))),
            (None, LedgerBackend::Simulated) => Ok(Self::Simulated(
                simulated::SimulatedLedger::rehearsal().with_program_id(config.program_id),
            )),
            (None, LedgerBackend::Rpc) => Ok(Self::Rpc(rpc::RpcLedger::new(
                network.endpoint.clone(),
                config.program_id,
                config.commitment.clone(),
                config.timeout_seconds,
                config.confirm_timeout_seconds,
            )?)),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Rpc(c) => c.endpoint(),
            Self::Simulated(_) => simulated::ENDPOINT,
        }
    }

    /// Balance of `address` in lamports; zero for accounts that do not exist.
    pub async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        match self {
            Self::Rpc(c) => c.balance(address).await,
            Self::Simulated(c) => c.balance(address).await,
        }
    }

    pub async fn create_project(
        &self,
        authority: &Credential,
        spec: &ProjectSpec,
    ) -> Result<ProjectHandle, LedgerError> {
        match self {
            Self::Rpc(c) => c.create_project(authority, spec).await,
            Self::Simulated(c) => c.create_project(authority, spec).await,
        }
    }

    pub async fn change_driver(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        driver: &Pubkey,
    ) -> Result<(), LedgerError> {
        match self {
            Self::Rpc(c) => c.change_driver(authority, project, driver).await,
            Self::Simulated(c) => c.change_driver(authority, project, driver).await,
        }
    }

    pub async fn add_criteria(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        criteria: &Criteria,
    ) -> Result<(), LedgerError> {
        match self {
            Self::Rpc(c) => c.add_criteria(authority, project, criteria).await,
            Self::Simulated(c) => c.add_criteria(authority, project, criteria).await,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A client bound to the identity that signs every call.
#[derive(Debug, Clone)]
pub struct Session {
    client: LedgerClient,
    identity: Credential,
}

impl Session {
    pub fn new(client: LedgerClient, identity: Credential) -> Self {
        Self { client, identity }
    }

    pub fn identity(&self) -> Pubkey {
        self.identity.pubkey()
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub async fn balance(&self) -> Result<u64, LedgerError> {
        self.client.balance(&self.identity.pubkey()).await
    }

    pub async fn create_project(&self, spec: &ProjectSpec) -> Result<ProjectHandle, LedgerError> {
        self.client.create_project(&self.identity, spec).await
    }

    pub async fn change_driver(&self, project: &ProjectHandle, driver: &Pubkey) -> Result<(), LedgerError> {
        self.client.change_driver(&self.identity, project, driver).await
    }

    pub async fn add_criteria(&self, project: &ProjectHandle, criteria: &Criteria) -> Result<(), LedgerError> {
        self.client.add_criteria(&self.identity, project, criteria).await
    }
}
