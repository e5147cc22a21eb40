//! One-shot project bootstrap.
//!
//! A forward-only state machine:
//!
//! ```text
//! SelectNetwork → ProvisionAuthority → Connect → PreflightBalance
//!   → CreateProject → ProvisionDriver → RotateDriverAuthority
//!   → AttachCriteria → ResolveServices → Done
//! ```
//!
//! Each stage runs at most once and any error aborts the run. Nothing is
//! rolled back: a failure after `CreateProject` leaves the project on chain
//! with whatever configuration the earlier stages applied.

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, info, warn};

use crate::{
    config::{Config, NetworkConfig},
    error::{AppError, sol},
    keys::{self, CorruptSlotPolicy, Provisioned, SlotOrigin},
    ledger::{LedgerClient, LedgerError, Session, simulated::SimulatedLedger},
    project::{Criteria, ProjectHandle, ProjectSpec},
    services::{self, ServiceDescriptor},
};

/// One resolved service, as reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub name: String,
    pub descriptor: ServiceDescriptor,
}

/// Everything a successful run reported.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub network: NetworkConfig,
    pub endpoint: String,
    pub signer: Pubkey,
    pub signer_origin: SlotOrigin,
    pub balance_lamports: u64,
    pub project_name: String,
    pub project: ProjectHandle,
    pub driver: Pubkey,
    pub criteria: Criteria,
    pub services: Vec<ResolvedService>,
}

/// State carried once a ledger session exists.
#[derive(Debug)]
pub struct Connected {
    network: NetworkConfig,
    session: Session,
    signer_origin: SlotOrigin,
}

/// State carried once the balance check passed.
#[derive(Debug)]
pub struct Funded {
    connected: Connected,
    balance_lamports: u64,
}

#[derive(Debug)]
pub enum Stage {
    SelectNetwork,
    ProvisionAuthority { network: NetworkConfig },
    Connect { network: NetworkConfig, authority: Provisioned },
    PreflightBalance(Connected),
    CreateProject(Funded),
    ProvisionDriver { funded: Funded, project: ProjectHandle },
    RotateDriverAuthority { funded: Funded, project: ProjectHandle, driver: Pubkey },
    AttachCriteria { funded: Funded, project: ProjectHandle, driver: Pubkey },
    ResolveServices { funded: Funded, project: ProjectHandle, driver: Pubkey, criteria: Criteria },
    Done(Box<BootstrapReport>),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::SelectNetwork => "select_network",
            Stage::ProvisionAuthority { .. } => "provision_authority",
            Stage::Connect { .. } => "connect",
            Stage::PreflightBalance(_) => "preflight_balance",
            Stage::CreateProject(_) => "create_project",
            Stage::ProvisionDriver { .. } => "provision_driver",
            Stage::RotateDriverAuthority { .. } => "rotate_driver_authority",
            Stage::AttachCriteria { .. } => "attach_criteria",
            Stage::ResolveServices { .. } => "resolve_services",
            Stage::Done(_) => "done",
        }
    }

    /// Run this stage and return the next one.
    pub async fn advance(self, ctx: &Bootstrap) -> Result<Stage, AppError> {
        let config = &ctx.config;
        match self {
            Stage::SelectNetwork => {
                let network = NetworkConfig::select(
                    config.network_selector.as_deref(),
                    config.rpc_url_override.as_deref(),
                );
                info!(network = %network.name, endpoint = %network.endpoint, "network selected");
                Ok(Stage::ProvisionAuthority { network })
            }

            Stage::ProvisionAuthority { network } => {
                let authority = keys::provision(&config.authority_key_path, ctx.slot_policy())?;
                if !authority.existed() {
                    warn!(
                        address = %authority.credential.pubkey(),
                        slot = %config.authority_key_path.display(),
                        "new authority key; fund it with at least {} SOL before creating a project",
                        sol(config.min_balance_lamports)
                    );
                    ctx.say(format_args!(
                        "New authority {} written to {}; fund it with at least {} SOL",
                        authority.credential.pubkey(),
                        config.authority_key_path.display(),
                        sol(config.min_balance_lamports)
                    ));
                }
                Ok(Stage::Connect { network, authority })
            }

            Stage::Connect { network, authority } => {
                let client = LedgerClient::connect(&config.ledger, &network, ctx.simulated.clone())
                    .map_err(|e| AppError::Ledger(e.to_string()))?;
                let session = Session::new(client, authority.credential);
                debug!(endpoint = %session.endpoint(), signer = %session.identity(), "ledger session open");
                Ok(Stage::PreflightBalance(Connected {
                    network,
                    session,
                    signer_origin: authority.origin,
                }))
            }

            Stage::PreflightBalance(connected) => {
                let balance = connected
                    .session
                    .balance()
                    .await
                    .map_err(|e| AppError::Ledger(format!("balance query failed: {e}")))?;
                let signer = connected.session.identity();
                info!(
                    address = %signer,
                    balance_sol = sol(balance),
                    network = %connected.network.name,
                    endpoint = %connected.session.endpoint(),
                    "authority balance"
                );
                ctx.say(format_args!(
                    "Signer {signer}: {} SOL on {} ({})",
                    sol(balance),
                    connected.network.name,
                    connected.session.endpoint()
                ));

                if balance < config.min_balance_lamports {
                    return Err(AppError::InsufficientFunds {
                        address: signer,
                        balance,
                        required: config.min_balance_lamports,
                        slot: config.authority_key_path.clone(),
                    });
                }
                Ok(Stage::CreateProject(Funded { connected, balance_lamports: balance }))
            }

            Stage::CreateProject(funded) => {
                let project = funded
                    .connected
                    .session
                    .create_project(&ctx.spec)
                    .await
                    .map_err(|e| submission("create project", e))?;
                info!(project = %project.address, name = %ctx.spec.name(), "project created");
                ctx.say(format_args!("{} Project: {}", ctx.spec.name(), project.address));
                Ok(Stage::ProvisionDriver { funded, project })
            }

            Stage::ProvisionDriver { funded, project } => {
                let driver = keys::provision(&config.driver_key_path, ctx.slot_policy())?;
                let driver = driver.credential.pubkey();
                if driver == funded.connected.session.identity() {
                    return Err(AppError::Config(format!(
                        "driver key in {} is the authority key; the driver must be a separate identity",
                        config.driver_key_path.display()
                    )));
                }
                debug!(driver = %driver, slot = %config.driver_key_path.display(), "driver key ready");
                Ok(Stage::RotateDriverAuthority { funded, project, driver })
            }

            Stage::RotateDriverAuthority { funded, project, driver } => {
                funded
                    .connected
                    .session
                    .change_driver(&project, &driver)
                    .await
                    .map_err(|e| submission("change driver", e))?;
                info!(project = %project.address, driver = %driver, "driver authority rotated");
                ctx.say(format_args!("Driver: {driver}"));
                Ok(Stage::AttachCriteria { funded, project, driver })
            }

            Stage::AttachCriteria { funded, project, driver } => {
                let criteria = Criteria { collection: config.criteria_collection };
                funded
                    .connected
                    .session
                    .add_criteria(&project, &criteria)
                    .await
                    .map_err(|e| submission("add criteria", e))?;
                info!(project = %project.address, collection = %criteria.collection, "criteria attached");
                ctx.say(format_args!("Criteria: collection {}", criteria.collection));
                Ok(Stage::ResolveServices { funded, project, driver, criteria })
            }

            Stage::ResolveServices { funded, project, driver, criteria } => {
                let names = services::requested_services(&config.services, config.service_count);
                let mut resolved = Vec::with_capacity(names.len());
                for name in names {
                    let descriptor = services::resolve(name, Pubkey::new_unique())?;
                    info!(service = %name, descriptor = %descriptor, "service resolved");
                    ctx.say(format_args!("{descriptor} service: {name}"));
                    resolved.push(ResolvedService { name: name.clone(), descriptor });
                }

                let Funded { connected, balance_lamports } = funded;
                Ok(Stage::Done(Box::new(BootstrapReport {
                    endpoint: connected.session.endpoint().to_string(),
                    signer: connected.session.identity(),
                    network: connected.network,
                    signer_origin: connected.signer_origin,
                    balance_lamports,
                    project_name: ctx.spec.name().to_string(),
                    project,
                    driver,
                    criteria,
                    services: resolved,
                })))
            }

            Stage::Done(report) => Ok(Stage::Done(report)),
        }
    }
}

fn submission(what: &str, err: LedgerError) -> AppError {
    AppError::Submission(format!("{what}: {err}"))
}

/// Inputs for one run.
pub struct Bootstrap {
    config: Config,
    spec: ProjectSpec,
    simulated: Option<SimulatedLedger>,
    echo: bool,
}

impl Bootstrap {
    pub fn new(config: Config, spec: ProjectSpec) -> Self {
        Self { config, spec, simulated: None, echo: true }
    }

    /// Run against `ledger` regardless of the configured backend.
    pub fn with_ledger(mut self, ledger: SimulatedLedger) -> Self {
        self.simulated = Some(ledger);
        self
    }

    /// Suppress the stdout progress lines.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub async fn run(&self) -> Result<BootstrapReport, AppError> {
        let mut stage = Stage::SelectNetwork;
        loop {
            let name = stage.name();
            debug!(stage = name, "entering stage");
            stage = match stage.advance(self).await {
                Ok(Stage::Done(report)) => return Ok(*report),
                Ok(next) => next,
                Err(e) => {
                    error!(stage = name, error = %e, "bootstrap aborted");
                    return Err(e);
                }
            };
        }
    }

    fn slot_policy(&self) -> CorruptSlotPolicy {
        if self.config.refuse_corrupt_keys {
            CorruptSlotPolicy::Refuse
        } else {
            CorruptSlotPolicy::Regenerate
        }
    }

    fn say(&self, line: std::fmt::Arguments<'_>) {
        if self.echo {
            println!("{line}");
        }
    }
}
