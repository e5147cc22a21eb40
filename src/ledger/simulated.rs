//! In-memory ledger. Used for `--dry-run` rehearsals and in tests.
//!
//! Clones share one state, so a test can hand a clone to the orchestrator
//! and inspect balances, projects and the call journal afterwards. Project
//! addresses are derived exactly as the RPC backend derives them, under
//! the program id set with [`SimulatedLedger::with_program_id`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::{
    config::HIVE_CONTROL_PROGRAM_ID,
    keys::Credential,
    project::{Criteria, ProjectHandle, ProjectSpec},
};

use super::{LedgerError, program};

pub const ENDPOINT: &str = "simulated://local";

/// Balance every account starts with in a rehearsal (1 SOL).
pub const REHEARSAL_BALANCE: u64 = crate::error::LAMPORTS_PER_SOL;

/// One call the ledger received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Balance(Pubkey),
    CreateProject { authority: Pubkey, name: String },
    ChangeDriver { project: Pubkey, driver: Pubkey },
    AddCriteria { project: Pubkey, collection: Pubkey },
}

impl LedgerCall {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Balance(_))
    }
}

/// Operations a test can make the ledger reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Balance,
    CreateProject,
    ChangeDriver,
    AddCriteria,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedProject {
    pub spec: ProjectSpec,
    pub authority: Pubkey,
    pub driver: Option<Pubkey>,
    pub criteria: Vec<Criteria>,
}

#[derive(Debug, Default)]
struct State {
    default_balance: u64,
    balances: HashMap<Pubkey, u64>,
    projects: HashMap<Pubkey, SimulatedProject>,
    journal: Vec<LedgerCall>,
    rejections: HashMap<Operation, String>,
}

#[derive(Debug, Clone)]
pub struct SimulatedLedger {
    program_id: Pubkey,
    state: Arc<Mutex<State>>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            program_id: HIVE_CONTROL_PROGRAM_ID,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Ledger where every account holds [`REHEARSAL_BALANCE`].
    pub fn rehearsal() -> Self {
        Self::new().with_default_balance(REHEARSAL_BALANCE)
    }

    pub fn with_program_id(mut self, program_id: Pubkey) -> Self {
        self.program_id = program_id;
        self
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Balance reported for accounts never funded explicitly.
    pub fn with_default_balance(self, lamports: u64) -> Self {
        self.lock().default_balance = lamports;
        self
    }

    pub fn fund(&self, address: Pubkey, lamports: u64) {
        self.lock().balances.insert(address, lamports);
    }

    /// Make every later `op` fail with `reason`.
    pub fn reject(&self, op: Operation, reason: &str) {
        self.lock().rejections.insert(op, reason.to_string());
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.lock().journal.clone()
    }

    pub fn mutating_calls(&self) -> usize {
        self.lock().journal.iter().filter(|c| c.is_mutating()).count()
    }

    pub fn project(&self, address: &Pubkey) -> Option<SimulatedProject> {
        self.lock().projects.get(address).cloned()
    }

    pub fn project_count(&self) -> usize {
        self.lock().projects.len()
    }

    pub async fn balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        state.journal.push(LedgerCall::Balance(*address));
        check_rejection(&state, Operation::Balance)?;
        Ok(state.balances.get(address).copied().unwrap_or(state.default_balance))
    }

    pub async fn create_project(
        &self,
        authority: &Credential,
        spec: &ProjectSpec,
    ) -> Result<ProjectHandle, LedgerError> {
        let signer = authority.pubkey();
        let mut state = self.lock();
        state.journal.push(LedgerCall::CreateProject { authority: signer, name: spec.name().to_string() });
        check_rejection(&state, Operation::CreateProject)?;

        let handle = program::project_handle(&self.program_id, &signer, spec.name())
            .ok_or_else(|| LedgerError::Encode("no off-curve project address".into()))?;
        if state.projects.contains_key(&handle.address) {
            return Err(LedgerError::AlreadyExists(handle.address));
        }

        state.projects.insert(
            handle.address,
            SimulatedProject { spec: spec.clone(), authority: signer, driver: None, criteria: Vec::new() },
        );
        debug!(project = %handle.address, name = %spec.name(), "simulated project created");
        Ok(handle)
    }

    pub async fn change_driver(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        driver: &Pubkey,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        state.journal.push(LedgerCall::ChangeDriver { project: project.address, driver: *driver });
        check_rejection(&state, Operation::ChangeDriver)?;

        let record = owned_project(&mut state, project, authority)?;
        record.driver = Some(*driver);
        Ok(())
    }

    pub async fn add_criteria(
        &self,
        authority: &Credential,
        project: &ProjectHandle,
        criteria: &Criteria,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        state.journal.push(LedgerCall::AddCriteria { project: project.address, collection: criteria.collection });
        check_rejection(&state, Operation::AddCriteria)?;

        let record = owned_project(&mut state, project, authority)?;
        record.criteria.push(*criteria);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_rejection(state: &State, op: Operation) -> Result<(), LedgerError> {
    match state.rejections.get(&op) {
        Some(reason) if op == Operation::Balance => Err(LedgerError::Transport(reason.clone())),
        Some(reason) => Err(LedgerError::Rejected { signature: format!("simulated-{op:?}"), reason: reason.clone() }),
        None => Ok(()),
    }
}

fn owned_project<'a>(
    state: &'a mut State,
    project: &ProjectHandle,
    authority: &Credential,
) -> Result<&'a mut SimulatedProject, LedgerError> {
    let record = state
        .projects
        .get_mut(&project.address)
        .ok_or(LedgerError::UnknownProject(project.address))?;
    if record.authority != authority.pubkey() {
        return Err(LedgerError::Unauthorized(authority.pubkey()));
    }
    Ok(record)
}
