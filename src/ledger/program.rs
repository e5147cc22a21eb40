//! hive-control instruction builders.
//!
//! Anchor conventions: instruction data is the first 8 bytes of
//! `sha256("global:<ix_name>")` followed by the Borsh-encoded arguments.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::project::{Criteria, ProfileDataConfig, ProjectHandle, ProjectSpec};

use super::LedgerError;

const PROJECT_SEED: &[u8] = b"project";
const PROJECT_KEY_DOMAIN: &[u8] = b"hive-bootstrap/project-key";

pub fn discriminator(ix_name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{ix_name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Deterministic seed key for `(authority, name)`, so a second run for the
/// same project lands on the same address instead of minting a new project.
pub fn project_key(authority: &Pubkey, name: &str) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(PROJECT_KEY_DOMAIN);
    hasher.update(authority.as_ref());
    hasher.update(name.as_bytes());
    Pubkey::new_from_array(hasher.finalize().into())
}

/// Handle of the project `authority` owns under `name`.
pub fn project_handle(program_id: &Pubkey, authority: &Pubkey, name: &str) -> Option<ProjectHandle> {
    let key = project_key(authority, name);
    Pubkey::try_find_program_address(&[PROJECT_SEED, key.as_ref()], program_id)
        .map(|(address, _)| ProjectHandle { address, key })
}

#[derive(BorshSerialize)]
struct AnchorIx<A> {
    discriminator: [u8; 8],
    args: A,
}

#[derive(BorshSerialize)]
struct CreateProjectArgs {
    name: String,
    expected_mint_addresses: u64,
    profile_data_configs: Vec<ProfileDataConfig>,
}

#[derive(BorshSerialize)]
struct AddCriteriaArgs {
    collection: Option<Pubkey>,
}

fn encode<A: BorshSerialize>(ix_name: &str, args: A) -> Result<Vec<u8>, LedgerError> {
    borsh::to_vec(&AnchorIx { discriminator: discriminator(ix_name), args })
        .map_err(|e| LedgerError::Encode(format!("{ix_name}: {e}")))
}

pub fn create_project(
    program_id: &Pubkey,
    project: &ProjectHandle,
    authority: &Pubkey,
    payer: &Pubkey,
    spec: &ProjectSpec,
) -> Result<Instruction, LedgerError> {
    let args = CreateProjectArgs {
        name: spec.name().to_string(),
        expected_mint_addresses: spec.expected_mint_count(),
        profile_data_configs: spec.profile_data_configs().to_vec(),
    };

    Ok(Instruction::new_with_bytes(
        *program_id,
        &encode("create_project", args)?,
        vec![
            AccountMeta::new_readonly(project.key, false),
            AccountMeta::new(project.address, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
    ))
}

pub fn change_driver(
    program_id: &Pubkey,
    project: &ProjectHandle,
    driver: &Pubkey,
    authority: &Pubkey,
    payer: &Pubkey,
) -> Result<Instruction, LedgerError> {
    Ok(Instruction::new_with_bytes(
        *program_id,
        &encode("change_driver", ())?,
        vec![
            AccountMeta::new(project.address, false),
            AccountMeta::new_readonly(*driver, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
    ))
}

pub fn add_criteria(
    program_id: &Pubkey,
    project: &ProjectHandle,
    criteria: &Criteria,
    authority: &Pubkey,
    payer: &Pubkey,
) -> Result<Instruction, LedgerError> {
    let args = AddCriteriaArgs { collection: Some(criteria.collection) };

    Ok(Instruction::new_with_bytes(
        *program_id,
        &encode("add_criteria", args)?,
        vec![
            AccountMeta::new(project.address, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
    ))
}
