//! Credential slots: ed25519 keypairs persisted as JSON files.
//!
//! A slot is a file holding the 64-byte secret key (32-byte seed followed by
//! the 32-byte public key) as a JSON array of numbers, the layout Solana
//! tooling reads and writes:
//! ```text
//! keys/
//! ├── authority.json   [12,201,...]  (mode 0600)
//! └── driver.json
//! ```
//!
//! Generated once, reused on every later run. A slot that exists but does
//! not parse is handled per [`CorruptSlotPolicy`].

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use ed25519_dalek::{KEYPAIR_LENGTH, Signer as _, SigningKey};
use rand_core::OsRng;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, SignerError},
};
use tracing::{info, warn};

use crate::error::AppError;

/// A signing keypair.
#[derive(Clone)]
pub struct Credential {
    signing_key: SigningKey,
}

impl Credential {
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    pub fn from_keypair_bytes(bytes: &[u8; KEYPAIR_LENGTH]) -> Result<Self, String> {
        SigningKey::from_keypair_bytes(bytes)
            .map(|signing_key| Self { signing_key })
            .map_err(|e| e.to_string())
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn to_keypair_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.signing_key.to_keypair_bytes()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.to_keypair_bytes() == other.to_keypair_bytes()
    }
}

impl Eq for Credential {}

impl Signer for Credential {
    fn try_pubkey(&self) -> Result<Pubkey, SignerError> {
        Ok(Credential::pubkey(self))
    }

    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        Ok(Signature::from(self.sign(message)))
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("pubkey", &self.pubkey()).finish_non_exhaustive()
    }
}

/// What to do with a slot that exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptSlotPolicy {
    /// Move the file aside and generate a fresh keypair.
    #[default]
    Regenerate,
    /// Fail with [`AppError::CorruptCredential`] and leave the file alone.
    Refuse,
}

/// How a provisioned credential came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOrigin {
    Loaded,
    Generated,
    /// The slot held garbage; it was moved to `backup` and replaced.
    Recovered { backup: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Provisioned {
    pub credential: Credential,
    pub origin: SlotOrigin,
}

impl Provisioned {
    /// `true` only when an existing valid key was loaded.
    pub fn existed(&self) -> bool {
        self.origin == SlotOrigin::Loaded
    }
}

enum SlotRead {
    Absent,
    Valid(Credential),
    Corrupt(String),
}

/// Load the credential at `slot`, generating and persisting one if absent.
pub fn provision(slot: &Path, policy: CorruptSlotPolicy) -> Result<Provisioned, AppError> {
    match read_slot(slot)? {
        SlotRead::Valid(credential) => Ok(Provisioned { credential, origin: SlotOrigin::Loaded }),
        SlotRead::Absent => {
            let credential = Credential::generate();
            write_slot(slot, &credential)?;
            info!(slot = %slot.display(), pubkey = %credential.pubkey(), "generated new keypair");
            Ok(Provisioned { credential, origin: SlotOrigin::Generated })
        }
        SlotRead::Corrupt(reason) => match policy {
            CorruptSlotPolicy::Refuse => {
                warn!(slot = %slot.display(), %reason, "refusing to replace corrupt key slot");
                Err(AppError::CorruptCredential { path: slot.to_path_buf() })
            }
            CorruptSlotPolicy::Regenerate => {
                let backup = backup_path(slot);
                fs::rename(slot, &backup).map_err(|e| {
                    AppError::CredentialIo(format!("cannot move corrupt {} aside: {e}", slot.display()))
                })?;
                let credential = Credential::generate();
                write_slot(slot, &credential)?;
                warn!(
                    slot = %slot.display(),
                    backup = %backup.display(),
                    %reason,
                    pubkey = %credential.pubkey(),
                    "key slot was corrupt; replaced with a new keypair"
                );
                Ok(Provisioned { credential, origin: SlotOrigin::Recovered { backup } })
            }
        },
    }
}

// ── internals ────────────────────────────────────────────────────────────────

fn read_slot(slot: &Path) -> Result<SlotRead, AppError> {
    let raw = match fs::read_to_string(slot) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SlotRead::Absent),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Ok(SlotRead::Corrupt(format!("not utf-8: {e}")));
        }
        Err(e) => {
            return Err(AppError::CredentialIo(format!("cannot read {}: {e}", slot.display())));
        }
    };
    Ok(match parse_slot(&raw) {
        Ok(credential) => SlotRead::Valid(credential),
        Err(reason) => SlotRead::Corrupt(reason),
    })
}

fn parse_slot(raw: &str) -> Result<Credential, String> {
    let bytes: Vec<u8> = serde_json::from_str(raw).map_err(|e| format!("not a JSON byte array: {e}"))?;
    let len = bytes.len();
    let bytes: [u8; KEYPAIR_LENGTH] = bytes
        .try_into()
        .map_err(|_| format!("expected {KEYPAIR_LENGTH} bytes, got {len}"))?;
    Credential::from_keypair_bytes(&bytes)
}

fn write_slot(slot: &Path, credential: &Credential) -> Result<(), AppError> {
    if let Some(parent) = slot.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::CredentialIo(format!("cannot create key dir {}: {e}", parent.display()))
        })?;
    }

    let json = serde_json::to_string(credential.to_keypair_bytes().as_slice())
        .map_err(|e| AppError::CredentialIo(format!("cannot encode keypair: {e}")))?;
    fs::write(slot, json)
        .map_err(|e| AppError::CredentialIo(format!("cannot write {}: {e}", slot.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(slot, fs::Permissions::from_mode(0o600)).map_err(|e| {
            AppError::CredentialIo(format!("cannot set permissions on {}: {e}", slot.display()))
        })?;
    }

    Ok(())
}

fn backup_path(slot: &Path) -> PathBuf {
    let mut name = slot.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
    PathBuf::from(name)
}

// ── tests ─────────────────────────────────────────────────────────────────────
