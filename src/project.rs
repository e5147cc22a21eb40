//! Project record inputs: the creation parameters, criteria, the
//! returned handle, and the mint list the expected mint count comes from.

use std::{collections::HashSet, fs, path::Path};

use borsh::BorshSerialize;
use solana_sdk::pubkey::Pubkey;

use crate::error::AppError;

/// Shape of one per-profile attribute.
/// Borsh layout matches the on-chain enum: one tag byte, then the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub enum ProfileDataType {
    SingleValue,
    /// Content-addressed collection stored in a concurrent merkle tree.
    Entity {
        merkle_tree_max_depth: u8,
        merkle_tree_max_buffer_size: u16,
    },
}

impl ProfileDataType {
    /// Maximum number of stored entries, `2^depth`. `None` for scalars.
    pub fn capacity(&self) -> Option<u64> {
        match self {
            Self::SingleValue => None,
            Self::Entity { merkle_tree_max_depth, .. } => 1u64.checked_shl(u32::from(*merkle_tree_max_depth)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct ProfileDataConfig {
    pub label: String,
    pub data_type: ProfileDataType,
}

impl ProfileDataConfig {
    pub fn single(label: &str) -> Self {
        Self { label: label.to_string(), data_type: ProfileDataType::SingleValue }
    }

    pub fn entity(label: &str, depth: u8, buffer_size: u16) -> Self {
        Self {
            label: label.to_string(),
            data_type: ProfileDataType::Entity {
                merkle_tree_max_depth: depth,
                merkle_tree_max_buffer_size: buffer_size,
            },
        }
    }
}

/// The seven attributes every participant profile gets.
pub fn default_profile_data_configs() -> Vec<ProfileDataConfig> {
    vec![
        ProfileDataConfig::single("xp"),
        ProfileDataConfig::single("level"),
        ProfileDataConfig::single("bounty"),
        ProfileDataConfig::single("resource1"),
        ProfileDataConfig::single("resource2"),
        ProfileDataConfig::single("resource3"),
        ProfileDataConfig::entity("Participations", 14, 64),
    ]
}

/// What gets created on-chain. Validated at construction, immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    name: String,
    expected_mint_addresses: u64,
    profile_data_configs: Vec<ProfileDataConfig>,
}

impl ProjectSpec {
    pub fn new(
        name: impl Into<String>,
        expected_mint_count: u64,
        profile_data_configs: Vec<ProfileDataConfig>,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::Config("project name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for field in &profile_data_configs {
            if field.label.is_empty() {
                return Err(AppError::Config("profile field label must not be empty".into()));
            }
            if !seen.insert(field.label.as_str()) {
                return Err(AppError::Config(format!("duplicate profile field '{}'", field.label)));
            }
            if let ProfileDataType::Entity { merkle_tree_max_depth, merkle_tree_max_buffer_size } =
                field.data_type
            {
                if merkle_tree_max_depth == 0
                    || merkle_tree_max_buffer_size == 0
                    || field.data_type.capacity().is_none()
                {
                    return Err(AppError::Config(format!(
                        "entity field '{}' needs a depth in 1..64 and a positive buffer size",
                        field.label
                    )));
                }
            }
        }

        Ok(Self { name, expected_mint_addresses: expected_mint_count, profile_data_configs })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected_mint_count(&self) -> u64 {
        self.expected_mint_addresses
    }

    pub fn profile_data_configs(&self) -> &[ProfileDataConfig] {
        &self.profile_data_configs
    }
}

/// Membership gate: holders of this collection qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criteria {
    pub collection: Pubkey,
}

/// Reference to a created project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectHandle {
    /// Project account address.
    pub address: Pubkey,
    /// Seed key the address is derived from.
    pub key: Pubkey,
}

// ── mint list ────────────────────────────────────────────────────────────────

/// Read a JSON array of base58 mint addresses and drop duplicates, keeping
/// first-occurrence order.
pub fn load_unique_mints(path: &Path) -> Result<Vec<Pubkey>, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read mint list {}: {e}", path.display())))?;
    let addresses: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
        AppError::Config(format!("mint list {} is not a JSON string array: {e}", path.display()))
    })?;

    let mints = addresses
        .iter()
        .map(|a| {
            a.parse::<Pubkey>()
                .map_err(|e| AppError::Config(format!("invalid mint address '{a}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(unique_mints(mints))
}

pub fn unique_mints(mints: Vec<Pubkey>) -> Vec<Pubkey> {
    let mut seen = HashSet::new();
    mints.into_iter().filter(|m| seen.insert(*m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINT_A: &str = "7Zcfq1fdQYYjKreRoKSf6ungwrFGCgoPcapEeTkj1cQX";
    const MINT_B: &str = "HivezrprVqHR6APKKQkkLHmUG8waZorXexEBRZWh5LRm";

    #[test]
    fn default_fields_match_profile_schema() {
        let fields = default_profile_data_configs();
        assert_eq!(fields.len(), 7);
        assert_eq!(
            fields.iter().filter(|f| f.data_type == ProfileDataType::SingleValue).count(),
            6
        );
        let participations = fields.last().unwrap();
        assert_eq!(participations.label, "Participations");
        assert_eq!(participations.data_type.capacity(), Some(16_384));
    }

    #[test]
    fn duplicate_labels_rejected() {
        let fields = vec![ProfileDataConfig::single("xp"), ProfileDataConfig::single("xp")];
        assert!(ProjectSpec::new("p", 0, fields).is_err());
    }

    #[test]
    fn degenerate_tree_parameters_rejected() {
        assert!(ProjectSpec::new("p", 0, vec![ProfileDataConfig::entity("e", 0, 64)]).is_err());
        assert!(ProjectSpec::new("p", 0, vec![ProfileDataConfig::entity("e", 14, 0)]).is_err());
        assert!(ProjectSpec::new("p", 0, vec![ProfileDataConfig::entity("e", 64, 64)]).is_err());
        assert!(ProjectSpec::new("p", 0, vec![ProfileDataConfig::entity("e", 63, 64)]).is_ok());
    }

    #[test]
    fn blank_name_rejected() {
        assert!(ProjectSpec::new("  ", 0, default_profile_data_configs()).is_err());
    }

    #[test]
    fn duplicate_mints_are_counted_once() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"["{MINT_A}", "{MINT_B}", "{MINT_A}"]"#).unwrap();
        let mints = load_unique_mints(f.path()).unwrap();
        assert_eq!(mints.len(), 2);
        assert_eq!(mints[0].to_string(), MINT_A);
        assert_eq!(mints[1].to_string(), MINT_B);
    }

    #[test]
    fn invalid_mint_is_a_config_error() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"["{MINT_A}", "not-a-mint"]"#).unwrap();
        let err = load_unique_mints(f.path()).unwrap_err();
        assert!(err.to_string().contains("not-a-mint"));
    }

    #[test]
    fn missing_mint_list_is_a_config_error() {
        let err = load_unique_mints(Path::new("/nonexistent/mints.json")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
