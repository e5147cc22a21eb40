//! Service descriptors: the optional hive-control subsystems a project opts into.
//!
//! Names are resolved case-insensitively against a closed set of ten; each
//! resolves to one tagged [`ServiceDescriptor`]. Id-bearing variants embed
//! the identifier supplied by the caller.

use std::{fmt, str::FromStr};

use solana_sdk::pubkey::Pubkey;

use crate::error::AppError;

/// Every recognised service, in the order the bootstrap consumes them.
pub const ALL_SERVICES: [&str; 10] = [
    "assembler",
    "assetmanager",
    "tokenmanager",
    "paywall",
    "staking",
    "missions",
    "raffles",
    "guildkit",
    "gamestate",
    "matchmaking",
];

/// The first `count` entries of `names`, clamped to its length.
pub fn requested_services<T>(names: &[T], count: usize) -> &[T] {
    &names[..count.min(names.len())]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Assembler,
    AssetManager,
    TokenManager,
    Paywall,
    Staking,
    Missions,
    Raffles,
    GuildKit,
    GameState,
    MatchMaking,
}

impl ServiceKind {
    /// Whether the descriptor for this kind embeds an identifier.
    pub const fn takes_id(self) -> bool {
        matches!(
            self,
            Self::Assembler | Self::AssetManager | Self::Staking | Self::Missions | Self::Raffles
        )
    }

    /// Build the descriptor, embedding `id` where the variant carries one.
    pub fn with_id(self, id: Pubkey) -> ServiceDescriptor {
        match self {
            Self::Assembler => ServiceDescriptor::Assembler { assembler_id: id },
            Self::AssetManager => ServiceDescriptor::AssetManager { asset_manager_id: id },
            Self::TokenManager => ServiceDescriptor::TokenManager,
            Self::Paywall => ServiceDescriptor::Paywall,
            Self::Staking => ServiceDescriptor::Staking { pool_id: id },
            Self::Missions => ServiceDescriptor::Missions { project_id: id },
            Self::Raffles => ServiceDescriptor::Raffles { project_id: id },
            Self::GuildKit => ServiceDescriptor::GuildKit,
            Self::GameState => ServiceDescriptor::GameState,
            Self::MatchMaking => ServiceDescriptor::MatchMaking,
        }
    }
}

impl FromStr for ServiceKind {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "assembler" => Ok(Self::Assembler),
            "assetmanager" => Ok(Self::AssetManager),
            "tokenmanager" => Ok(Self::TokenManager),
            "paywall" => Ok(Self::Paywall),
            "staking" => Ok(Self::Staking),
            "missions" => Ok(Self::Missions),
            "raffles" => Ok(Self::Raffles),
            "guildkit" => Ok(Self::GuildKit),
            "gamestate" => Ok(Self::GameState),
            "matchmaking" => Ok(Self::MatchMaking),
            _ => Err(AppError::UnknownService(name.to_string())),
        }
    }
}

/// Tagged service configuration; the tag is the variant name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceDescriptor {
    Assembler { assembler_id: Pubkey },
    AssetManager { asset_manager_id: Pubkey },
    TokenManager,
    Paywall,
    Staking { pool_id: Pubkey },
    Missions { project_id: Pubkey },
    Raffles { project_id: Pubkey },
    GuildKit,
    GameState,
    MatchMaking,
}

impl ServiceDescriptor {
    pub const fn kind(&self) -> ServiceKind {
        match self {
            Self::Assembler { .. } => ServiceKind::Assembler,
            Self::AssetManager { .. } => ServiceKind::AssetManager,
            Self::TokenManager => ServiceKind::TokenManager,
            Self::Paywall => ServiceKind::Paywall,
            Self::Staking { .. } => ServiceKind::Staking,
            Self::Missions { .. } => ServiceKind::Missions,
            Self::Raffles { .. } => ServiceKind::Raffles,
            Self::GuildKit => ServiceKind::GuildKit,
            Self::GameState => ServiceKind::GameState,
            Self::MatchMaking => ServiceKind::MatchMaking,
        }
    }

    /// The `__kind` tag.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Assembler { .. } => "Assembler",
            Self::AssetManager { .. } => "AssetManager",
            Self::TokenManager => "TokenManager",
            Self::Paywall => "Paywall",
            Self::Staking { .. } => "Staking",
            Self::Missions { .. } => "Missions",
            Self::Raffles { .. } => "Raffles",
            Self::GuildKit => "GuildKit",
            Self::GameState => "GameState",
            Self::MatchMaking => "MatchMaking",
        }
    }

    /// Embedded identifier, if the variant carries one.
    pub const fn id(&self) -> Option<Pubkey> {
        match self {
            Self::Assembler { assembler_id: id }
            | Self::AssetManager { asset_manager_id: id }
            | Self::Staking { pool_id: id }
            | Self::Missions { project_id: id }
            | Self::Raffles { project_id: id } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}({id})", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

/// Resolve a service name into its descriptor. Unknown names are an error,
/// never a default.
pub fn resolve(name: &str, id: Pubkey) -> Result<ServiceDescriptor, AppError> {
    Ok(name.parse::<ServiceKind>()?.with_id(id))
}
