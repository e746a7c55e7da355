use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::error::DomainError;

// ── ProviderType ──────────────────────────────────────────────────────────────

/// Cloud providers the engine knows how to provision against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    DigitalOcean,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::DigitalOcean => write!(f, "digitalocean"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "digitalocean" => Ok(ProviderType::DigitalOcean),
            other => Err(DomainError::UnknownProviderType(other.to_string())),
        }
    }
}

// ── ProviderSettingsId ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderSettingsId(pub String);

impl ProviderSettingsId {
    pub fn new(s: impl Into<String>) -> Self {
        ProviderSettingsId(s.into())
    }

    pub fn generate() -> Self {
        ProviderSettingsId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderSettingsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── ProviderSettings ──────────────────────────────────────────────────────────

/// Access credentials for a cloud provider, set up by a tenant.
///
/// Only usable by the owning account. The credentials string is held in
/// plaintext in memory and encrypted by the store at the persistence
/// boundary.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub id: ProviderSettingsId,
    pub account_id: AccountId,
    pub label: String,
    pub provider_type: ProviderType,
    pub credentials: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderSettings {
    pub fn new(
        account_id: AccountId,
        label: impl Into<String>,
        provider_type: ProviderType,
        credentials: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        ProviderSettings {
            id: ProviderSettingsId::generate(),
            account_id,
            label: label.into(),
            provider_type,
            credentials: credentials.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
