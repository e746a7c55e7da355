use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

// ── AccountId ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        AccountId(s.into())
    }

    pub fn generate() -> Self {
        AccountId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Account ───────────────────────────────────────────────────────────────────

/// A tenant of the provisioning engine. Immutable except for the password.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Lower-cased, unique across all accounts.
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: &str, password: &str) -> Result<Self, DomainError> {
        let email = normalize_email(email)?;
        let password_hash = hash_password(password)?;
        let now = Utc::now();

        Ok(Account {
            id: AccountId::generate(),
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_password(&mut self, password: &str) -> Result<(), DomainError> {
        self.password_hash = hash_password(password)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

fn hash_password(password: &str) -> Result<String, DomainError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| DomainError::PasswordHash(e.to_string()))
}

/// Lower-case and sanity-check an email address.
fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();

    let invalid = || DomainError::InvalidEmail(raw.to_string());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    Ok(email)
}
