use chainforge_domain::{
    AccountId, DeploymentId, DomainError, JobId, ProviderSettingsId, ServerId,
};
use chainforge_vault::VaultError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("provider settings not found: {0}")]
    ProviderSettingsNotFound(ProviderSettingsId),

    #[error("server not found: {0}")]
    ServerNotFound(ServerId),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("account already exists: {0}")]
    AccountAlreadyExists(AccountId),

    #[error("email already registered: {0}")]
    EmailAlreadyExists(String),

    #[error("provider settings already exist: {0}")]
    ProviderSettingsAlreadyExists(ProviderSettingsId),

    #[error("server already exists: {0}")]
    ServerAlreadyExists(ServerId),

    #[error("deployment already exists: {0}")]
    DeploymentAlreadyExists(DeploymentId),

    #[error("job already exists: {0}")]
    JobAlreadyExists(JobId),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
