pub mod account;
pub mod binance;
pub mod deployment;
pub mod error;
pub mod job;
pub mod provider;
pub mod server;
pub mod ssh_key;

pub use account::{Account, AccountId};
pub use binance::{Network, NodeConfig, NodeType};
pub use deployment::{
    Deployment, DeploymentConfig, DeploymentId, DeploymentState, DeploymentType, HealthCheck,
};
pub use error::DomainError;
pub use job::{
    Job, JobBuilder, JobId, job_state_from_name, JOB_STATE_COMPLETED, JOB_STATE_CREATED,
    JOB_STATE_FAILED, JOB_STATE_SERVER_CREATED, VALID_JOB_STATES,
};
pub use provider::{ProviderSettings, ProviderSettingsId, ProviderType};
pub use server::{
    Server, ServerBuilder, ServerId, ServerSize, ServerState, WorkspaceSnapshot,
};
pub use ssh_key::SshKey;
