use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("ssh key error: {0}")]
    SshKey(String),

    #[error("missing {0} configuration")]
    MissingField(&'static str),

    #[error("{0} is owned by a different account")]
    OwnershipMismatch(&'static str),

    #[error("invalid binance node network: {0}")]
    InvalidNetwork(String),

    #[error("invalid binance node type: {0}")]
    InvalidNodeType(String),

    #[error("invalid node version: {0}")]
    InvalidVersion(String),

    #[error("unknown provider type: {0}")]
    UnknownProviderType(String),

    #[error("unknown server state: {0}")]
    UnknownServerState(String),

    #[error("unknown server size: {0}")]
    UnknownServerSize(String),

    #[error("unknown deployment type: {0}")]
    UnknownDeploymentType(String),

    #[error("unknown deployment state: {0}")]
    UnknownDeploymentState(String),

    #[error("unknown job state: {0}")]
    UnknownJobState(String),
}
