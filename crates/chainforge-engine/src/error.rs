use chainforge_driver::DriverError;
use chainforge_machine::MachineError;
use chainforge_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The server is not in the Requested state.
    #[error("server not ready for provisioning")]
    ServerNotReadyForProvisioning,

    /// The server is not in the Ok state.
    #[error("server not ready for deployments")]
    ServerNotReadyForDeployments,

    #[error("deployment not in requested state")]
    DeploymentNotInRequestedState,

    /// The declared address output did not parse as an IP.
    #[error("invalid server IP: {0}")]
    InvalidServerIp(String),

    /// The server was never successfully provisioned, so there is nothing to
    /// re-execute a destroy against.
    #[error("missing workspace snapshot")]
    MissingWorkspaceSnapshot,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("internal engine error: {0}")]
    Internal(String),
}
