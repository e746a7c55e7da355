pub mod context;
pub mod deployment_provisioner;
pub mod error;
pub mod job_machine;
pub mod middleware;
pub mod provisioner;
pub mod scheduler;
pub mod server_destroyer;
pub mod server_provisioner;
pub mod steps;
pub mod worker_pool;

pub use context::StepContext;
pub use deployment_provisioner::DeploymentProvisioner;
pub use error::EngineError;
pub use job_machine::{configure_job_state_machine, JobStateMachine};
pub use provisioner::Provisioner;
pub use scheduler::JobScheduler;
pub use server_destroyer::ServerDestroyer;
pub use server_provisioner::ServerProvisioner;
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
