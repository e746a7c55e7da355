use chainforge_machine::{State, StatefulResource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::deployment::{Deployment, DeploymentId};
use crate::error::DomainError;
use crate::provider::{ProviderSettings, ProviderSettingsId};
use crate::server::{Server, ServerId};

// ── Job states ────────────────────────────────────────────────────────────────

/// Starting point of every provisioning job.
pub const JOB_STATE_CREATED: State = State::new("job_created");

/// The infrastructure tool has created the requested server.
pub const JOB_STATE_SERVER_CREATED: State = State::new("server_created");

/// Terminal state of a successful provisioning job.
pub const JOB_STATE_COMPLETED: State = State::new("completed").successful();

/// Terminal state of a failed provisioning job.
pub const JOB_STATE_FAILED: State = State::new("failed").failure();

pub const VALID_JOB_STATES: [State; 4] = [
    JOB_STATE_CREATED,
    JOB_STATE_SERVER_CREATED,
    JOB_STATE_COMPLETED,
    JOB_STATE_FAILED,
];

/// Look a persisted state name back up in the declared job state set.
pub fn job_state_from_name(name: &str) -> Result<State, DomainError> {
    VALID_JOB_STATES
        .iter()
        .find(|state| state.name() == name)
        .copied()
        .ok_or_else(|| DomainError::UnknownJobState(name.to_string()))
}

// ── JobId ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        JobId(s.into())
    }

    pub fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Job ───────────────────────────────────────────────────────────────────────

/// A single provisioning request, threaded through the job state machine.
///
/// A job is created atomically with its server and deployment and references
/// exactly one of each, plus the provider settings used to create them. Once
/// terminal it serves only for record keeping.
///
/// The aggregate fields are hydrated on load; only the ids are persisted with
/// the job row.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub account_id: AccountId,
    state: State,

    pub provider_settings_id: ProviderSettingsId,
    pub server_id: ServerId,
    pub deployment_id: DeploymentId,

    pub provider_settings: Option<ProviderSettings>,
    pub server: Option<Server>,
    pub deployment: Option<Deployment>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly when the job reaches Completed or Failed.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        account_id: AccountId,
        provider_settings: ProviderSettings,
        server: Server,
        deployment: Deployment,
    ) -> Self {
        let now = Utc::now();

        Job {
            id: JobId::generate(),
            account_id,
            state: JOB_STATE_CREATED,

            provider_settings_id: provider_settings.id.clone(),
            server_id: server.id.clone(),
            deployment_id: deployment.id.clone(),

            provider_settings: Some(provider_settings),
            server: Some(server),
            deployment: Some(deployment),

            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Reconstruct a job from persisted fields. Aggregates stay unhydrated.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: JobId,
        account_id: AccountId,
        state: State,
        provider_settings_id: ProviderSettingsId,
        server_id: ServerId,
        deployment_id: DeploymentId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Job {
            id,
            account_id,
            state,
            provider_settings_id,
            server_id,
            deployment_id,
            provider_settings: None,
            server: None,
            deployment: None,
            created_at,
            updated_at,
            finished_at,
        }
    }
}

impl StatefulResource for Job {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

// ── JobBuilder ────────────────────────────────────────────────────────────────

/// Fluent construction of a provisioning job.
///
/// Attaches the deployment to the server and checks that the server and the
/// provider settings belong to the scheduling account before the job exists.
pub struct JobBuilder {
    account_id: AccountId,
    provider_settings: Option<ProviderSettings>,
    server: Option<Server>,
    deployment: Option<Deployment>,
}

impl JobBuilder {
    pub fn new(account_id: AccountId) -> Self {
        JobBuilder {
            account_id,
            provider_settings: None,
            server: None,
            deployment: None,
        }
    }

    pub fn provider(mut self, provider_settings: ProviderSettings) -> Self {
        self.provider_settings = Some(provider_settings);
        self
    }

    pub fn server(mut self, server: Server) -> Self {
        self.server = Some(server);
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    pub fn build(self) -> Result<Job, DomainError> {
        let provider_settings = self
            .provider_settings
            .ok_or(DomainError::MissingField("provider"))?;
        let mut server = self.server.ok_or(DomainError::MissingField("server"))?;
        let mut deployment = self.deployment.ok_or(DomainError::MissingField("deployment"))?;

        if provider_settings.account_id != self.account_id {
            return Err(DomainError::OwnershipMismatch("provider settings"));
        }
        if server.account_id != self.account_id {
            return Err(DomainError::OwnershipMismatch("server"));
        }

        deployment.server_id = Some(server.id.clone());
        server.deployments.push(deployment.clone());

        Ok(Job::new(self.account_id, provider_settings, server, deployment))
    }
}
