use std::sync::Arc;

use async_trait::async_trait;
use chainforge_domain::{Job, JOB_STATE_FAILED};
use chainforge_machine::{Middleware, SharedStep, StatefulResource, Step, StepError};
use chainforge_store::ProvisionStore;
use chrono::Utc;
use tracing::error;

use crate::context::StepContext;

// ── Transactional ─────────────────────────────────────────────────────────────

/// Runs every step inside a fresh transaction: the batch recorded during the
/// step is committed when the step succeeds and dropped (rolled back) when it
/// fails.
pub struct Transactional {
    store: Arc<dyn ProvisionStore>,
}

impl Transactional {
    pub fn new(store: Arc<dyn ProvisionStore>) -> Self {
        Transactional { store }
    }
}

impl Middleware<StepContext, Job> for Transactional {
    fn wrap(&self, step: SharedStep<StepContext, Job>) -> SharedStep<StepContext, Job> {
        Arc::new(TransactionalStep {
            store: self.store.clone(),
            inner: step,
        })
    }
}

struct TransactionalStep {
    store: Arc<dyn ProvisionStore>,
    inner: SharedStep<StepContext, Job>,
}

#[async_trait]
impl Step<StepContext, Job> for TransactionalStep {
    async fn run(&self, ctx: &mut StepContext, job: &mut Job) -> Result<(), StepError> {
        ctx.begin();
        let result = self.inner.run(ctx, job).await;
        let tx = ctx.take_tx().unwrap_or_default();

        match result {
            Ok(()) => {
                self.store.commit(tx).await?;
                Ok(())
            }
            // Dropping the batch rolls the step back.
            Err(err) => Err(err),
        }
    }
}

// ── FailureCapture ────────────────────────────────────────────────────────────

/// Converts a failed step into a persisted terminal job state.
///
/// The error is swallowed so the state-machine loop terminates normally at
/// the Failed state. Must be declared before (outside of) [`Transactional`]:
/// the failure record is written directly against the store, after the
/// step's own transaction has already been rolled back.
pub struct FailureCapture {
    store: Arc<dyn ProvisionStore>,
}

impl FailureCapture {
    pub fn new(store: Arc<dyn ProvisionStore>) -> Self {
        FailureCapture { store }
    }
}

impl Middleware<StepContext, Job> for FailureCapture {
    fn wrap(&self, step: SharedStep<StepContext, Job>) -> SharedStep<StepContext, Job> {
        Arc::new(FailureCaptureStep {
            store: self.store.clone(),
            inner: step,
        })
    }
}

struct FailureCaptureStep {
    store: Arc<dyn ProvisionStore>,
    inner: SharedStep<StepContext, Job>,
}

#[async_trait]
impl Step<StepContext, Job> for FailureCaptureStep {
    async fn run(&self, ctx: &mut StepContext, job: &mut Job) -> Result<(), StepError> {
        let err = match self.inner.run(ctx, job).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        error!(
            job_id = %job.id,
            last_state = %job.state(),
            error = %err,
            "provisioning step failed"
        );

        job.set_state(JOB_STATE_FAILED);
        job.finished_at = Some(Utc::now());

        self.store.update_job(job).await?;

        Ok(())
    }
}
