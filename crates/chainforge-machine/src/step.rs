use std::sync::Arc;

use async_trait::async_trait;

use crate::state::StatefulResource;

/// Error type produced by steps.
///
/// Steps come from different crates with different error enums; the machine
/// only needs to carry them upward, so they are boxed at this seam.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single unit of execution inside a state machine.
///
/// Each step is associated with exactly one non-terminal state which triggers
/// it. `C` is the execution context threaded through every step (transaction
/// handles and such), `R` the resource being driven.
#[async_trait]
pub trait Step<C, R>: Send + Sync
where
    C: Send + 'static,
    R: StatefulResource + Send + 'static,
{
    async fn run(&self, ctx: &mut C, res: &mut R) -> Result<(), StepError>;
}

pub type SharedStep<C, R> = Arc<dyn Step<C, R>>;

/// Wraps a step to add cross-cutting behavior (transactions, failure capture).
///
/// Middleware declared first on the [`Builder`](crate::Builder) ends up
/// outermost around the step.
pub trait Middleware<C, R>: Send + Sync
where
    C: Send + 'static,
    R: StatefulResource + Send + 'static,
{
    fn wrap(&self, step: SharedStep<C, R>) -> SharedStep<C, R>;
}
