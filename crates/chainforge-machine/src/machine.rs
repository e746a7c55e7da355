use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::state::{State, StatefulResource};
use crate::step::{Middleware, SharedStep, StepError};

#[derive(Debug, Error)]
pub enum MachineError {
    /// The resource sits in a state the machine has no step registered for.
    #[error("no step registered for state: {0}")]
    NoStepForState(&'static str),

    /// Cancellation was observed between steps.
    #[error("cancelled before reaching a terminal state")]
    Cancelled,

    #[error("{0}")]
    Step(StepError),
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles a [`StateMachine`] from (state, step) pairs and a middleware
/// stack.
///
/// Misconfiguration is a programming error and panics at build time:
/// registering a duplicate step, a step for a state outside the declared set,
/// or a step for a terminal state.
pub struct Builder<C, R> {
    valid_states: Vec<State>,
    middleware: Vec<Arc<dyn Middleware<C, R>>>,
    steps: HashMap<&'static str, SharedStep<C, R>>,
}

impl<C, R> Builder<C, R>
where
    C: Send + 'static,
    R: StatefulResource + Send + 'static,
{
    pub fn new(valid_states: &[State]) -> Self {
        Builder {
            valid_states: valid_states.to_vec(),
            middleware: Vec::new(),
            steps: HashMap::new(),
        }
    }

    /// Append middleware to the stack. The first declared middleware wraps
    /// outermost.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware<C, R>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn step(mut self, state: State, step: SharedStep<C, R>) -> Self {
        if self.steps.contains_key(state.name()) {
            panic!("duplicate step for state: {state}");
        }
        if !state.is_in(&self.valid_states) {
            panic!("unknown state: {state}");
        }
        if state.is_finished() {
            panic!("step registered for terminal state: {state}");
        }

        self.steps.insert(state.name(), step);
        self
    }

    pub fn build(self) -> StateMachine<C, R> {
        let Builder { middleware, steps, .. } = self;

        let steps = steps
            .into_iter()
            .map(|(name, mut step)| {
                for mw in middleware.iter().rev() {
                    step = mw.wrap(step);
                }
                (name, step)
            })
            .collect();

        StateMachine { steps }
    }
}

// ── StateMachine ──────────────────────────────────────────────────────────────

/// Drives any [`StatefulResource`] through its declared states by dispatching
/// on the current state.
pub struct StateMachine<C, R> {
    steps: HashMap<&'static str, SharedStep<C, R>>,
}

impl<C, R> StateMachine<C, R>
where
    C: Send + 'static,
    R: StatefulResource + Send + 'static,
{
    /// Advance the resource by a single step.
    ///
    /// Calling this on a resource in a terminal state is a programming error,
    /// as is a step returning success without changing a non-repeatable
    /// state; both panic.
    pub async fn step(&self, ctx: &mut C, res: &mut R) -> Result<(), MachineError> {
        let before = res.state();
        if before.is_finished() {
            panic!("step must not be called on a finished resource");
        }

        let step = self
            .steps
            .get(before.name())
            .ok_or(MachineError::NoStepForState(before.name()))?;

        step.run(ctx, res).await.map_err(MachineError::Step)?;

        if res.state() == before && !before.is_repeatable() {
            panic!("expected state change after state: {before}");
        }

        Ok(())
    }

    /// Step the resource until it reaches a terminal state, observing
    /// cancellation between steps. Running steps are never interrupted.
    pub async fn step_to_completion(
        &self,
        cancel: &CancellationToken,
        ctx: &mut C,
        res: &mut R,
    ) -> Result<(), MachineError> {
        while !res.state().is_finished() {
            if cancel.is_cancelled() {
                return Err(MachineError::Cancelled);
            }

            self.step(ctx, res).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Step;
    use async_trait::async_trait;

    const CREATED: State = State::new("created");
    const FIRST_PART: State = State::new("first_part");
    const SECOND_PART: State = State::new("second_part");
    const WAITING: State = State::new("waiting").repeatable();
    const SUCCESS: State = State::new("success").successful();
    const FAILURE: State = State::new("failure").failure();

    const VALID_STATES: [State; 6] =
        [CREATED, FIRST_PART, SECOND_PART, WAITING, SUCCESS, FAILURE];

    struct Job {
        state: State,
        acc: i64,
    }

    impl Job {
        fn new() -> Self {
            Job { state: CREATED, acc: 0 }
        }
    }

    impl StatefulResource for Job {
        fn state(&self) -> State {
            self.state
        }

        fn set_state(&mut self, state: State) {
            self.state = state;
        }
    }

    struct AddStep {
        amount: i64,
        next: State,
    }

    #[async_trait]
    impl Step<(), Job> for AddStep {
        async fn run(&self, _ctx: &mut (), job: &mut Job) -> Result<(), StepError> {
            job.acc += self.amount;
            job.set_state(self.next);
            Ok(())
        }
    }

    struct MultiplyStep {
        multiplier: i64,
        next: State,
    }

    #[async_trait]
    impl Step<(), Job> for MultiplyStep {
        async fn run(&self, _ctx: &mut (), job: &mut Job) -> Result<(), StepError> {
            job.acc *= self.multiplier;
            job.set_state(self.next);
            Ok(())
        }
    }

    /// Returns success without touching the job.
    struct NoopStep;

    #[async_trait]
    impl Step<(), Job> for NoopStep {
        async fn run(&self, _ctx: &mut (), _job: &mut Job) -> Result<(), StepError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_step_machine() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(AddStep { amount: 10, next: SUCCESS }))
            .build();

        let mut job = Job::new();
        sm.step_to_completion(&CancellationToken::new(), &mut (), &mut job)
            .await
            .unwrap();

        assert_eq!(job.acc, 10);
        assert_eq!(job.state(), SUCCESS);
    }

    #[tokio::test]
    async fn multiple_steps_run_in_state_order() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(AddStep { amount: 10, next: FIRST_PART }))
            .step(FIRST_PART, Arc::new(MultiplyStep { multiplier: 5, next: SECOND_PART }))
            .step(SECOND_PART, Arc::new(AddStep { amount: 5, next: SUCCESS }))
            .build();

        let mut job = Job::new();
        sm.step_to_completion(&CancellationToken::new(), &mut (), &mut job)
            .await
            .unwrap();

        assert_eq!(job.acc, 55);
    }

    #[tokio::test]
    async fn repeatable_state_may_stay_put() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(WAITING, Arc::new(NoopStep))
            .build();

        let mut job = Job::new();
        job.set_state(WAITING);

        sm.step(&mut (), &mut job).await.unwrap();
        assert_eq!(job.state(), WAITING);
    }

    #[tokio::test]
    async fn missing_step_is_an_error() {
        let sm: StateMachine<(), Job> = Builder::new(&VALID_STATES)
            .step(FIRST_PART, Arc::new(NoopStep))
            .build();

        let mut job = Job::new();
        let err = sm.step(&mut (), &mut job).await.unwrap_err();
        assert!(matches!(err, MachineError::NoStepForState("created")));
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_steps() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(AddStep { amount: 1, next: SUCCESS }))
            .build();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut job = Job::new();
        let err = sm
            .step_to_completion(&cancel, &mut (), &mut job)
            .await
            .unwrap_err();

        assert!(matches!(err, MachineError::Cancelled));
        assert_eq!(job.acc, 0, "no step should have run");
    }

    #[tokio::test]
    #[should_panic(expected = "expected state change")]
    async fn stale_state_after_step_panics() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(NoopStep))
            .build();

        let mut job = Job::new();
        let _ = sm.step(&mut (), &mut job).await;
    }

    #[tokio::test]
    #[should_panic(expected = "finished resource")]
    async fn step_on_terminal_resource_panics() {
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(NoopStep))
            .build();

        let mut job = Job::new();
        job.set_state(SUCCESS);
        let _ = sm.step(&mut (), &mut job).await;
    }

    #[test]
    #[should_panic(expected = "duplicate step")]
    fn duplicate_step_panics() {
        let _ = Builder::<(), Job>::new(&VALID_STATES)
            .step(CREATED, Arc::new(NoopStep))
            .step(CREATED, Arc::new(NoopStep));
    }

    #[test]
    #[should_panic(expected = "unknown state")]
    fn unknown_state_panics() {
        let _ = Builder::<(), Job>::new(&VALID_STATES).step(State::new("bogus"), Arc::new(NoopStep));
    }

    #[test]
    #[should_panic(expected = "terminal state")]
    fn step_for_terminal_state_panics() {
        let _ = Builder::<(), Job>::new(&VALID_STATES).step(SUCCESS, Arc::new(NoopStep));
    }

    #[tokio::test]
    async fn middleware_declared_first_wraps_outermost() {
        use std::sync::Mutex;

        struct Recorder {
            label: &'static str,
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        struct RecorderStep {
            label: &'static str,
            log: Arc<Mutex<Vec<&'static str>>>,
            inner: SharedStep<(), Job>,
        }

        #[async_trait]
        impl Step<(), Job> for RecorderStep {
            async fn run(&self, ctx: &mut (), job: &mut Job) -> Result<(), StepError> {
                self.log.lock().unwrap().push(self.label);
                self.inner.run(ctx, job).await
            }
        }

        impl Middleware<(), Job> for Recorder {
            fn wrap(&self, step: SharedStep<(), Job>) -> SharedStep<(), Job> {
                Arc::new(RecorderStep {
                    label: self.label,
                    log: self.log.clone(),
                    inner: step,
                })
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let sm = Builder::<(), Job>::new(&VALID_STATES)
            .middleware(Arc::new(Recorder { label: "outer", log: log.clone() }))
            .middleware(Arc::new(Recorder { label: "inner", log: log.clone() }))
            .step(CREATED, Arc::new(AddStep { amount: 1, next: SUCCESS }))
            .build();

        let mut job = Job::new();
        sm.step(&mut (), &mut job).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }
}
