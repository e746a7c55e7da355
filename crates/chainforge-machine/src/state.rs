use std::fmt;

use serde::{Serialize, Serializer};

// ── State ─────────────────────────────────────────────────────────────────────

/// A named position in a resource's lifecycle.
///
/// A state can be marked as a terminating state, either successful or failed,
/// and as repeatable, meaning the resource is allowed to stay in the same
/// state across one execution of its step.
#[derive(Debug, Clone, Copy)]
pub struct State {
    name: &'static str,
    repeatable: bool,
    finished: bool,
    successful: bool,
}

impl State {
    pub const fn new(name: &'static str) -> Self {
        State {
            name,
            repeatable: false,
            finished: false,
            successful: false,
        }
    }

    /// Allow the resource to remain in this state after its step returns.
    ///
    /// Useful for steps that wait for some external condition to be met
    /// before transitioning.
    pub const fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Mark this state as a successful terminating state.
    pub const fn successful(mut self) -> Self {
        self.finished = true;
        self.successful = true;
        self
    }

    /// Mark this state as a failed terminating state.
    pub const fn failure(mut self) -> Self {
        self.finished = true;
        self.successful = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// Whether this state is contained in `states`.
    pub fn is_in(&self, states: &[State]) -> bool {
        states.iter().any(|other| other == self)
    }
}

// Two states are the same state when they carry the same name; the flags are
// fixed per name at declaration time.
impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for State {}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// Only the state name goes over the wire; flags are re-attached by looking the
// name up against the resource's declared state set.
impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

// ── StatefulResource ──────────────────────────────────────────────────────────

/// Any resource that can be driven through a state machine.
///
/// The state lives on the resource so it can be persisted alongside it; all
/// transition logic stays in the [`StateMachine`](crate::StateMachine).
pub trait StatefulResource {
    fn state(&self) -> State;
    fn set_state(&mut self, state: State);
}
