pub mod machine;
pub mod state;
pub mod step;

pub use machine::{Builder, MachineError, StateMachine};
pub use state::{State, StatefulResource};
pub use step::{Middleware, SharedStep, Step, StepError};
