mod state;
mod types;

pub use state::{JobStatus, StateMachine, Transition};
pub use types::{ClassificationResult, Job, Label};
