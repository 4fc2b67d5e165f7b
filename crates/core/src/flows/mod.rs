pub mod engine;
pub mod states;

pub use engine::{WorkflowEngine, WorkflowError, MIN_REJECTION_COMMENT_CHARS};
pub use states::{CancelOutcome, Decision, DecisionCommand, DecisionOutcome};
