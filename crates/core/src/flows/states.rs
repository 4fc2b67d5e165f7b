use serde::{Deserialize, Serialize};

use crate::domain::approval::Approver;
use crate::domain::request::Request;
use crate::events::WorkflowEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCommand {
    pub acting_level: u8,
    pub actor: Approver,
    pub decision: Decision,
    pub comment: Option<String>,
}

/// New snapshot to persist plus the event to publish once it is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub request: Request,
    pub event: WorkflowEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub request: Request,
    pub event: WorkflowEvent,
}
