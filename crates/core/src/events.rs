use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::request::{RequestId, RequestType};

/// Outbound facts for the notification collaborator. The engine never delivers them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RequestApproved {
        request_id: RequestId,
        requester_id: EmployeeId,
        request_type: RequestType,
    },
    RequestRejected {
        request_id: RequestId,
        requester_id: EmployeeId,
        reason: String,
    },
    StageAdvanced {
        request_id: RequestId,
        new_active_level: u8,
    },
    BookingCancelled {
        request_id: RequestId,
        requester_id: EmployeeId,
        reason: Option<String>,
    },
}

impl WorkflowEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RequestApproved { .. } => "request.approved",
            Self::RequestRejected { .. } => "request.rejected",
            Self::StageAdvanced { .. } => "request.stage_advanced",
            Self::BookingCancelled { .. } => "booking.cancelled",
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestApproved { request_id, .. }
            | Self::RequestRejected { request_id, .. }
            | Self::StageAdvanced { request_id, .. }
            | Self::BookingCancelled { request_id, .. } => request_id,
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: WorkflowEvent);
}

impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    fn publish(&self, event: WorkflowEvent) {
        (**self).publish(event);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: WorkflowEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
