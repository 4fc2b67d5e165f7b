use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use benefitflow_core::events::{EventPublisher, WorkflowEvent};

/// Hands events to the dispatcher task without waiting on delivery.
#[derive(Clone)]
pub struct ChannelEventPublisher {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: WorkflowEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!(
                event_name = "notification.dropped",
                request_id = %error.0.request_id().0,
                notification = error.0.event_name(),
                "notification dispatcher is gone; event dropped"
            );
        }
    }
}

/// Drains the channel until every publisher is dropped. Returns how many events it handled.
pub fn spawn_dispatcher(mut receiver: mpsc::UnboundedReceiver<WorkflowEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut dispatched = 0;
        while let Some(event) = receiver.recv().await {
            dispatch(&event);
            dispatched += 1;
        }
        dispatched
    })
}

fn dispatch(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::RequestApproved { request_id, requester_id, request_type } => info!(
            event_name = event.event_name(),
            request_id = %request_id.0,
            recipient = %requester_id.0,
            request_type = request_type.as_str(),
            "notify requester: request approved"
        ),
        WorkflowEvent::RequestRejected { request_id, requester_id, reason } => info!(
            event_name = event.event_name(),
            request_id = %request_id.0,
            recipient = %requester_id.0,
            reason = %reason,
            "notify requester: request rejected"
        ),
        WorkflowEvent::StageAdvanced { request_id, new_active_level } => info!(
            event_name = event.event_name(),
            request_id = %request_id.0,
            level = new_active_level,
            "notify approvers: stage awaiting decision"
        ),
        WorkflowEvent::BookingCancelled { request_id, requester_id, reason } => info!(
            event_name = event.event_name(),
            request_id = %request_id.0,
            recipient = %requester_id.0,
            reason = reason.as_deref().unwrap_or_default(),
            "notify housekeeping: booking cancelled"
        ),
    }
}
