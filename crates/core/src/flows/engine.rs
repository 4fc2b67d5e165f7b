use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::domain::approval::{ApproverRole, ChainIntegrityError, StageStatus};
use crate::domain::employee::EmployeeId;
use crate::domain::request::{Cancellation, Request, RequestStatus};
use crate::events::WorkflowEvent;
use crate::flows::states::{CancelOutcome, Decision, DecisionCommand, DecisionOutcome};

pub const MIN_REJECTION_COMMENT_CHARS: usize = 5;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("this request is already {} and can no longer be decided", .status.as_str())]
    AlreadyFinalized { status: RequestStatus },
    #[error("stage {acting_level} is not awaiting a decision; stage {active_level} is")]
    NotYourStage { acting_level: u8, active_level: u8 },
    #[error(
        "stage requires the {} role but the approver acts as {}",
        .required.label(),
        .actual.label()
    )]
    RoleMismatch { required: ApproverRole, actual: ApproverRole },
    #[error("a rejection needs a reason of at least {} characters", MIN_REJECTION_COMMENT_CHARS)]
    MissingRejectionReason,
    #[error("booking cannot be cancelled: {reason}")]
    CancelNotAllowed { reason: String },
    #[error(transparent)]
    ChainIntegrity(#[from] ChainIntegrityError),
}

impl WorkflowError {
    /// Denials are expected outcomes; only integrity faults are fatal.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, Self::ChainIntegrity(_))
    }
}

/// Sole mutator of approval-chain state. Every call reads a snapshot and returns a new one.
pub struct WorkflowEngine<C> {
    clock: C,
}

impl<C> WorkflowEngine<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn submit_decision(
        &self,
        request: &Request,
        command: &DecisionCommand,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let result = self.decide(request, command);
        match &result {
            Ok(outcome) => debug!(
                event_name = "workflow.decision_applied",
                request_id = %request.id.0,
                level = command.acting_level,
                decision = ?command.decision,
                actor_id = %command.actor.id.0,
                outcome = outcome.event.event_name(),
                "approval decision applied"
            ),
            Err(error) if error.is_integrity_fault() => error!(
                event_name = "workflow.chain_integrity_fault",
                request_id = %request.id.0,
                version = request.version,
                error = %error,
                "approval chain failed integrity check; refusing to proceed"
            ),
            Err(error) => info!(
                event_name = "workflow.decision_denied",
                request_id = %request.id.0,
                level = command.acting_level,
                actor_id = %command.actor.id.0,
                error = %error,
                "approval decision denied"
            ),
        }
        result
    }

    pub fn cancel(
        &self,
        request: &Request,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<CancelOutcome, WorkflowError> {
        let result = self.cancel_booking(request, actor_id, reason);
        match &result {
            Ok(_) => debug!(
                event_name = "workflow.booking_cancelled",
                request_id = %request.id.0,
                actor_id = %actor_id.0,
                "booking cancelled"
            ),
            Err(error) => info!(
                event_name = "workflow.cancel_denied",
                request_id = %request.id.0,
                actor_id = %actor_id.0,
                error = %error,
                "booking cancellation denied"
            ),
        }
        result
    }

    fn decide(
        &self,
        request: &Request,
        command: &DecisionCommand,
    ) -> Result<DecisionOutcome, WorkflowError> {
        if request.status != RequestStatus::Pending {
            return Err(WorkflowError::AlreadyFinalized { status: request.status });
        }

        request.chain.verify()?;
        let active =
            request.chain.active_stage().ok_or(ChainIntegrityError::TerminalWhilePending)?;
        let active_level = active.level;
        let required_role = active.role;

        if command.acting_level != active_level {
            return Err(WorkflowError::NotYourStage {
                acting_level: command.acting_level,
                active_level,
            });
        }

        if command.actor.role != required_role {
            return Err(WorkflowError::RoleMismatch {
                required: required_role,
                actual: command.actor.role,
            });
        }

        let comment = normalize_comment(command.comment.as_deref());
        if command.decision == Decision::Reject {
            let justified = comment
                .as_deref()
                .map(|text| text.chars().count() >= MIN_REJECTION_COMMENT_CHARS)
                .unwrap_or(false);
            if !justified {
                return Err(WorkflowError::MissingRejectionReason);
            }
        }

        let now = self.clock.now();
        let final_level = request.chain.final_level().unwrap_or(active_level);
        let mut updated = request.clone();
        let stage = updated
            .chain
            .stage_mut(active_level)
            .ok_or(ChainIntegrityError::TerminalWhilePending)?;
        stage.status = match command.decision {
            Decision::Approve => StageStatus::Approved,
            Decision::Reject => StageStatus::Rejected,
        };
        stage.actor = Some(command.actor.id.clone());
        stage.decided_at = Some(now);
        stage.comment = comment.clone();

        updated.version += 1;
        updated.updated_at = now;

        let event = match command.decision {
            Decision::Reject => {
                updated.status = RequestStatus::Rejected;
                WorkflowEvent::RequestRejected {
                    request_id: updated.id.clone(),
                    requester_id: updated.requester_id.clone(),
                    reason: comment.unwrap_or_default(),
                }
            }
            Decision::Approve if active_level == final_level => {
                updated.status = RequestStatus::Approved;
                WorkflowEvent::RequestApproved {
                    request_id: updated.id.clone(),
                    requester_id: updated.requester_id.clone(),
                    request_type: updated.request_type(),
                }
            }
            Decision::Approve => {
                let new_active_level = updated
                    .chain
                    .active_level()
                    .ok_or(ChainIntegrityError::TerminalWhilePending)?;
                WorkflowEvent::StageAdvanced { request_id: updated.id.clone(), new_active_level }
            }
        };

        Ok(DecisionOutcome { request: updated, event })
    }

    fn cancel_booking(
        &self,
        request: &Request,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<CancelOutcome, WorkflowError> {
        let Some(booking) = request.payload.booking() else {
            return Err(cancel_denied("only staff house bookings can be cancelled"));
        };

        if request.status != RequestStatus::Approved {
            return Err(cancel_denied(format!(
                "only approved bookings can be cancelled (current status: {})",
                request.status.as_str()
            )));
        }

        if &request.requester_id != actor_id {
            return Err(cancel_denied("only the employee who made the booking can cancel it"));
        }

        if booking.check_in <= self.clock.local_now() {
            return Err(cancel_denied("check-in time has already passed"));
        }

        let now = self.clock.now();
        let reason = normalize_comment(reason.as_deref());
        let mut updated = request.clone();
        updated.status = RequestStatus::Cancelled;
        updated.cancellation = Some(Cancellation {
            cancelled_by: actor_id.clone(),
            reason: reason.clone(),
            cancelled_at: now,
        });
        updated.version += 1;
        updated.updated_at = now;

        let event = WorkflowEvent::BookingCancelled {
            request_id: updated.id.clone(),
            requester_id: updated.requester_id.clone(),
            reason,
        };
        Ok(CancelOutcome { request: updated, event })
    }
}

fn cancel_denied(reason: impl Into<String>) -> WorkflowError {
    WorkflowError::CancelNotAllowed { reason: reason.into() }
}

fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment.map(str::trim).filter(|text| !text.is_empty()).map(str::to_string)
}
