use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::approvals::build_chain;
use crate::availability::{AvailabilityEngine, AvailabilityError, ConflictDay, StayQuery};
use crate::clock::Clock;
use crate::domain::booking::PropertyCalendar;
use crate::domain::employee::{EmployeeId, EmployeeProfile};
use crate::domain::request::{Request, RequestId, RequestPayload, RequestStatus, RequestToken};
use crate::eligibility::{
    AmountError, EligibilityError, EligibilityEvaluator, EligibilityPolicy, RequestSummary,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub requester_id: EmployeeId,
    pub payload: RequestPayload,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{reason}")]
    NotEligible { reason: String },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Availability(#[from] AvailabilityError),
    #[error("the house is not available for the selected dates")]
    Unavailable { conflicts: Vec<ConflictDay> },
    #[error(transparent)]
    Profile(#[from] EligibilityError),
}

impl IntakeError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }
}

/// Turns a submission into a Pending request with a fresh chain, or says why it cannot.
pub struct RequestIntake<C> {
    clock: C,
    eligibility: EligibilityEvaluator<C>,
    availability: AvailabilityEngine<C>,
}

impl<C> RequestIntake<C>
where
    C: Clock + Clone,
{
    pub fn new(clock: C) -> Self {
        Self::with_policy(clock, EligibilityPolicy::default())
    }

    pub fn with_policy(clock: C, policy: EligibilityPolicy) -> Self {
        Self {
            eligibility: EligibilityEvaluator::with_policy(clock.clone(), policy),
            availability: AvailabilityEngine::new(clock.clone()),
            clock,
        }
    }

    pub fn eligibility(&self) -> &EligibilityEvaluator<C> {
        &self.eligibility
    }

    pub fn availability(&self) -> &AvailabilityEngine<C> {
        &self.availability
    }

    /// `history` is the requester's existing requests; `calendar` is required for bookings.
    pub fn submit(
        &self,
        new_request: NewRequest,
        profile: &EmployeeProfile,
        history: &[RequestSummary],
        calendar: Option<&PropertyCalendar>,
    ) -> Result<Request, IntakeError> {
        if profile.id != new_request.requester_id {
            return Err(IntakeError::validation(
                "requester_id",
                "profile does not belong to the requester",
            ));
        }
        self.validate_payload(&new_request.payload)?;

        let request_type = new_request.payload.request_type();
        let eligibility = self.eligibility.evaluate(request_type, profile, history)?;
        if !eligibility.eligible {
            return Err(IntakeError::NotEligible {
                reason: eligibility.reason.unwrap_or_default(),
            });
        }
        if let Some(amount) = new_request.payload.amount() {
            self.eligibility.check_amount(amount, &eligibility, request_type)?;
        }

        if let Some(booking) = new_request.payload.booking() {
            let bookings = match calendar {
                Some(calendar) if calendar.property_id != booking.property_id => {
                    return Err(IntakeError::validation(
                        "property_id",
                        "calendar belongs to a different property",
                    ));
                }
                Some(calendar) => calendar.bookings.as_slice(),
                None => &[],
            };
            let query =
                StayQuery::new(booking.property_id.clone(), booking.check_in, booking.check_out);
            let report = self.availability.explain_conflict(&query, bookings)?;
            if !report.available {
                return Err(IntakeError::Unavailable { conflicts: report.conflicts });
            }
        }

        let now = self.clock.now();
        let request = Request {
            id: RequestId::generate(),
            token: RequestToken::generate(request_type, self.clock.today()),
            requester_id: new_request.requester_id,
            payload: new_request.payload,
            status: RequestStatus::Pending,
            chain: build_chain(request_type),
            version: 1,
            submitted_at: now,
            updated_at: now,
            cancellation: None,
        };

        info!(
            event_name = "request.submitted",
            request_id = %request.id.0,
            token = %request.token.0,
            request_type = request_type.as_str(),
            stages = request.chain.stages.len(),
            "request submitted"
        );
        Ok(request)
    }

    fn validate_payload(&self, payload: &RequestPayload) -> Result<(), IntakeError> {
        match payload {
            RequestPayload::SalaryLoan(loan)
            | RequestPayload::CarLoan(loan)
            | RequestPayload::HousingLoan(loan) => {
                require_positive("amount", loan.amount)?;
                if loan.term_months == 0 {
                    return Err(IntakeError::validation("term_months", "must be at least one month"));
                }
                require_text("purpose", &loan.purpose)
            }
            RequestPayload::MedicalReimbursement(reimbursement) => {
                require_positive("amount", reimbursement.amount)?;
                if reimbursement.incurred_on > self.clock.today() {
                    return Err(IntakeError::validation("incurred_on", "cannot be in the future"));
                }
                require_text("description", &reimbursement.description)
            }
            RequestPayload::MedicalLoa(leave) => {
                if leave.end_date < leave.start_date {
                    return Err(IntakeError::validation(
                        "end_date",
                        "must not be before the start date",
                    ));
                }
                require_text("reason", &leave.reason)
            }
            RequestPayload::HouseBooking(booking) => {
                if booking.guests == 0 {
                    return Err(IntakeError::validation("guests", "at least one guest is required"));
                }
                require_text("property_id", &booking.property_id.0)
            }
        }
    }
}

fn require_positive(field: &'static str, amount: Decimal) -> Result<(), IntakeError> {
    if amount <= Decimal::ZERO {
        return Err(IntakeError::validation(field, "must be greater than zero"));
    }
    Ok(())
}

fn require_text(field: &'static str, value: &str) -> Result<(), IntakeError> {
    if value.trim().is_empty() {
        return Err(IntakeError::validation(field, "must not be empty"));
    }
    Ok(())
}
