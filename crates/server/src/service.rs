use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use benefitflow_core::availability::{AvailabilityReport, StayQuery};
use benefitflow_core::clock::Clock;
use benefitflow_core::domain::employee::EmployeeId;
use benefitflow_core::domain::request::{PropertyId, Request, RequestId, RequestToken, RequestType};
use benefitflow_core::eligibility::{Eligibility, EligibilityPolicy, RequestSummary};
use benefitflow_core::errors::ApplicationError;
use benefitflow_core::events::EventPublisher;
use benefitflow_core::flows::{Decision, DecisionCommand, WorkflowEngine};
use benefitflow_core::intake::{NewRequest, RequestIntake};
use benefitflow_db::{EmployeeDirectory, RepositoryError, RequestStore};

pub type SharedClock = Arc<dyn Clock>;

/// Everything one approver submits for a stage.
#[derive(Clone, Debug)]
pub struct DecisionInput {
    pub actor_id: EmployeeId,
    pub decision: Decision,
    pub comment: Option<String>,
    /// Stage the approver was looking at; defaults to the active one.
    pub level: Option<u8>,
}

/// Orchestrates the inbound operations: reads state, runs the pure engines,
/// writes back conditionally and publishes events once a write has landed.
pub struct BenefitsService {
    store: Arc<dyn RequestStore>,
    directory: Arc<dyn EmployeeDirectory>,
    publisher: Arc<dyn EventPublisher>,
    intake: RequestIntake<SharedClock>,
    engine: WorkflowEngine<SharedClock>,
    max_conflict_retries: u32,
}

impl BenefitsService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        directory: Arc<dyn EmployeeDirectory>,
        publisher: Arc<dyn EventPublisher>,
        clock: SharedClock,
        policy: EligibilityPolicy,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            directory,
            publisher,
            intake: RequestIntake::with_policy(clock.clone(), policy),
            engine: WorkflowEngine::new(clock),
            max_conflict_retries,
        }
    }

    pub async fn submit(&self, new_request: NewRequest) -> Result<Request, ApplicationError> {
        let requester_id = new_request.requester_id.clone();
        let profile = self
            .directory
            .find_profile(&requester_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("employee", requester_id.0.clone()))?;

        let mut attempt = 0;
        loop {
            let history = self.history(&requester_id).await?;
            let calendar = match new_request.payload.booking() {
                Some(booking) => Some(self.store.property_calendar(&booking.property_id).await?),
                None => None,
            };

            let request =
                self.intake.submit(new_request.clone(), &profile, &history, calendar.as_ref())?;
            let written = match &calendar {
                Some(calendar) => self.store.insert_booking(&request, calendar.version).await,
                None => self.store.insert(&request).await,
            };

            match written {
                Ok(()) => return Ok(request),
                Err(error) => self.absorb_conflict(error, &mut attempt, "submit")?,
            }
        }
    }

    pub async fn decide(
        &self,
        request_id: &RequestId,
        input: DecisionInput,
    ) -> Result<Request, ApplicationError> {
        let approver = self
            .directory
            .find_approver(&input.actor_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("approver", input.actor_id.0.clone()))?;

        let mut request = self.load(request_id).await?;
        // Finalized requests are refused before the level is compared.
        let acting_level = input.level.or_else(|| request.active_level()).unwrap_or_default();
        let command = DecisionCommand {
            acting_level,
            actor: approver,
            decision: input.decision,
            comment: input.comment,
        };

        let mut attempt = 0;
        loop {
            let outcome = self.engine.submit_decision(&request, &command)?;
            match self.store.update(&outcome.request, request.version).await {
                Ok(()) => {
                    info!(
                        event_name = "service.decision_recorded",
                        request_id = %outcome.request.id.0,
                        level = acting_level,
                        status = outcome.request.status.as_str(),
                        version = outcome.request.version,
                        "approval decision recorded"
                    );
                    self.publisher.publish(outcome.event);
                    return Ok(outcome.request);
                }
                Err(error) => {
                    self.absorb_conflict(error, &mut attempt, "decide")?;
                    request = self.load(request_id).await?;
                }
            }
        }
    }

    pub async fn cancel(
        &self,
        request_id: &RequestId,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<Request, ApplicationError> {
        let mut attempt = 0;
        loop {
            let request = self.load(request_id).await?;
            let outcome = self.engine.cancel(&request, actor_id, reason.clone())?;
            match self.store.update(&outcome.request, request.version).await {
                Ok(()) => {
                    info!(
                        event_name = "service.booking_cancelled",
                        request_id = %outcome.request.id.0,
                        actor_id = %actor_id.0,
                        "booking cancelled"
                    );
                    self.publisher.publish(outcome.event);
                    return Ok(outcome.request);
                }
                Err(error) => self.absorb_conflict(error, &mut attempt, "cancel")?,
            }
        }
    }

    pub async fn availability(
        &self,
        property_id: &PropertyId,
        check_in: NaiveDateTime,
        check_out: NaiveDateTime,
    ) -> Result<AvailabilityReport, ApplicationError> {
        let calendar = self.store.property_calendar(property_id).await?;
        let query = StayQuery::new(property_id.clone(), check_in, check_out);
        Ok(self.intake.availability().explain_conflict(&query, &calendar.bookings)?)
    }

    pub async fn eligibility(
        &self,
        employee_id: &EmployeeId,
        request_type: RequestType,
    ) -> Result<Eligibility, ApplicationError> {
        let profile = self
            .directory
            .find_profile(employee_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("employee", employee_id.0.clone()))?;
        let history = self.history(employee_id).await?;
        Ok(self.intake.eligibility().evaluate(request_type, &profile, &history)?)
    }

    /// Looks a request up by id, then by its human-facing token.
    pub async fn find(&self, reference: &str) -> Result<Request, ApplicationError> {
        if let Some(request) = self.store.find_by_id(&RequestId(reference.to_string())).await? {
            return Ok(request);
        }
        self.store
            .find_by_token(&RequestToken(reference.to_string()))
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", reference))
    }

    pub async fn list_for_requester(
        &self,
        requester_id: &EmployeeId,
    ) -> Result<Vec<Request>, ApplicationError> {
        Ok(self.store.list_for_requester(requester_id).await?)
    }

    async fn load(&self, request_id: &RequestId) -> Result<Request, ApplicationError> {
        self.store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))
    }

    async fn history(
        &self,
        requester_id: &EmployeeId,
    ) -> Result<Vec<RequestSummary>, ApplicationError> {
        let requests = self.store.list_for_requester(requester_id).await?;
        Ok(requests.iter().map(RequestSummary::from).collect())
    }

    /// Swallows a version conflict while retries remain; everything else propagates.
    fn absorb_conflict(
        &self,
        error: RepositoryError,
        attempt: &mut u32,
        operation: &'static str,
    ) -> Result<(), ApplicationError> {
        if !error.is_version_conflict() {
            return Err(error.into());
        }
        if *attempt >= self.max_conflict_retries {
            warn!(
                event_name = "service.conflict_retries_exhausted",
                operation,
                attempts = *attempt + 1,
                error = %error,
                "giving up after repeated concurrent modifications"
            );
            return Err(error.into());
        }
        *attempt += 1;
        debug!(
            event_name = "service.conflict_retry",
            operation,
            attempt = *attempt,
            error = %error,
            "state changed underneath; re-reading and retrying"
        );
        Ok(())
    }
}
