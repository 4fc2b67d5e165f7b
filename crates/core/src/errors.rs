use thiserror::Error;

use crate::approvals::ChainError;
use crate::availability::AvailabilityError;
use crate::eligibility::EligibilityError;
use crate::flows::WorkflowError;
use crate::intake::IntakeError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Availability(#[from] AvailabilityError),
    #[error(transparent)]
    Profile(#[from] EligibilityError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Per-day explanations when a booking was refused for its dates.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Domain(DomainError::Intake(IntakeError::Unavailable { conflicts })) => {
                conflicts.iter().map(|conflict| conflict.message()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(value))
    }
}

impl From<IntakeError> for ApplicationError {
    fn from(value: IntakeError) -> Self {
        Self::Domain(DomainError::Intake(value))
    }
}

impl From<AvailabilityError> for ApplicationError {
    fn from(value: AvailabilityError) -> Self {
        Self::Domain(DomainError::Availability(value))
    }
}

impl From<EligibilityError> for ApplicationError {
    fn from(value: EligibilityError) -> Self {
        Self::Domain(DomainError::Profile(value))
    }
}

impl From<ChainError> for ApplicationError {
    fn from(value: ChainError) -> Self {
        Self::Domain(DomainError::Chain(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Unprocessable { .. } => 422,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Text safe to show an end user. Denials carry their own reason.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Unprocessable { message, .. } => message,
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

enum Class {
    BadRequest,
    NotFound,
    Conflict,
    Unprocessable,
    Unavailable,
    Internal,
}

fn classify_domain(error: &DomainError) -> Class {
    match error {
        DomainError::Workflow(workflow) => match workflow {
            WorkflowError::AlreadyFinalized { .. }
            | WorkflowError::NotYourStage { .. }
            | WorkflowError::CancelNotAllowed { .. } => Class::Conflict,
            WorkflowError::RoleMismatch { .. } => Class::Unprocessable,
            WorkflowError::MissingRejectionReason => Class::BadRequest,
            WorkflowError::ChainIntegrity(_) => Class::Internal,
        },
        DomainError::Intake(intake) => match intake {
            IntakeError::Validation { .. } => Class::BadRequest,
            IntakeError::NotEligible { .. } | IntakeError::Amount(_) => Class::Unprocessable,
            IntakeError::Availability(availability) => classify_availability(availability),
            IntakeError::Unavailable { .. } => Class::Conflict,
            IntakeError::Profile(_) => Class::Internal,
        },
        DomainError::Availability(availability) => classify_availability(availability),
        DomainError::Profile(_) => Class::Internal,
        DomainError::Chain(_) => Class::BadRequest,
    }
}

fn classify_availability(error: &AvailabilityError) -> Class {
    match error {
        AvailabilityError::InvalidRange { .. } => Class::BadRequest,
        AvailabilityError::MaxStayExceeded { .. } => Class::Unprocessable,
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let class = match &value {
            ApplicationError::Domain(domain) => classify_domain(domain),
            ApplicationError::NotFound { .. } => Class::NotFound,
            ApplicationError::Conflict(_) => Class::Conflict,
            ApplicationError::Persistence(_) => Class::Unavailable,
            ApplicationError::Configuration(_) => Class::Internal,
        };
        let message = value.to_string();
        match class {
            Class::BadRequest => Self::BadRequest { message, correlation_id },
            Class::NotFound => Self::NotFound { message, correlation_id },
            Class::Conflict => Self::Conflict { message, correlation_id },
            Class::Unprocessable => Self::Unprocessable { message, correlation_id },
            Class::Unavailable => Self::ServiceUnavailable { message, correlation_id },
            Class::Internal => Self::Internal { message, correlation_id },
        }
    }
}
