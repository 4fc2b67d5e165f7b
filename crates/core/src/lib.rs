pub mod approvals;
pub mod availability;
pub mod clock;
pub mod config;
pub mod domain;
pub mod eligibility;
pub mod errors;
pub mod events;
pub mod flows;
pub mod intake;

pub use approvals::{build_chain, build_chain_for_tag, ChainError};
pub use availability::{
    AvailabilityEngine, AvailabilityError, AvailabilityReport, ConflictDay, ConflictReason,
    StayQuery,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::approval::{ApprovalChain, Approver, ApproverRole, Stage, StageStatus};
pub use domain::booking::{Booking, PropertyCalendar};
pub use domain::employee::{BenefitsTier, EmployeeId, EmployeeProfile, Position};
pub use domain::request::{
    PropertyId, Request, RequestId, RequestPayload, RequestStatus, RequestToken, RequestType,
};
pub use eligibility::{Eligibility, EligibilityEvaluator, EligibilityPolicy, RequestSummary};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::{EventPublisher, WorkflowEvent};
pub use flows::{Decision, DecisionCommand, WorkflowEngine, WorkflowError};
pub use intake::{IntakeError, NewRequest, RequestIntake};
