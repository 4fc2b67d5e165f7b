use async_trait::async_trait;
use thiserror::Error;

use benefitflow_core::domain::approval::Approver;
use benefitflow_core::domain::booking::PropertyCalendar;
use benefitflow_core::domain::employee::{EmployeeId, EmployeeProfile};
use benefitflow_core::domain::request::{PropertyId, Request, RequestId, RequestToken};
use benefitflow_core::errors::ApplicationError;

pub mod employee;
pub mod memory;
pub mod request;

pub use employee::SqlEmployeeDirectory;
pub use memory::{InMemoryEmployeeDirectory, InMemoryRequestStore};
pub use request::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` changed since version {expected} was read")]
    VersionConflict { entity: &'static str, id: String, expected: u64 },
    #[error("{entity} `{id}` does not exist")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} `{id}` already exists")]
    Duplicate { entity: &'static str, id: String },
}

impl RepositoryError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionConflict { .. } => Self::Conflict(value.to_string()),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Duplicate { .. } => Self::Conflict(value.to_string()),
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                Self::Persistence(value.to_string())
            }
        }
    }
}

/// Durable home of requests, their stages and booking rows.
///
/// Writes are conditional: `update` succeeds only while the stored version still
/// equals `expected_version`, and `insert_booking` only while the property's
/// calendar version equals `expected_calendar_version`. Losers get
/// [`RepositoryError::VersionConflict`] and must re-read before retrying.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    async fn find_by_token(&self, token: &RequestToken)
        -> Result<Option<Request>, RepositoryError>;

    async fn list_for_requester(
        &self,
        requester_id: &EmployeeId,
    ) -> Result<Vec<Request>, RepositoryError>;

    /// Every booking of the property with the calendar version to pass back on insert.
    async fn property_calendar(
        &self,
        property_id: &PropertyId,
    ) -> Result<PropertyCalendar, RepositoryError>;

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError>;

    async fn insert_booking(
        &self,
        request: &Request,
        expected_calendar_version: u64,
    ) -> Result<(), RepositoryError>;

    async fn update(&self, request: &Request, expected_version: u64)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_profile(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeProfile>, RepositoryError>;

    /// The approver identity for an employee who holds a chain role.
    async fn find_approver(&self, id: &EmployeeId) -> Result<Option<Approver>, RepositoryError>;
}
