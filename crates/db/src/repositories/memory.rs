use std::collections::HashMap;

use tokio::sync::RwLock;

use benefitflow_core::domain::approval::{Approver, ApproverRole};
use benefitflow_core::domain::booking::{Booking, PropertyCalendar};
use benefitflow_core::domain::employee::{EmployeeId, EmployeeProfile};
use benefitflow_core::domain::request::{PropertyId, Request, RequestId, RequestToken};

use super::{EmployeeDirectory, RepositoryError, RequestStore};

#[derive(Default)]
struct RequestState {
    requests: HashMap<String, Request>,
    calendar_versions: HashMap<String, u64>,
}

impl RequestState {
    fn store_new(&mut self, request: &Request) -> Result<(), RepositoryError> {
        let token_taken = self.requests.values().any(|stored| stored.token == request.token);
        if self.requests.contains_key(&request.id.0) || token_taken {
            return Err(RepositoryError::Duplicate { entity: "request", id: request.id.0.clone() });
        }
        self.requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    fn bump_calendar(&mut self, property_id: &PropertyId) {
        *self.calendar_versions.entry(property_id.0.clone()).or_insert(0) += 1;
    }
}

/// Same conditional-write semantics as the SQL store, held behind one lock.
#[derive(Default)]
pub struct InMemoryRequestStore {
    state: RwLock<RequestState>,
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn find_by_token(
        &self,
        token: &RequestToken,
    ) -> Result<Option<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.values().find(|request| &request.token == token).cloned())
    }

    async fn list_for_requester(
        &self,
        requester_id: &EmployeeId,
    ) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<Request> = state
            .requests
            .values()
            .filter(|request| &request.requester_id == requester_id)
            .cloned()
            .collect();
        requests.sort_by(|left, right| {
            right.submitted_at.cmp(&left.submitted_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(requests)
    }

    async fn property_calendar(
        &self,
        property_id: &PropertyId,
    ) -> Result<PropertyCalendar, RepositoryError> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .requests
            .values()
            .filter_map(Booking::from_request)
            .filter(|booking| &booking.property_id == property_id)
            .collect();
        bookings.sort_by(|left, right| left.check_in.cmp(&right.check_in));

        Ok(PropertyCalendar {
            property_id: property_id.clone(),
            version: state.calendar_versions.get(&property_id.0).copied().unwrap_or(0),
            bookings,
        })
    }

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.store_new(request)?;
        if let Some(booking) = request.payload.booking() {
            state.bump_calendar(&booking.property_id);
        }
        Ok(())
    }

    async fn insert_booking(
        &self,
        request: &Request,
        expected_calendar_version: u64,
    ) -> Result<(), RepositoryError> {
        let booking = request.payload.booking().ok_or_else(|| {
            RepositoryError::Decode(format!("request `{}` is not a house booking", request.id.0))
        })?;

        let mut state = self.state.write().await;
        let current = state.calendar_versions.get(&booking.property_id.0).copied().unwrap_or(0);
        if current != expected_calendar_version {
            return Err(RepositoryError::VersionConflict {
                entity: "property_calendar",
                id: booking.property_id.0.clone(),
                expected: expected_calendar_version,
            });
        }

        state.store_new(request)?;
        state.bump_calendar(&booking.property_id);
        Ok(())
    }

    async fn update(&self, request: &Request, expected_version: u64) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.requests.get_mut(&request.id.0) else {
            return Err(RepositoryError::NotFound { entity: "request", id: request.id.0.clone() });
        };
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                entity: "request",
                id: request.id.0.clone(),
                expected: expected_version,
            });
        }

        *stored = request.clone();
        if let Some(booking) = request.payload.booking() {
            state.bump_calendar(&booking.property_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    profiles: RwLock<HashMap<String, EmployeeProfile>>,
    roles: RwLock<HashMap<String, ApproverRole>>,
}

impl InMemoryEmployeeDirectory {
    pub async fn insert_profile(&self, profile: EmployeeProfile) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id.0.clone(), profile);
    }

    pub async fn assign_role(&self, id: &EmployeeId, role: ApproverRole) {
        let mut roles = self.roles.write().await;
        roles.insert(id.0.clone(), role);
    }
}

#[async_trait::async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_profile(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeProfile>, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&id.0).cloned())
    }

    async fn find_approver(&self, id: &EmployeeId) -> Result<Option<Approver>, RepositoryError> {
        let roles = self.roles.read().await;
        Ok(roles.get(&id.0).map(|role| Approver { id: id.clone(), role: *role }))
    }
}
