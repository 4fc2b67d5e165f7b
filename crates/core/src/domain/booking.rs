use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::request::{PropertyId, Request, RequestId, RequestStatus};

/// House-booking projection of a request, as the availability engine sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub request_id: RequestId,
    pub property_id: PropertyId,
    pub requester_id: EmployeeId,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    pub status: RequestStatus,
}

impl Booking {
    pub fn from_request(request: &Request) -> Option<Self> {
        let payload = request.payload.booking()?;
        Some(Self {
            request_id: request.id.clone(),
            property_id: payload.property_id.clone(),
            requester_id: request.requester_id.clone(),
            check_in: payload.check_in,
            check_out: payload.check_out,
            status: request.status,
        })
    }

    /// Pending and approved bookings hold the property.
    pub fn holds_property(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::Approved)
    }
}

/// Every booking of one property plus the version guarding concurrent inserts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCalendar {
    pub property_id: PropertyId,
    pub version: u64,
    pub bookings: Vec<Booking>,
}

impl PropertyCalendar {
    pub fn empty(property_id: PropertyId) -> Self {
        Self { property_id, version: 0, bookings: Vec::new() }
    }
}
