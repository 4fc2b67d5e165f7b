//! Staff-house availability.
//!
//! A booking blocks every calendar day from its check-in date to its check-out date,
//! inclusive. The only way to share a day with another booking is a turnover: the
//! incoming guest checks in no earlier than the outgoing guest's check-out plus the
//! cleaning buffer. Buffers that run past midnight carry into the next day.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::domain::booking::Booking;
use crate::domain::request::{PropertyId, RequestId};

pub const CLEANING_BUFFER_HOURS: i64 = 3;
pub const MAX_STAY_DAYS: i64 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayQuery {
    pub property_id: PropertyId,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    /// Booking being re-evaluated, ignored so it does not conflict with itself.
    pub exclude_request: Option<RequestId>,
}

impl StayQuery {
    pub fn new(property_id: PropertyId, check_in: NaiveDateTime, check_out: NaiveDateTime) -> Self {
        Self { property_id, check_in, check_out, exclude_request: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AvailabilityError {
    #[error("check-out {check_out} must be after check-in {check_in}")]
    InvalidRange { check_in: NaiveDateTime, check_out: NaiveDateTime },
    #[error("stays are limited to {max_days} days; {requested_days} were requested")]
    MaxStayExceeded { requested_days: i64, max_days: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    PastDate,
    CheckInTimeElapsed { now: NaiveDateTime },
    Booked { request_id: RequestId },
    CleaningBuffer { request_id: RequestId, ready_at: NaiveDateTime },
    NextArrival { request_id: RequestId, latest_check_out: NaiveDateTime },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDay {
    pub date: NaiveDate,
    pub reason: ConflictReason,
}

impl ConflictDay {
    pub fn message(&self) -> String {
        match &self.reason {
            ConflictReason::PastDate => format!("{} is in the past", self.date),
            ConflictReason::CheckInTimeElapsed { now } => {
                format!("check-in time has already passed (it is now {})", now.format("%H:%M"))
            }
            ConflictReason::Booked { .. } => format!("{} is already booked", self.date),
            ConflictReason::CleaningBuffer { ready_at, .. } => format!(
                "the house is being cleaned after the previous stay; check in at or after {}",
                ready_at.format("%Y-%m-%d %H:%M")
            ),
            ConflictReason::NextArrival { latest_check_out, .. } => format!(
                "another guest arrives on {}; check out by {}",
                self.date,
                latest_check_out.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub property_id: PropertyId,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    pub available: bool,
    pub conflicts: Vec<ConflictDay>,
}

pub struct AvailabilityEngine<C> {
    clock: C,
    cleaning_buffer: Duration,
    max_stay_days: i64,
}

impl<C> AvailabilityEngine<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            cleaning_buffer: Duration::hours(CLEANING_BUFFER_HOURS),
            max_stay_days: MAX_STAY_DAYS,
        }
    }

    pub fn is_range_available(
        &self,
        query: &StayQuery,
        bookings: &[Booking],
    ) -> Result<bool, AvailabilityError> {
        self.explain_conflict(query, bookings).map(|report| report.available)
    }

    pub fn explain_conflict(
        &self,
        query: &StayQuery,
        bookings: &[Booking],
    ) -> Result<AvailabilityReport, AvailabilityError> {
        if query.check_out <= query.check_in {
            return Err(AvailabilityError::InvalidRange {
                check_in: query.check_in,
                check_out: query.check_out,
            });
        }

        let requested_days = (query.check_out.date() - query.check_in.date()).num_days();
        if requested_days > self.max_stay_days {
            return Err(AvailabilityError::MaxStayExceeded {
                requested_days,
                max_days: self.max_stay_days,
            });
        }

        let mut conflicts = Vec::new();
        let now = self.clock.local_now();
        if query.check_in.date() < now.date() {
            conflicts.push(ConflictDay { date: query.check_in.date(), reason: ConflictReason::PastDate });
        } else if query.check_in <= now {
            conflicts.push(ConflictDay {
                date: query.check_in.date(),
                reason: ConflictReason::CheckInTimeElapsed { now },
            });
        }

        let competing = bookings.iter().filter(|booking| {
            booking.property_id == query.property_id
                && booking.holds_property()
                && query.exclude_request.as_ref() != Some(&booking.request_id)
        });
        for booking in competing {
            self.collect_conflicts(query, booking, &mut conflicts);
        }
        conflicts.sort_by_key(|conflict| conflict.date);

        Ok(AvailabilityReport {
            property_id: query.property_id.clone(),
            check_in: query.check_in,
            check_out: query.check_out,
            available: conflicts.is_empty(),
            conflicts,
        })
    }

    fn collect_conflicts(&self, query: &StayQuery, booking: &Booking, out: &mut Vec<ConflictDay>) {
        let buffer = self.cleaning_buffer;
        let ready_at = booking.check_out + buffer;
        let latest_check_out = booking.check_in - buffer;
        let (in_date, out_date) = (query.check_in.date(), query.check_out.date());
        let (blocked_from, blocked_to) = (booking.check_in.date(), booking.check_out.date());

        for date in in_date.iter_days().take_while(|date| *date <= out_date) {
            if date < blocked_from || date > blocked_to {
                continue;
            }

            let turnover_in = date == in_date && date == blocked_to;
            let turnover_out = date == out_date && date == blocked_from;
            let fits_after = turnover_in && query.check_in >= ready_at;
            let fits_before = turnover_out && query.check_out <= latest_check_out;
            if fits_after || fits_before {
                continue;
            }

            let reason = if turnover_in {
                ConflictReason::CleaningBuffer { request_id: booking.request_id.clone(), ready_at }
            } else if turnover_out {
                ConflictReason::NextArrival {
                    request_id: booking.request_id.clone(),
                    latest_check_out,
                }
            } else {
                ConflictReason::Booked { request_id: booking.request_id.clone() }
            };
            out.push(ConflictDay { date, reason });
        }

        if in_date > blocked_to && query.check_in < ready_at {
            out.push(ConflictDay {
                date: in_date,
                reason: ConflictReason::CleaningBuffer {
                    request_id: booking.request_id.clone(),
                    ready_at,
                },
            });
        }

        if out_date < blocked_from && query.check_out > latest_check_out {
            out.push(ConflictDay {
                date: out_date,
                reason: ConflictReason::NextArrival {
                    request_id: booking.request_id.clone(),
                    latest_check_out,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::{AvailabilityEngine, AvailabilityError, ConflictReason, StayQuery};
    use crate::clock::FixedClock;
    use crate::domain::booking::Booking;
    use crate::domain::employee::EmployeeId;
    use crate::domain::request::{PropertyId, RequestId, RequestStatus};

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid local time")
    }

    fn engine() -> AvailabilityEngine<FixedClock> {
        AvailabilityEngine::new(FixedClock::at_local(at(5, 1, 9, 0)))
    }

    fn booking(id: &str, check_in: NaiveDateTime, check_out: NaiveDateTime) -> Booking {
        Booking {
            request_id: RequestId(id.to_string()),
            property_id: PropertyId("P-1".to_string()),
            requester_id: EmployeeId("E-1".to_string()),
            check_in,
            check_out,
            status: RequestStatus::Approved,
        }
    }

    fn query(check_in: NaiveDateTime, check_out: NaiveDateTime) -> StayQuery {
        StayQuery::new(PropertyId("P-1".to_string()), check_in, check_out)
    }

    #[test]
    fn turnover_check_in_must_wait_for_cleaning_buffer() {
        let existing = [booking("B-1", at(6, 1, 14, 0), at(6, 3, 16, 0))];
        let engine = engine();

        assert_eq!(
            engine.is_range_available(&query(at(6, 3, 19, 0), at(6, 5, 11, 0)), &existing),
            Ok(true)
        );

        let report = engine
            .explain_conflict(&query(at(6, 3, 18, 0), at(6, 5, 11, 0)), &existing)
            .expect("valid query");
        assert!(!report.available);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(
            report.conflicts[0].reason,
            ConflictReason::CleaningBuffer {
                request_id: RequestId("B-1".to_string()),
                ready_at: at(6, 3, 19, 0)
            }
        );
    }

    #[test]
    fn nineteen_hundred_check_in_is_inside_the_buffer_after_seventeen_hundred_checkout() {
        // 17:00 + 3h puts the house back on the market at 20:00, so 19:00 is still being cleaned.
        let existing = [booking("B-1", at(6, 1, 14, 0), at(6, 3, 17, 0))];
        let engine = engine();

        for (hour, expected) in [(18, false), (19, false), (20, true), (21, true)] {
            let available = engine
                .is_range_available(&query(at(6, 3, hour, 0), at(6, 5, 11, 0)), &existing)
                .expect("valid query");
            assert_eq!(available, expected, "check-in at {hour}:00");
        }
    }

    #[test]
    fn buffer_running_past_midnight_blocks_early_next_day() {
        let existing = [booking("B-1", at(6, 1, 14, 0), at(6, 3, 22, 30))];
        let engine = engine();

        let report = engine
            .explain_conflict(&query(at(6, 4, 0, 30), at(6, 5, 11, 0)), &existing)
            .expect("valid query");
        assert!(!report.available);
        assert_eq!(report.conflicts[0].date, NaiveDate::from_ymd_opt(2025, 6, 4).expect("date"));

        assert_eq!(
            engine.is_range_available(&query(at(6, 4, 1, 30), at(6, 5, 11, 0)), &existing),
            Ok(true)
        );
    }

    #[test]
    fn overlapping_days_conflict_with_each_blocked_day_listed() {
        let existing = [booking("B-1", at(6, 2, 14, 0), at(6, 4, 11, 0))];

        let report = engine()
            .explain_conflict(&query(at(6, 1, 14, 0), at(6, 5, 11, 0)), &existing)
            .expect("valid query");

        let days: Vec<u32> = report.conflicts.iter().map(|conflict| chrono::Datelike::day(&conflict.date)).collect();
        assert_eq!(days, vec![2, 3, 4]);
        assert!(report
            .conflicts
            .iter()
            .all(|conflict| matches!(conflict.reason, ConflictReason::Booked { .. })));
    }

    #[test]
    fn departure_must_leave_room_for_next_arrival() {
        let existing = [booking("B-2", at(6, 5, 15, 0), at(6, 7, 11, 0))];
        let engine = engine();

        assert_eq!(
            engine.is_range_available(&query(at(6, 3, 14, 0), at(6, 5, 12, 0)), &existing),
            Ok(true)
        );

        let report = engine
            .explain_conflict(&query(at(6, 3, 14, 0), at(6, 5, 13, 0)), &existing)
            .expect("valid query");
        assert_eq!(
            report.conflicts[0].reason,
            ConflictReason::NextArrival {
                request_id: RequestId("B-2".to_string()),
                latest_check_out: at(6, 5, 12, 0)
            }
        );
    }

    #[test]
    fn max_stay_is_checked_before_conflicts() {
        let existing = [booking("B-1", at(6, 2, 14, 0), at(6, 4, 11, 0))];

        let error = engine()
            .explain_conflict(&query(at(6, 1, 14, 0), at(6, 7, 11, 0)), &existing)
            .expect_err("six nights exceeds the limit");
        assert_eq!(error, AvailabilityError::MaxStayExceeded { requested_days: 6, max_days: 5 });

        assert_eq!(
            engine().is_range_available(&query(at(6, 1, 14, 0), at(6, 6, 11, 0)), &[]),
            Ok(true)
        );
    }

    #[test]
    fn inverted_range_is_invalid() {
        let error = engine()
            .explain_conflict(&query(at(6, 3, 14, 0), at(6, 3, 11, 0)), &[])
            .expect_err("check-out before check-in");
        assert!(matches!(error, AvailabilityError::InvalidRange { .. }));
    }

    #[test]
    fn past_dates_and_elapsed_check_in_times_are_unavailable() {
        let engine = engine();

        let past = engine
            .explain_conflict(&query(at(4, 30, 14, 0), at(5, 2, 11, 0)), &[])
            .expect("valid query");
        assert_eq!(past.conflicts[0].reason, ConflictReason::PastDate);

        let elapsed = engine
            .explain_conflict(&query(at(5, 1, 8, 30), at(5, 2, 11, 0)), &[])
            .expect("valid query");
        assert!(matches!(
            elapsed.conflicts[0].reason,
            ConflictReason::CheckInTimeElapsed { .. }
        ));

        assert_eq!(engine.is_range_available(&query(at(5, 1, 9, 30), at(5, 2, 11, 0)), &[]), Ok(true));
    }

    #[test]
    fn cancelled_rejected_other_property_and_self_are_ignored() {
        let mut cancelled = booking("B-1", at(6, 2, 14, 0), at(6, 4, 11, 0));
        cancelled.status = RequestStatus::Cancelled;
        let mut rejected = booking("B-2", at(6, 2, 14, 0), at(6, 4, 11, 0));
        rejected.status = RequestStatus::Rejected;
        let mut elsewhere = booking("B-3", at(6, 2, 14, 0), at(6, 4, 11, 0));
        elsewhere.property_id = PropertyId("P-2".to_string());
        let itself = booking("B-4", at(6, 2, 14, 0), at(6, 4, 11, 0));

        let mut stay = query(at(6, 2, 14, 0), at(6, 4, 11, 0));
        stay.exclude_request = Some(RequestId("B-4".to_string()));

        assert_eq!(
            engine().is_range_available(&stay, &[cancelled, rejected, elsewhere, itself]),
            Ok(true)
        );
    }

    #[test]
    fn pending_bookings_hold_the_property() {
        let mut pending = booking("B-1", at(6, 2, 14, 0), at(6, 4, 11, 0));
        pending.status = RequestStatus::Pending;

        assert_eq!(
            engine().is_range_available(&query(at(6, 3, 14, 0), at(6, 5, 11, 0)), &[pending]),
            Ok(false)
        );
    }

    #[test]
    fn conflict_messages_are_human_readable() {
        let existing = [booking("B-1", at(6, 1, 14, 0), at(6, 3, 17, 0))];
        let report = engine()
            .explain_conflict(&query(at(6, 3, 18, 0), at(6, 4, 11, 0)), &existing)
            .expect("valid query");

        assert_eq!(
            report.conflicts[0].message(),
            "the house is being cleaned after the previous stay; check in at or after 2025-06-03 20:00"
        );
    }
}
