use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use benefitflow_core::domain::approval::{ApprovalChain, ApproverRole, Stage, StageStatus};
use benefitflow_core::domain::booking::{Booking, PropertyCalendar};
use benefitflow_core::domain::employee::EmployeeId;
use benefitflow_core::domain::request::{
    Cancellation, PropertyId, Request, RequestId, RequestPayload, RequestStatus, RequestToken,
};

use super::{RepositoryError, RequestStore};
use crate::DbPool;

pub(crate) const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const REQUEST_COLUMNS: &str = "id, token, requester_id, request_type, payload_json, status, version,
     submitted_at, updated_at, cancelled_by, cancel_reason, cancelled_at";

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: SqliteRow) -> Result<Request, RepositoryError> {
        let id: String = row.try_get("id")?;
        let stage_rows = sqlx::query(
            "SELECT level, role, status, actor_id, decided_at, comment
             FROM approval_stage WHERE request_id = ? ORDER BY level ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        request_from_row(&row, &stage_rows)
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Request>, RepositoryError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM benefit_request WHERE {column} = ?");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        self.find_one("id", &id.0).await
    }

    async fn find_by_token(
        &self,
        token: &RequestToken,
    ) -> Result<Option<Request>, RepositoryError> {
        self.find_one("token", &token.0).await
    }

    async fn list_for_requester(
        &self,
        requester_id: &EmployeeId,
    ) -> Result<Vec<Request>, RepositoryError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM benefit_request
             WHERE requester_id = ? ORDER BY submitted_at DESC, id ASC"
        );
        let rows = sqlx::query(&sql).bind(&requester_id.0).fetch_all(&self.pool).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(self.hydrate(row).await?);
        }
        Ok(requests)
    }

    async fn property_calendar(
        &self,
        property_id: &PropertyId,
    ) -> Result<PropertyCalendar, RepositoryError> {
        // Version first: a booking landing between the two reads then fails the insert CAS.
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM property_calendar WHERE property_id = ?")
                .bind(&property_id.0)
                .fetch_optional(&self.pool)
                .await?;

        let rows = sqlx::query(
            "SELECT request_id, property_id, requester_id, check_in, check_out, status
             FROM house_booking WHERE property_id = ? ORDER BY check_in ASC",
        )
        .bind(&property_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(PropertyCalendar {
            property_id: property_id.clone(),
            version: version.map(|value| parse_version("version", value)).transpose()?.unwrap_or(0),
            bookings: rows.iter().map(booking_from_row).collect::<Result<Vec<_>, _>>()?,
        })
    }

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_request_rows(&mut tx, request).await?;
        if let Some(booking) = request.payload.booking() {
            ensure_calendar(&mut tx, &booking.property_id).await?;
            bump_calendar(&mut tx, &booking.property_id).await?;
            upsert_booking_row(&mut tx, request).await?;
        }
        tx.commit().await?;
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

        let mut tx = self.pool.begin().await?;
        ensure_calendar(&mut tx, &booking.property_id).await?;
        let claimed = sqlx::query(
            "UPDATE property_calendar SET version = version + 1
             WHERE property_id = ? AND version = ?",
        )
        .bind(&booking.property_id.0)
        .bind(to_i64("version", expected_calendar_version)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            debug!(
                event_name = "db.calendar.version_conflict",
                property_id = %booking.property_id.0,
                expected_version = expected_calendar_version,
                "property calendar changed before booking insert"
            );
            return Err(RepositoryError::VersionConflict {
                entity: "property_calendar",
                id: booking.property_id.0.clone(),
                expected: expected_calendar_version,
            });
        }

        insert_request_rows(&mut tx, request).await?;
        upsert_booking_row(&mut tx, request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, request: &Request, expected_version: u64) -> Result<(), RepositoryError> {
        let cancellation = request.cancellation.as_ref();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE benefit_request
             SET status = ?, version = ?, updated_at = ?,
                 cancelled_by = ?, cancel_reason = ?, cancelled_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(to_i64("version", request.version)?)
        .bind(request.updated_at.to_rfc3339())
        .bind(cancellation.map(|value| value.cancelled_by.0.clone()))
        .bind(cancellation.and_then(|value| value.reason.clone()))
        .bind(cancellation.map(|value| value.cancelled_at.to_rfc3339()))
        .bind(&request.id.0)
        .bind(to_i64("version", expected_version)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM benefit_request WHERE id = ?)")
                    .bind(&request.id.0)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists == 1 {
                RepositoryError::VersionConflict {
                    entity: "request",
                    id: request.id.0.clone(),
                    expected: expected_version,
                }
            } else {
                RepositoryError::NotFound { entity: "request", id: request.id.0.clone() }
            });
        }

        upsert_stages(&mut tx, request).await?;
        if let Some(booking) = request.payload.booking() {
            upsert_booking_row(&mut tx, request).await?;
            bump_calendar(&mut tx, &booking.property_id).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_request_rows(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    let payload_json = serde_json::to_string(&request.payload)
        .map_err(|error| RepositoryError::Decode(format!("could not encode payload: {error}")))?;
    let cancellation = request.cancellation.as_ref();

    let inserted = sqlx::query(
        "INSERT INTO benefit_request (id, token, requester_id, request_type, payload_json, status,
                                      version, submitted_at, updated_at, cancelled_by,
                                      cancel_reason, cancelled_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.token.0)
    .bind(&request.requester_id.0)
    .bind(request.request_type().as_str())
    .bind(payload_json)
    .bind(request.status.as_str())
    .bind(to_i64("version", request.version)?)
    .bind(request.submitted_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .bind(cancellation.map(|value| value.cancelled_by.0.clone()))
    .bind(cancellation.and_then(|value| value.reason.clone()))
    .bind(cancellation.map(|value| value.cancelled_at.to_rfc3339()))
    .execute(&mut *conn)
    .await;

    match inserted {
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            return Err(RepositoryError::Duplicate { entity: "request", id: request.id.0.clone() });
        }
        other => {
            other?;
        }
    }

    upsert_stages(conn, request).await
}

async fn upsert_stages(conn: &mut SqliteConnection, request: &Request) -> Result<(), RepositoryError> {
    for stage in &request.chain.stages {
        sqlx::query(
            "INSERT INTO approval_stage (request_id, level, role, status, actor_id, decided_at, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id, level) DO UPDATE SET
                 role = excluded.role,
                 status = excluded.status,
                 actor_id = excluded.actor_id,
                 decided_at = excluded.decided_at,
                 comment = excluded.comment",
        )
        .bind(&request.id.0)
        .bind(i64::from(stage.level))
        .bind(stage.role.as_str())
        .bind(stage.status.as_str())
        .bind(stage.actor.as_ref().map(|actor| actor.0.clone()))
        .bind(stage.decided_at.map(|at| at.to_rfc3339()))
        .bind(stage.comment.clone())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn upsert_booking_row(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    let Some(booking) = request.payload.booking() else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO house_booking (request_id, property_id, requester_id, check_in, check_out, status)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(request_id) DO UPDATE SET status = excluded.status",
    )
    .bind(&request.id.0)
    .bind(&booking.property_id.0)
    .bind(&request.requester_id.0)
    .bind(booking.check_in.format(LOCAL_TIME_FORMAT).to_string())
    .bind(booking.check_out.format(LOCAL_TIME_FORMAT).to_string())
    .bind(request.status.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn ensure_calendar(
    conn: &mut SqliteConnection,
    property_id: &PropertyId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO property_calendar (property_id, version) VALUES (?, 0)
         ON CONFLICT(property_id) DO NOTHING",
    )
    .bind(&property_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn bump_calendar(
    conn: &mut SqliteConnection,
    property_id: &PropertyId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE property_calendar SET version = version + 1 WHERE property_id = ?")
        .bind(&property_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn request_from_row(row: &SqliteRow, stage_rows: &[SqliteRow]) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let payload_json = row.try_get::<String, _>("payload_json")?;
    let payload: RequestPayload = serde_json::from_str(&payload_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid payload for request `{id}`: {error}"))
    })?;
    let request_type = row.try_get::<String, _>("request_type")?;
    if payload.request_type().as_str() != request_type {
        return Err(RepositoryError::Decode(format!(
            "request `{id}` is stored as `{request_type}` but carries a `{}` payload",
            payload.request_type().as_str()
        )));
    }

    let cancelled_by = row.try_get::<Option<String>, _>("cancelled_by")?;
    let cancelled_at = parse_optional_timestamp("cancelled_at", row.try_get("cancelled_at")?)?;
    let cancellation = match (cancelled_by, cancelled_at) {
        (Some(cancelled_by), Some(cancelled_at)) => Some(Cancellation {
            cancelled_by: EmployeeId(cancelled_by),
            reason: row.try_get("cancel_reason")?,
            cancelled_at,
        }),
        _ => None,
    };

    let stages = stage_rows.iter().map(stage_from_row).collect::<Result<Vec<_>, _>>()?;

    Ok(Request {
        token: RequestToken(row.try_get("token")?),
        requester_id: EmployeeId(row.try_get("requester_id")?),
        payload,
        status,
        chain: ApprovalChain::new(stages),
        version: parse_version("version", row.try_get("version")?)?,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        cancellation,
        id: RequestId(id),
    })
}

fn stage_from_row(row: &SqliteRow) -> Result<Stage, RepositoryError> {
    let level_raw = row.try_get::<i64, _>("level")?;
    let level = u8::try_from(level_raw)
        .map_err(|_| RepositoryError::Decode(format!("invalid stage level {level_raw}")))?;
    let role_raw = row.try_get::<String, _>("role")?;
    let role = ApproverRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approver role `{role_raw}`")))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = StageStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown stage status `{status_raw}`")))?;

    Ok(Stage {
        level,
        role,
        status,
        actor: row.try_get::<Option<String>, _>("actor_id")?.map(EmployeeId),
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
        comment: row.try_get("comment")?,
    })
}

fn booking_from_row(row: &SqliteRow) -> Result<Booking, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown booking status `{status_raw}`")))?;

    Ok(Booking {
        request_id: RequestId(row.try_get("request_id")?),
        property_id: PropertyId(row.try_get("property_id")?),
        requester_id: EmployeeId(row.try_get("requester_id")?),
        check_in: parse_local_time("check_in", row.try_get("check_in")?)?,
        check_out: parse_local_time("check_out", row.try_get("check_out")?)?,
        status,
    })
}

fn parse_version(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected non-negative): {value}"))
    })
}

fn to_i64(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("`{column}` value {value} does not fit in i64")))
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn parse_local_time(column: &str, value: String) -> Result<NaiveDateTime, RepositoryError> {
    NaiveDateTime::parse_from_str(&value, LOCAL_TIME_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid local time in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use rust_decimal::Decimal;

    use benefitflow_core::approvals::build_chain;
    use benefitflow_core::domain::approval::StageStatus;
    use benefitflow_core::domain::employee::EmployeeId;
    use benefitflow_core::domain::request::{
        BookingPayload, Cancellation, LoanPayload, PropertyId, Request, RequestId, RequestPayload,
        RequestStatus, RequestToken,
    };

    use super::SqlRequestStore;
    use crate::repositories::{RepositoryError, RequestStore};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }

    fn local(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 6, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("local time")
    }

    fn sample_request(id: &str, payload: RequestPayload) -> Request {
        let submitted_at = ts("2030-05-10T01:00:00Z");
        Request {
            id: RequestId(id.to_string()),
            token: RequestToken(format!("TOKEN-{id}")),
            requester_id: EmployeeId("EMP-STAFF-001".to_string()),
            chain: build_chain(payload.request_type()),
            payload,
            status: RequestStatus::Pending,
            version: 1,
            submitted_at,
            updated_at: submitted_at,
            cancellation: None,
        }
    }

    fn loan(id: &str) -> Request {
        sample_request(
            id,
            RequestPayload::SalaryLoan(LoanPayload {
                amount: Decimal::new(2_500_000, 2),
                term_months: 12,
                purpose: "tuition".to_string(),
            }),
        )
    }

    fn booking(id: &str, check_in: NaiveDateTime, check_out: NaiveDateTime) -> Request {
        sample_request(
            id,
            RequestPayload::HouseBooking(BookingPayload {
                property_id: PropertyId("HOUSE-BAGUIO".to_string()),
                check_in,
                check_out,
                guests: 2,
            }),
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trip_with_stages() {
        let store = SqlRequestStore::new(setup_pool().await);
        let request = loan("req-1");

        store.insert(&request).await.expect("insert");

        let by_id = store.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(by_id, request);
        let by_token = store.find_by_token(&request.token).await.expect("find").expect("exists");
        assert_eq!(by_token.id, request.id);
        assert_eq!(by_token.chain.stages.len(), 4);
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported() {
        let store = SqlRequestStore::new(setup_pool().await);
        store.insert(&loan("req-1")).await.expect("insert");

        let error = store.insert(&loan("req-1")).await.expect_err("duplicate");
        assert!(matches!(error, RepositoryError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn update_persists_stage_decisions_and_rejects_stale_versions() {
        let store = SqlRequestStore::new(setup_pool().await);
        let original = loan("req-1");
        store.insert(&original).await.expect("insert");

        let mut decided = original.clone();
        decided.version = 2;
        decided.updated_at = ts("2030-05-11T02:00:00Z");
        if let Some(stage) = decided.chain.stage_mut(1) {
            stage.status = StageStatus::Approved;
            stage.actor = Some(EmployeeId("EMP-HR-001".to_string()));
            stage.decided_at = Some(ts("2030-05-11T02:00:00Z"));
            stage.comment = Some("documents complete".to_string());
        }
        store.update(&decided, 1).await.expect("first writer wins");

        let stored = store.find_by_id(&original.id).await.expect("find").expect("exists");
        assert_eq!(stored, decided);
        assert_eq!(stored.active_level(), Some(2));

        let error = store.update(&decided, 1).await.expect_err("stale writer loses");
        assert!(error.is_version_conflict());

        let missing = store.update(&loan("req-404"), 1).await.expect_err("missing row");
        assert!(matches!(missing, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn booking_insert_claims_calendar_version() {
        let store = SqlRequestStore::new(setup_pool().await);
        let property = PropertyId("HOUSE-BAGUIO".to_string());

        let empty = store.property_calendar(&property).await.expect("calendar");
        assert_eq!(empty.version, 0);
        assert!(empty.bookings.is_empty());

        store
            .insert_booking(&booking("req-a", local(1, 14), local(3, 17)), empty.version)
            .await
            .expect("first booking");

        let racing = store
            .insert_booking(&booking("req-b", local(2, 14), local(4, 11)), empty.version)
            .await
            .expect_err("calendar moved on");
        assert!(matches!(racing, RepositoryError::VersionConflict { entity: "property_calendar", .. }));
        assert!(store.find_by_id(&RequestId("req-b".to_string())).await.expect("find").is_none());

        let calendar = store.property_calendar(&property).await.expect("calendar");
        assert_eq!(calendar.version, 1);
        assert_eq!(calendar.bookings.len(), 1);
        assert_eq!(calendar.bookings[0].check_out, local(3, 17));
        assert_eq!(calendar.bookings[0].status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn cancelling_a_booking_updates_calendar_row() {
        let store = SqlRequestStore::new(setup_pool().await);
        let mut request = booking("req-a", local(1, 14), local(3, 17));
        store.insert_booking(&request, 0).await.expect("insert");

        request.status = RequestStatus::Cancelled;
        request.version = 2;
        request.cancellation = Some(Cancellation {
            cancelled_by: request.requester_id.clone(),
            reason: Some("plans changed".to_string()),
            cancelled_at: ts("2030-05-20T00:00:00Z"),
        });
        store.update(&request, 1).await.expect("cancel");

        let calendar =
            store.property_calendar(&PropertyId("HOUSE-BAGUIO".to_string())).await.expect("calendar");
        assert_eq!(calendar.version, 2);
        assert_eq!(calendar.bookings[0].status, RequestStatus::Cancelled);

        let stored = store.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(stored.cancellation, request.cancellation);
    }

    #[tokio::test]
    async fn list_for_requester_filters_by_employee() {
        let store = SqlRequestStore::new(setup_pool().await);
        store.insert(&loan("req-1")).await.expect("insert");
        let mut other = loan("req-2");
        other.requester_id = EmployeeId("EMP-STAFF-002".to_string());
        store.insert(&other).await.expect("insert");

        let mine = store
            .list_for_requester(&EmployeeId("EMP-STAFF-001".to_string()))
            .await
            .expect("list");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id.0, "req-1");
    }
}
