use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

#[derive(Debug, Clone, Copy)]
struct SeedEmployee {
    id: &'static str,
    approver_role: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct SeedRequest {
    id: &'static str,
    token: &'static str,
    request_type: &'static str,
    status: &'static str,
    stage_count: i64,
}

const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee { id: "EMP-HR-001", approver_role: Some("hr") },
    SeedEmployee { id: "EMP-SUP-001", approver_role: Some("supervisor_or_division_manager") },
    SeedEmployee { id: "EMP-VP-001", approver_role: Some("vice_president") },
    SeedEmployee { id: "EMP-PRES-001", approver_role: Some("president") },
    SeedEmployee { id: "EMP-STAFF-001", approver_role: None },
    SeedEmployee { id: "EMP-STAFF-002", approver_role: None },
];

const SEED_PROPERTIES: &[&str] = &["HOUSE-BAGUIO", "HOUSE-TAGAYTAY"];

const SEED_REQUESTS: &[SeedRequest] = &[SeedRequest {
    id: "req-demo-booking-001",
    token: "HB-20300510-DEMO0001",
    request_type: "house_booking",
    status: "approved",
    stage_count: 2,
}];

/// Deterministic demo data: one approver per chain role, two requesters,
/// two staff houses and an approved stay at the first one.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            employees_seeded: SEED_EMPLOYEES.iter().map(|employee| employee.id).collect(),
            properties_seeded: SEED_PROPERTIES.to_vec(),
            requests_seeded: SEED_REQUESTS.iter().map(|request| request.token).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for employee in SEED_EMPLOYEES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM employee WHERE id = ?1 AND approver_role IS ?2)",
            )
            .bind(employee.id)
            .bind(employee.approver_role)
            .fetch_one(pool)
            .await?;
            checks.push((employee.id, present == 1));
        }

        for property in SEED_PROPERTIES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM property_calendar WHERE property_id = ?1)",
            )
            .bind(*property)
            .fetch_one(pool)
            .await?;
            checks.push((*property, present == 1));
        }

        for request in SEED_REQUESTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM benefit_request
                               WHERE id = ?1 AND token = ?2 AND request_type = ?3 AND status = ?4)",
            )
            .bind(request.id)
            .bind(request.token)
            .bind(request.request_type)
            .bind(request.status)
            .fetch_one(pool)
            .await?;
            checks.push((request.token, present == 1));

            let stages: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM approval_stage WHERE request_id = ?1 AND status = ?2",
            )
            .bind(request.id)
            .bind(request.status)
            .fetch_one(pool)
            .await?;
            checks.push(("stage-count", stages == request.stage_count));

            if request.request_type == "house_booking" {
                let booked: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM house_booking WHERE request_id = ?1 AND status = ?2)",
                )
                .bind(request.id)
                .bind(request.status)
                .fetch_one(pool)
                .await?;
                checks.push(("booking-row", booked == 1));
            }
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let employees = sql_array_from_ids(
            &SEED_EMPLOYEES.iter().map(|employee| employee.id).collect::<Vec<_>>(),
        );
        let properties = sql_array_from_ids(SEED_PROPERTIES);
        let requests =
            sql_array_from_ids(&SEED_REQUESTS.iter().map(|request| request.id).collect::<Vec<_>>());

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DELETE FROM benefit_request WHERE id IN {requests}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM property_calendar WHERE property_id IN {properties}
             AND NOT EXISTS (SELECT 1 FROM house_booking
                             WHERE house_booking.property_id = property_calendar.property_id)"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM employee WHERE id IN {employees}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub employees_seeded: Vec<&'static str>,
    pub properties_seeded: Vec<&'static str>,
    pub requests_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{EmployeeDirectory, RequestStore};
    use crate::{connect_with_settings, migrations, SqlEmployeeDirectory, SqlRequestStore};
    use benefitflow_core::domain::approval::ApproverRole;
    use benefitflow_core::domain::employee::EmployeeId;
    use benefitflow_core::domain::request::{PropertyId, RequestStatus, RequestToken};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = setup_pool().await;

        let first = DemoSeedDataset::load(&pool).await.expect("load seed");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.employees_seeded.len(), 6);

        DemoSeedDataset::load(&pool).await.expect("reload seed");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify seed");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_rows_decode_through_repositories() {
        let pool = setup_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load seed");

        let store = SqlRequestStore::new(pool.clone());
        let request = store
            .find_by_token(&RequestToken("HB-20300510-DEMO0001".to_string()))
            .await
            .expect("find")
            .expect("seeded request");
        assert_eq!(request.status, RequestStatus::Approved);
        assert!(request.chain.is_fully_approved());
        assert!(request.chain.verify().is_ok());

        let calendar =
            store.property_calendar(&PropertyId("HOUSE-BAGUIO".to_string())).await.expect("calendar");
        assert_eq!(calendar.version, 1);
        assert_eq!(calendar.bookings.len(), 1);

        let directory = SqlEmployeeDirectory::new(pool);
        let approver = directory
            .find_approver(&EmployeeId("EMP-SUP-001".to_string()))
            .await
            .expect("approver")
            .expect("seeded role");
        assert_eq!(approver.role, ApproverRole::SupervisorOrDivisionManager);
        let supervisor = directory
            .find_profile(&EmployeeId("EMP-SUP-001".to_string()))
            .await
            .expect("profile")
            .expect("seeded profile");
        assert_eq!(supervisor.outstanding_loans.len(), 1);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = setup_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load seed");

        DemoSeedDataset::clean(&pool).await.expect("clean seed");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM employee")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(remaining, 0);
    }

    #[test]
    fn contract_json_matches_seed_constants() {
        let contract: serde_json::Value =
            serde_json::from_str(include_str!("../../../config/fixtures/demo_seed_contract.json"))
                .expect("seed contract JSON must parse");

        assert_eq!(contract["seed_dataset"].as_str(), Some("deterministic_benefits_demo"));
        let employees = contract["employees"].as_array().expect("employees array");
        assert_eq!(employees.len(), SEED_EMPLOYEES.len());
        for employee in SEED_EMPLOYEES {
            let entry = employees
                .iter()
                .find(|candidate| candidate["id"].as_str() == Some(employee.id))
                .expect("contract lists every seeded employee");
            assert_eq!(entry["approver_role"].as_str(), employee.approver_role);
        }

        let properties = contract["properties"].as_array().expect("properties array");
        assert_eq!(
            properties.iter().filter_map(|value| value.as_str()).collect::<Vec<_>>(),
            SEED_PROPERTIES
        );

        let requests = contract["requests"].as_array().expect("requests array");
        assert_eq!(requests.len(), SEED_REQUESTS.len());
        for request in SEED_REQUESTS {
            let entry = requests
                .iter()
                .find(|candidate| candidate["id"].as_str() == Some(request.id))
                .expect("contract lists every seeded request");
            assert_eq!(entry["token"].as_str(), Some(request.token));
            assert_eq!(entry["status"].as_str(), Some(request.status));
            assert_eq!(entry["stage_count"].as_i64(), Some(request.stage_count));
        }
    }
}
