use benefitflow_core::config::{AppConfig, LoadOptions};
use benefitflow_core::domain::approval::ApproverRole;
use benefitflow_db::{connect_with_config, migrations::MIGRATOR, DbPool};
use serde::Serialize;

use crate::commands::{escape_json, CommandResult};

const CHAIN_ROLES: [ApproverRole; 4] = [
    ApproverRole::Hr,
    ApproverRole::SupervisorOrDivisionManager,
    ApproverRole::VicePresident,
    ApproverRole::President,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, because: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {because}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 7 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["database_connectivity", "schema_version", "approver_coverage"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_version", "the database was not reached"),
                DoctorCheck::skipped("approver_coverage", "the database was not reached"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_version", "the database was not reached"),
                    DoctorCheck::skipped("approver_coverage", "the database was not reached"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        )];
        let schema = schema_check(&pool).await;
        let schema_ready = schema.status == CheckStatus::Pass;
        checks.push(schema);
        checks.push(if schema_ready {
            approver_coverage(&pool).await
        } else {
            DoctorCheck::skipped("approver_coverage", "the schema is not current")
        });

        pool.close().await;
        checks
    })
}

async fn schema_check(pool: &DbPool) -> DoctorCheck {
    let expected = MIGRATOR.iter().map(|migration| migration.version).max().unwrap_or_default();
    let applied = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match applied {
        Ok(Some(version)) if version >= expected => {
            DoctorCheck::pass("schema_version", format!("schema at migration {version}"))
        }
        Ok(Some(version)) => DoctorCheck::fail(
            "schema_version",
            format!("schema at migration {version}, expected {expected}; run `benefitflow migrate`"),
        ),
        Ok(None) | Err(_) => {
            DoctorCheck::fail("schema_version", "no migrations applied; run `benefitflow migrate`")
        }
    }
}

/// Every chain role needs at least one employee able to act on it, or
/// requests routed to that stage can never be decided.
async fn approver_coverage(pool: &DbPool) -> DoctorCheck {
    let mut missing = Vec::new();
    for role in CHAIN_ROLES {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(1) FROM employee WHERE approver_role = ?1",
        )
        .bind(role.as_str())
        .fetch_one(pool)
        .await;
        match count {
            Ok(0) => missing.push(role.label()),
            Ok(_) => {}
            Err(error) => {
                return DoctorCheck::fail(
                    "approver_coverage",
                    format!("failed to read approver roles: {error}"),
                )
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck::pass("approver_coverage", "every approval stage has an approver")
    } else {
        DoctorCheck::fail("approver_coverage", format!("no approver for: {}", missing.join(", ")))
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
