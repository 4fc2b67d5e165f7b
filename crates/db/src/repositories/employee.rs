use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use benefitflow_core::domain::approval::{Approver, ApproverRole};
use benefitflow_core::domain::employee::{
    BenefitsTier, EmployeeId, EmployeeProfile, OutstandingLoan, Position,
};
use benefitflow_core::domain::request::RequestType;

use super::{EmployeeDirectory, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlEmployeeDirectory {
    pool: DbPool,
}

impl SqlEmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replaces the stored profile, its payroll loan balances and chain role.
    pub async fn upsert(
        &self,
        profile: &EmployeeProfile,
        approver_role: Option<ApproverRole>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO employee (id, display_name, hire_date, monthly_salary, position,
                                   benefits_tier, approver_role)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 hire_date = excluded.hire_date,
                 monthly_salary = excluded.monthly_salary,
                 position = excluded.position,
                 benefits_tier = excluded.benefits_tier,
                 approver_role = excluded.approver_role",
        )
        .bind(&profile.id.0)
        .bind(&profile.display_name)
        .bind(profile.hire_date.map(|date| date.format(DATE_FORMAT).to_string()))
        .bind(profile.monthly_salary.to_string())
        .bind(profile.position.map(|position| position.as_str()))
        .bind(profile.benefits_tier.as_str())
        .bind(approver_role.map(|role| role.as_str()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM outstanding_loan WHERE employee_id = ?")
            .bind(&profile.id.0)
            .execute(&mut *tx)
            .await?;
        for loan in &profile.outstanding_loans {
            sqlx::query(
                "INSERT INTO outstanding_loan (employee_id, loan_type, balance) VALUES (?, ?, ?)",
            )
            .bind(&profile.id.0)
            .bind(loan.loan_type.as_str())
            .bind(loan.balance.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmployeeDirectory for SqlEmployeeDirectory {
    async fn find_profile(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, hire_date, monthly_salary, position, benefits_tier
             FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let loan_rows = sqlx::query(
            "SELECT loan_type, balance FROM outstanding_loan
             WHERE employee_id = ? ORDER BY loan_type ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut profile = profile_from_row(&row)?;
        profile.outstanding_loans =
            loan_rows.iter().map(loan_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(profile))
    }

    async fn find_approver(&self, id: &EmployeeId) -> Result<Option<Approver>, RepositoryError> {
        let role: Option<Option<String>> =
            sqlx::query_scalar("SELECT approver_role FROM employee WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match role.flatten() {
            Some(raw) => {
                let role = ApproverRole::parse(&raw).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown approver role `{raw}`"))
                })?;
                Ok(Some(Approver { id: id.clone(), role }))
            }
            None => Ok(None),
        }
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<EmployeeProfile, RepositoryError> {
    let hire_date = row
        .try_get::<Option<String>, _>("hire_date")?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|error| {
                RepositoryError::Decode(format!("invalid hire_date `{raw}`: {error}"))
            })
        })
        .transpose()?;

    let position = row
        .try_get::<Option<String>, _>("position")?
        .map(|raw| {
            Position::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown position `{raw}`")))
        })
        .transpose()?;

    let tier_raw = row.try_get::<String, _>("benefits_tier")?;
    let benefits_tier = BenefitsTier::parse(&tier_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown benefits tier `{tier_raw}`")))?;

    Ok(EmployeeProfile {
        id: EmployeeId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        hire_date,
        monthly_salary: parse_decimal("monthly_salary", row.try_get("monthly_salary")?)?,
        position,
        benefits_tier,
        outstanding_loans: Vec::new(),
    })
}

fn loan_from_row(row: &SqliteRow) -> Result<OutstandingLoan, RepositoryError> {
    let loan_type_raw = row.try_get::<String, _>("loan_type")?;
    let loan_type = RequestType::parse(&loan_type_raw)
        .filter(RequestType::is_loan)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown loan type `{loan_type_raw}`")))?;

    Ok(OutstandingLoan { loan_type, balance: parse_decimal("balance", row.try_get("balance")?)? })
}

fn parse_decimal(column: &str, raw: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim()).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{raw}` ({error})"))
    })
}
