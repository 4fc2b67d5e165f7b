use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    President,
    VicePresident,
    DivisionManager,
    Manager,
    AssistantManager,
    Supervisor,
    RankAndFile,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::President => "president",
            Self::VicePresident => "vice_president",
            Self::DivisionManager => "division_manager",
            Self::Manager => "manager",
            Self::AssistantManager => "assistant_manager",
            Self::Supervisor => "supervisor",
            Self::RankAndFile => "rank_and_file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "president" => Some(Self::President),
            "vice_president" => Some(Self::VicePresident),
            "division_manager" => Some(Self::DivisionManager),
            "manager" => Some(Self::Manager),
            "assistant_manager" => Some(Self::AssistantManager),
            "supervisor" => Some(Self::Supervisor),
            "rank_and_file" => Some(Self::RankAndFile),
            _ => None,
        }
    }
}

/// Benefits package; each tier has its own annual medical ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitsTier {
    Standard,
    Executive,
}

impl BenefitsTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Executive => "executive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "executive" => Some(Self::Executive),
            _ => None,
        }
    }
}

/// Loan balance reported by payroll for a loan that was already disbursed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingLoan {
    pub loan_type: RequestType,
    pub balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: EmployeeId,
    pub display_name: String,
    pub hire_date: Option<NaiveDate>,
    pub monthly_salary: Decimal,
    pub position: Option<Position>,
    pub benefits_tier: BenefitsTier,
    #[serde(default)]
    pub outstanding_loans: Vec<OutstandingLoan>,
}
