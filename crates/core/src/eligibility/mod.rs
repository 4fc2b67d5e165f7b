//! Benefit eligibility rules.
//!
//! Business-rule failures come back as `Eligibility { eligible: false, reason }` so
//! callers can show the reason directly. Only malformed profiles are errors.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::domain::approval::StageStatus;
use crate::domain::employee::{BenefitsTier, EmployeeId, EmployeeProfile, Position};
use crate::domain::request::{Request, RequestId, RequestStatus, RequestType};

pub const MIN_YEARS_FOR_LOANS: i32 = 3;
pub const DOUBLE_SALARY_LOAN_YEARS: i32 = 5;
pub const HOUSING_LOAN_SALARY_MULTIPLIER: u32 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EligibilityError {
    #[error("employee `{}` has no hire date on file", .employee_id.0)]
    MissingHireDate { employee_id: EmployeeId },
    #[error("employee `{}` has a negative monthly salary ({salary})", .employee_id.0)]
    NegativeSalary { employee_id: EmployeeId, salary: Decimal },
    #[error("employee `{}` has a monthly salary too large to compute a loan limit ({salary})", .employee_id.0)]
    SalaryOutOfRange { employee_id: EmployeeId, salary: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("{reason}")]
    NotEligible { reason: String },
    #[error("the amount must be greater than zero")]
    NonPositive,
    #[error("the minimum amount for a salary loan is {floor}; {requested} was requested")]
    AmountBelowFloor { requested: Decimal, floor: Decimal },
    #[error("the maximum amount you may request is {maximum}; {requested} was requested")]
    AmountAboveMaximum { requested: Decimal, maximum: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<String>,
    pub max_amount: Option<Decimal>,
}

impl Eligibility {
    pub fn eligible(max_amount: Option<Decimal>) -> Self {
        Self { eligible: true, reason: None, max_amount }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self { eligible: false, reason: Some(reason.into()), max_amount: None }
    }
}

/// The parts of an employee's request history the rules look at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub amount: Option<Decimal>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl From<&Request> for RequestSummary {
    fn from(request: &Request) -> Self {
        let decided_at = if request.status == RequestStatus::Pending {
            None
        } else {
            request
                .chain
                .stages
                .iter()
                .filter(|stage| stage.status != StageStatus::Pending)
                .filter_map(|stage| stage.decided_at)
                .max()
        };
        Self {
            id: request.id.clone(),
            request_type: request.request_type(),
            status: request.status,
            amount: request.payload.amount(),
            decided_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityPolicy {
    pub standard_medical_ceiling: Decimal,
    pub executive_medical_ceiling: Decimal,
    pub salary_loan_floor: Decimal,
    pub car_loan_limits: Vec<(Position, Decimal)>,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            standard_medical_ceiling: Decimal::from(60_000),
            executive_medical_ceiling: Decimal::from(120_000),
            salary_loan_floor: Decimal::from(10_000),
            car_loan_limits: vec![
                (Position::President, Decimal::from(2_000_000)),
                (Position::VicePresident, Decimal::from(1_500_000)),
                (Position::DivisionManager, Decimal::from(1_200_000)),
                (Position::Manager, Decimal::from(1_000_000)),
                (Position::AssistantManager, Decimal::from(800_000)),
            ],
        }
    }
}

impl EligibilityPolicy {
    pub fn medical_ceiling(&self, tier: BenefitsTier) -> Decimal {
        match tier {
            BenefitsTier::Standard => self.standard_medical_ceiling,
            BenefitsTier::Executive => self.executive_medical_ceiling,
        }
    }

    pub fn car_loan_limit(&self, position: Position) -> Option<Decimal> {
        self.car_loan_limits
            .iter()
            .find(|(candidate, _)| *candidate == position)
            .map(|(_, limit)| *limit)
    }
}

/// Whole years of service; the current year counts only once the hire anniversary is reached.
pub fn years_of_service(hire_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - hire_date.year();
    if (today.month(), today.day()) < (hire_date.month(), hire_date.day()) {
        years -= 1;
    }
    years
}

pub struct EligibilityEvaluator<C> {
    clock: C,
    policy: EligibilityPolicy,
}

impl<C> EligibilityEvaluator<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self::with_policy(clock, EligibilityPolicy::default())
    }

    pub fn with_policy(clock: C, policy: EligibilityPolicy) -> Self {
        Self { clock, policy }
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    pub fn evaluate(
        &self,
        request_type: RequestType,
        profile: &EmployeeProfile,
        requests: &[RequestSummary],
    ) -> Result<Eligibility, EligibilityError> {
        let hire_date = profile
            .hire_date
            .ok_or_else(|| EligibilityError::MissingHireDate { employee_id: profile.id.clone() })?;
        if profile.monthly_salary < Decimal::ZERO {
            return Err(EligibilityError::NegativeSalary {
                employee_id: profile.id.clone(),
                salary: profile.monthly_salary,
            });
        }

        let today = self.clock.today();
        let eligibility = match request_type {
            RequestType::MedicalLoa | RequestType::HouseBooking => Eligibility::eligible(None),
            RequestType::MedicalReimbursement => {
                self.medical(profile, requests, self.clock.now().year())
            }
            RequestType::SalaryLoan | RequestType::CarLoan | RequestType::HousingLoan => {
                self.loan(request_type, profile, requests, hire_date, today)?
            }
        };

        if !eligibility.eligible {
            debug!(
                event_name = "eligibility.denied",
                employee_id = %profile.id.0,
                request_type = request_type.as_str(),
                reason = eligibility.reason.as_deref().unwrap_or_default(),
                "request type not available to employee"
            );
        }
        Ok(eligibility)
    }

    /// Validates a requested amount against an evaluation result.
    pub fn check_amount(
        &self,
        requested: Decimal,
        eligibility: &Eligibility,
        request_type: RequestType,
    ) -> Result<(), AmountError> {
        if !eligibility.eligible {
            return Err(AmountError::NotEligible {
                reason: eligibility
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("not eligible for a {}", request_type.display_name())),
            });
        }
        if requested <= Decimal::ZERO {
            return Err(AmountError::NonPositive);
        }
        if request_type == RequestType::SalaryLoan && requested < self.policy.salary_loan_floor {
            return Err(AmountError::AmountBelowFloor {
                requested,
                floor: self.policy.salary_loan_floor,
            });
        }
        match eligibility.max_amount {
            Some(maximum) if requested > maximum => {
                Err(AmountError::AmountAboveMaximum { requested, maximum })
            }
            _ => Ok(()),
        }
    }

    fn medical(
        &self,
        profile: &EmployeeProfile,
        requests: &[RequestSummary],
        benefit_year: i32,
    ) -> Eligibility {
        let used: Decimal = requests
            .iter()
            .filter(|summary| {
                summary.request_type == RequestType::MedicalReimbursement
                    && summary.status == RequestStatus::Approved
                    && summary.decided_at.is_some_and(|at| at.year() == benefit_year)
            })
            .filter_map(|summary| summary.amount)
            .sum();
        let remaining = self.policy.medical_ceiling(profile.benefits_tier) - used;

        if remaining <= Decimal::ZERO {
            return Eligibility::denied(format!(
                "Sorry, your medical benefits for {benefit_year} have been fully used."
            ));
        }
        Eligibility::eligible(Some(remaining))
    }

    fn loan(
        &self,
        request_type: RequestType,
        profile: &EmployeeProfile,
        requests: &[RequestSummary],
        hire_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Eligibility, EligibilityError> {
        let years = years_of_service(hire_date, today);
        if years < MIN_YEARS_FOR_LOANS {
            return Ok(Eligibility::denied(format!(
                "Sorry, you are not yet eligible for a {}: you have less than {} years in the company.",
                request_type.display_name(),
                MIN_YEARS_FOR_LOANS
            )));
        }

        let holds = |loan_type: RequestType| {
            requests.iter().any(|summary| {
                summary.request_type == loan_type && summary.status == RequestStatus::Pending
            }) || profile
                .outstanding_loans
                .iter()
                .any(|loan| loan.loan_type == loan_type && loan.balance > Decimal::ZERO)
        };

        if holds(request_type) {
            return Ok(Eligibility::denied(format!(
                "You already have an active {}.",
                request_type.display_name()
            )));
        }
        match request_type {
            RequestType::HousingLoan
                if holds(RequestType::CarLoan) || holds(RequestType::SalaryLoan) =>
            {
                return Ok(Eligibility::denied(
                    "A housing loan cannot be combined with an active car loan or salary loan.",
                ));
            }
            RequestType::CarLoan | RequestType::SalaryLoan if holds(RequestType::HousingLoan) => {
                return Ok(Eligibility::denied(format!(
                    "A {} cannot be combined with an active housing loan.",
                    request_type.display_name()
                )));
            }
            _ => {}
        }

        let salary_times = |multiplier: u32| {
            profile.monthly_salary.checked_mul(Decimal::from(multiplier)).ok_or_else(|| {
                EligibilityError::SalaryOutOfRange {
                    employee_id: profile.id.clone(),
                    salary: profile.monthly_salary,
                }
            })
        };

        let eligibility = match request_type {
            RequestType::SalaryLoan => {
                let multiplier = if years >= DOUBLE_SALARY_LOAN_YEARS { 2 } else { 1 };
                let max_amount = salary_times(multiplier)?;
                if max_amount < self.policy.salary_loan_floor {
                    Eligibility::denied(format!(
                        "Your salary loan limit of {} is below the minimum loan amount of {}.",
                        max_amount, self.policy.salary_loan_floor
                    ))
                } else {
                    Eligibility::eligible(Some(max_amount))
                }
            }
            RequestType::CarLoan => {
                match profile.position.and_then(|position| self.policy.car_loan_limit(position)) {
                    Some(limit) => Eligibility::eligible(Some(limit)),
                    None => Eligibility::denied("Car loans are not available for your position."),
                }
            }
            _ => Eligibility::eligible(Some(salary_times(HOUSING_LOAN_SALARY_MULTIPLIER)?)),
        };
        Ok(eligibility)
    }
}
