use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalChain;
use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Human-facing reference printed on slips and quoted over the phone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub String);

impl RequestToken {
    pub fn generate(request_type: RequestType, on: NaiveDate) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            request_type.token_prefix(),
            on.format("%Y%m%d"),
            suffix[..8].to_ascii_uppercase()
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    SalaryLoan,
    CarLoan,
    HousingLoan,
    MedicalReimbursement,
    MedicalLoa,
    HouseBooking,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        Self::SalaryLoan,
        Self::CarLoan,
        Self::HousingLoan,
        Self::MedicalReimbursement,
        Self::MedicalLoa,
        Self::HouseBooking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalaryLoan => "salary_loan",
            Self::CarLoan => "car_loan",
            Self::HousingLoan => "housing_loan",
            Self::MedicalReimbursement => "medical_reimbursement",
            Self::MedicalLoa => "medical_loa",
            Self::HouseBooking => "house_booking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "salary_loan" => Some(Self::SalaryLoan),
            "car_loan" => Some(Self::CarLoan),
            "housing_loan" => Some(Self::HousingLoan),
            "medical_reimbursement" => Some(Self::MedicalReimbursement),
            "medical_loa" => Some(Self::MedicalLoa),
            "house_booking" => Some(Self::HouseBooking),
            _ => None,
        }
    }

    pub fn is_loan(&self) -> bool {
        matches!(self, Self::SalaryLoan | Self::CarLoan | Self::HousingLoan)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SalaryLoan => "salary loan",
            Self::CarLoan => "car loan",
            Self::HousingLoan => "housing loan",
            Self::MedicalReimbursement => "medical reimbursement",
            Self::MedicalLoa => "medical leave of absence",
            Self::HouseBooking => "staff house booking",
        }
    }

    fn token_prefix(&self) -> &'static str {
        match self {
            Self::SalaryLoan => "SL",
            Self::CarLoan => "CL",
            Self::HousingLoan => "HL",
            Self::MedicalReimbursement => "MR",
            Self::MedicalLoa => "LOA",
            Self::HouseBooking => "HB",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub key: String,
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPayload {
    pub amount: Decimal,
    pub term_months: u32,
    pub purpose: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReimbursementPayload {
    pub amount: Decimal,
    pub incurred_on: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPayload {
    pub property_id: PropertyId,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    pub guests: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    SalaryLoan(LoanPayload),
    CarLoan(LoanPayload),
    HousingLoan(LoanPayload),
    MedicalReimbursement(ReimbursementPayload),
    MedicalLoa(LeavePayload),
    HouseBooking(BookingPayload),
}

impl RequestPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::SalaryLoan(_) => RequestType::SalaryLoan,
            Self::CarLoan(_) => RequestType::CarLoan,
            Self::HousingLoan(_) => RequestType::HousingLoan,
            Self::MedicalReimbursement(_) => RequestType::MedicalReimbursement,
            Self::MedicalLoa(_) => RequestType::MedicalLoa,
            Self::HouseBooking(_) => RequestType::HouseBooking,
        }
    }

    /// Monetary amount for loans and reimbursements.
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Self::SalaryLoan(loan) | Self::CarLoan(loan) | Self::HousingLoan(loan) => {
                Some(loan.amount)
            }
            Self::MedicalReimbursement(reimbursement) => Some(reimbursement.amount),
            Self::MedicalLoa(_) | Self::HouseBooking(_) => None,
        }
    }

    pub fn booking(&self) -> Option<&BookingPayload> {
        match self {
            Self::HouseBooking(booking) => Some(booking),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled_by: EmployeeId,
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub token: RequestToken,
    pub requester_id: EmployeeId,
    pub payload: RequestPayload,
    pub status: RequestStatus,
    pub chain: ApprovalChain,
    pub version: u64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancellation: Option<Cancellation>,
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        self.payload.request_type()
    }

    pub fn active_level(&self) -> Option<u8> {
        if self.status != RequestStatus::Pending {
            return None;
        }
        self.chain.active_stage().map(|stage| stage.level)
    }
}
