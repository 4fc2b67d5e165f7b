use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{ApprovalChain, ApproverRole, Stage};
use crate::domain::request::RequestType;

const FULL_HIERARCHY: &[ApproverRole] = &[
    ApproverRole::Hr,
    ApproverRole::SupervisorOrDivisionManager,
    ApproverRole::VicePresident,
    ApproverRole::President,
];
const BOOKING_HIERARCHY: &[ApproverRole] =
    &[ApproverRole::Hr, ApproverRole::SupervisorOrDivisionManager];
const LEAVE_HIERARCHY: &[ApproverRole] = &[ApproverRole::Hr];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("unknown request type `{tag}`")]
    UnknownRequestType { tag: String },
}

/// Stage roles for a request type, lowest level first.
pub fn hierarchy(request_type: RequestType) -> &'static [ApproverRole] {
    match request_type {
        RequestType::SalaryLoan
        | RequestType::CarLoan
        | RequestType::HousingLoan
        | RequestType::MedicalReimbursement => FULL_HIERARCHY,
        RequestType::HouseBooking => BOOKING_HIERARCHY,
        RequestType::MedicalLoa => LEAVE_HIERARCHY,
    }
}

pub fn build_chain(request_type: RequestType) -> ApprovalChain {
    let stages = hierarchy(request_type)
        .iter()
        .zip(1u8..)
        .map(|(role, level)| Stage::pending(level, *role))
        .collect();
    ApprovalChain::new(stages)
}

pub fn build_chain_for_tag(tag: &str) -> Result<ApprovalChain, ChainError> {
    RequestType::parse(tag)
        .map(build_chain)
        .ok_or_else(|| ChainError::UnknownRequestType { tag: tag.to_string() })
}

/// Read model of a chain stage for API consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub level: u8,
    pub role: String,
    pub status: String,
    pub active: bool,
}

pub fn describe(chain: &ApprovalChain) -> Vec<StageView> {
    let active_level = chain.active_level();
    chain
        .stages
        .iter()
        .map(|stage| StageView {
            level: stage.level,
            role: stage.role.label().to_string(),
            status: stage.status.as_str().to_string(),
            active: active_level == Some(stage.level),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{build_chain, build_chain_for_tag, describe, hierarchy, ChainError};
    use crate::domain::approval::{ApproverRole, StageStatus};
    use crate::domain::request::RequestType;

    #[test]
    fn every_request_type_gets_contiguous_pending_levels() {
        for request_type in RequestType::ALL {
            let chain = build_chain(request_type);
            let expected_len = match request_type {
                RequestType::HouseBooking => 2,
                RequestType::MedicalLoa => 1,
                _ => 4,
            };

            assert_eq!(chain.stages.len(), expected_len, "{request_type:?}");
            for (index, stage) in chain.stages.iter().enumerate() {
                assert_eq!(usize::from(stage.level), index + 1);
                assert_eq!(stage.status, StageStatus::Pending);
                assert!(stage.actor.is_none());
                assert!(stage.decided_at.is_none());
                assert!(stage.comment.is_none());
            }
            assert!(chain.verify().is_ok());
            assert_eq!(chain.active_level(), Some(1));
        }
    }

    #[test]
    fn loan_chain_runs_hr_to_president() {
        let roles: Vec<ApproverRole> =
            build_chain(RequestType::CarLoan).stages.iter().map(|stage| stage.role).collect();

        assert_eq!(
            roles,
            vec![
                ApproverRole::Hr,
                ApproverRole::SupervisorOrDivisionManager,
                ApproverRole::VicePresident,
                ApproverRole::President,
            ]
        );
    }

    #[test]
    fn booking_and_leave_chains_are_short() {
        assert_eq!(
            hierarchy(RequestType::HouseBooking),
            &[ApproverRole::Hr, ApproverRole::SupervisorOrDivisionManager]
        );
        assert_eq!(hierarchy(RequestType::MedicalLoa), &[ApproverRole::Hr]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            build_chain_for_tag("gadget_loan"),
            Err(ChainError::UnknownRequestType { tag: "gadget_loan".to_string() })
        );
        assert!(build_chain_for_tag("house_booking").is_ok());
    }

    #[test]
    fn describe_marks_only_the_active_stage() {
        let views = describe(&build_chain(RequestType::HouseBooking));

        assert_eq!(views.len(), 2);
        assert!(views[0].active);
        assert!(!views[1].active);
        assert_eq!(views[1].role, "Supervisor/Division Manager");
    }
}
