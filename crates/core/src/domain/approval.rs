use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::EmployeeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Hr,
    SupervisorOrDivisionManager,
    VicePresident,
    President,
}

impl ApproverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hr => "hr",
            Self::SupervisorOrDivisionManager => "supervisor_or_division_manager",
            Self::VicePresident => "vice_president",
            Self::President => "president",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hr" => Some(Self::Hr),
            "supervisor_or_division_manager" => Some(Self::SupervisorOrDivisionManager),
            "vice_president" => Some(Self::VicePresident),
            "president" => Some(Self::President),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hr => "HR",
            Self::SupervisorOrDivisionManager => "Supervisor/Division Manager",
            Self::VicePresident => "Vice President",
            Self::President => "President",
        }
    }
}

/// Identity of whoever is acting on a stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: EmployeeId,
    pub role: ApproverRole,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Approved,
    Rejected,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub level: u8,
    pub role: ApproverRole,
    pub status: StageStatus,
    pub actor: Option<EmployeeId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl Stage {
    pub fn pending(level: u8, role: ApproverRole) -> Self {
        Self { level, role, status: StageStatus::Pending, actor: None, decided_at: None, comment: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainIntegrityError {
    #[error("approval chain has no stages")]
    Empty,
    #[error("stage at position {position} has level {found}, expected {expected}")]
    LevelGap { position: usize, expected: u8, found: u8 },
    #[error("stage {level} is decided while an earlier stage is still pending")]
    DecidedAfterPending { level: u8 },
    #[error("stage {level} is decided after the chain was rejected")]
    DecidedAfterRejection { level: u8 },
    #[error("stage {level} is decided but has no actor or timestamp")]
    MissingDecisionAudit { level: u8 },
    #[error("request is pending but its approval chain is already terminal")]
    TerminalWhilePending,
}

/// Ordered stages attached to exactly one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChain {
    pub stages: Vec<Stage>,
}

impl ApprovalChain {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Lowest-level stage still pending, or `None` once the chain is terminal.
    pub fn active_stage(&self) -> Option<&Stage> {
        if self.is_rejected() {
            return None;
        }
        self.stages.iter().find(|stage| stage.status == StageStatus::Pending)
    }

    pub fn active_level(&self) -> Option<u8> {
        self.active_stage().map(|stage| stage.level)
    }

    pub fn is_rejected(&self) -> bool {
        self.stages.iter().any(|stage| stage.status == StageStatus::Rejected)
    }

    pub fn is_fully_approved(&self) -> bool {
        !self.stages.is_empty()
            && self.stages.iter().all(|stage| stage.status == StageStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_rejected() || self.is_fully_approved()
    }

    pub fn final_level(&self) -> Option<u8> {
        self.stages.last().map(|stage| stage.level)
    }

    pub fn stage_mut(&mut self, level: u8) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|stage| stage.level == level)
    }

    pub fn rejection_comment(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|stage| stage.status == StageStatus::Rejected)
            .and_then(|stage| stage.comment.as_deref())
    }

    /// Checks the shape every persisted chain must have: contiguous levels from 1,
    /// an approved prefix, at most one rejected stage and nothing decided past it.
    pub fn verify(&self) -> Result<(), ChainIntegrityError> {
        if self.stages.is_empty() {
            return Err(ChainIntegrityError::Empty);
        }

        let mut seen_undecided = false;
        let mut seen_rejected = false;
        for (position, stage) in self.stages.iter().enumerate() {
            let expected = u8::try_from(position + 1).unwrap_or(u8::MAX);
            if stage.level != expected {
                return Err(ChainIntegrityError::LevelGap {
                    position,
                    expected,
                    found: stage.level,
                });
            }

            if stage.status != StageStatus::Pending
                && (stage.actor.is_none() || stage.decided_at.is_none())
            {
                return Err(ChainIntegrityError::MissingDecisionAudit { level: stage.level });
            }

            match stage.status {
                StageStatus::Approved | StageStatus::Rejected if seen_rejected => {
                    return Err(ChainIntegrityError::DecidedAfterRejection { level: stage.level });
                }
                StageStatus::Approved | StageStatus::Rejected if seen_undecided => {
                    return Err(ChainIntegrityError::DecidedAfterPending { level: stage.level });
                }
                StageStatus::Rejected => seen_rejected = true,
                StageStatus::Pending => seen_undecided = true,
                StageStatus::Approved => {}
            }
        }

        Ok(())
    }
}
