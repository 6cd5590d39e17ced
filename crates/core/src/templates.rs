use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::{ApprovalLevel, Priority, RequestType, WorkflowDraft};

/// Promotions to this grade or above require ministry sign-off.
pub const MINISTRY_GRADE_THRESHOLD: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    Annual,
    Casual,
    Medical,
    Maternity,
    Study,
    Unpaid,
}

impl LeaveType {
    fn label(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Casual => "casual",
            Self::Medical => "medical",
            Self::Maternity => "maternity",
            Self::Study => "study",
            Self::Unpaid => "unpaid",
        }
    }

    /// Leave categories that need an HR review gate regardless of duration.
    fn requires_hr_review(&self) -> bool {
        matches!(self, Self::Medical | Self::Maternity | Self::Study)
    }
}

/// Leave chain: supervisor always, department head (skippable for short
/// leave), HR appended for medically or study related categories.
pub fn leave_workflow(
    request_id: impl Into<String>,
    requested_by: impl Into<String>,
    requested_for: impl Into<String>,
    leave_type: LeaveType,
    duration_days: u32,
    now: DateTime<Utc>,
) -> WorkflowDraft {
    let long_leave = duration_days > 5;
    let mut approval_levels = vec![
        ApprovalLevel::new(1, "immediate_supervisor", "Immediate Supervisor", true, true, false, 24),
        ApprovalLevel::new(2, "department_head", "Department Head", long_leave, true, !long_leave, 48),
    ];
    if leave_type.requires_hr_review() {
        approval_levels.push(ApprovalLevel::new(
            3,
            "hr_department",
            "HR Department",
            true,
            false,
            false,
            72,
        ));
    }

    let priority = if duration_days > 15 { Priority::High } else { Priority::Medium };

    WorkflowDraft {
        request_id: request_id.into(),
        request_type: RequestType::Leave,
        request_title: format!("Leave request ({}, {duration_days} days)", leave_type.label()),
        requested_by: requested_by.into(),
        requested_for: requested_for.into(),
        priority,
        approval_levels,
        submitted_at: now,
        deadline: Some(now + Duration::days(7)),
    }
}

/// Promotion chain: department head, HR, and ministry approval for senior
/// grades.
pub fn promotion_workflow(
    request_id: impl Into<String>,
    requested_by: impl Into<String>,
    requested_for: impl Into<String>,
    from_grade: u32,
    to_grade: u32,
    now: DateTime<Utc>,
) -> WorkflowDraft {
    let mut approval_levels = vec![
        ApprovalLevel::new(1, "department_head", "Department Head", true, true, false, 72),
        ApprovalLevel::new(2, "hr_department", "HR Department", true, false, false, 120),
    ];
    if to_grade >= MINISTRY_GRADE_THRESHOLD {
        approval_levels.push(ApprovalLevel::new(
            3,
            "ministry_approval",
            "Ministry Approval",
            true,
            false,
            false,
            240,
        ));
    }

    WorkflowDraft {
        request_id: request_id.into(),
        request_type: RequestType::Promotion,
        request_title: format!("Promotion request (grade {from_grade} to {to_grade})"),
        requested_by: requested_by.into(),
        requested_for: requested_for.into(),
        priority: Priority::High,
        approval_levels,
        submitted_at: now,
        deadline: Some(now + Duration::days(30)),
    }
}

/// Transfer chain: releasing head, receiving head, then HR. All three gates
/// are mandatory.
pub fn transfer_workflow(
    request_id: impl Into<String>,
    requested_by: impl Into<String>,
    requested_for: impl Into<String>,
    from_department: &str,
    to_department: &str,
    now: DateTime<Utc>,
) -> WorkflowDraft {
    let approval_levels = vec![
        ApprovalLevel::new(
            1,
            "current_department_head",
            "Current Department Head",
            true,
            true,
            false,
            72,
        ),
        ApprovalLevel::new(
            2,
            "receiving_department_head",
            "Receiving Department Head",
            true,
            true,
            false,
            72,
        ),
        ApprovalLevel::new(3, "hr_department", "HR Department", true, false, false, 120),
    ];

    WorkflowDraft {
        request_id: request_id.into(),
        request_type: RequestType::Transfer,
        request_title: format!("Transfer request ({from_department} to {to_department})"),
        requested_by: requested_by.into(),
        requested_for: requested_for.into(),
        priority: Priority::Medium,
        approval_levels,
        submitted_at: now,
        deadline: Some(now + Duration::days(21)),
    }
}
