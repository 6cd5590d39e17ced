use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Promotion,
    Transfer,
    Training,
    Disciplinary,
    Expense,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Escalated,
}

impl WorkflowStatus {
    /// Terminal workflows accept no further mutations. `Escalated` is
    /// deliberately non-terminal: it can be resumed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Pending,
    Approved,
    Rejected,
    Delegated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Submitted,
    Approved,
    Rejected,
    Delegated,
    Withdrawn,
    Escalated,
    Resumed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationInfo {
    pub delegated_to: String,
    pub delegated_to_name: String,
    pub delegated_by: String,
    pub delegation_date: DateTime<Utc>,
    pub reason: String,
    pub is_temporary: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// One sequential approval gate. Membership in `approval_levels` is fixed at
/// creation time; only the per-action fields mutate, and only for the level
/// equal to `current_level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub level: u32,
    pub approver_role: String,
    pub role_label: String,
    pub is_required: bool,
    pub can_delegate: bool,
    pub can_skip: bool,
    pub timeout_hours: u32,
    pub status: LevelStatus,
    pub action_date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub approver_id: Option<String>,
    pub delegation: Option<DelegationInfo>,
}

impl ApprovalLevel {
    pub fn new(
        level: u32,
        approver_role: impl Into<String>,
        role_label: impl Into<String>,
        is_required: bool,
        can_delegate: bool,
        can_skip: bool,
        timeout_hours: u32,
    ) -> Self {
        Self {
            level,
            approver_role: approver_role.into(),
            role_label: role_label.into(),
            is_required,
            can_delegate,
            can_skip,
            timeout_hours,
            status: LevelStatus::Pending,
            action_date: None,
            comments: None,
            approver_id: None,
            delegation: None,
        }
    }
}

/// Status vocabulary of the history ledger. A superset of `WorkflowStatus`:
/// delegation records `Delegated` even though the workflow itself stays
/// pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Escalated,
    Delegated,
}

impl From<WorkflowStatus> for HistoryStatus {
    fn from(status: WorkflowStatus) -> Self {
        match status {
            WorkflowStatus::Pending => Self::Pending,
            WorkflowStatus::Approved => Self::Approved,
            WorkflowStatus::Rejected => Self::Rejected,
            WorkflowStatus::Cancelled => Self::Cancelled,
            WorkflowStatus::Escalated => Self::Escalated,
        }
    }
}

/// Immutable ledger record. `previous_status` is `None` only for the seeded
/// `submitted` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: String,
    pub action: HistoryAction,
    pub performed_by: String,
    pub performed_by_name: String,
    pub performed_at: DateTime<Utc>,
    pub level: u32,
    pub comments: String,
    pub previous_status: Option<HistoryStatus>,
    pub new_status: HistoryStatus,
}

/// Pre-persistence output of the template factory: everything the store does
/// not assign itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowDraft {
    pub request_id: String,
    pub request_type: RequestType,
    pub request_title: String,
    pub requested_by: String,
    pub requested_for: String,
    pub priority: Priority,
    pub approval_levels: Vec<ApprovalLevel>,
    pub submitted_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl WorkflowDraft {
    pub fn total_levels(&self) -> u32 {
        self.approval_levels.len() as u32
    }
}

/// Aggregate root. Written exclusively by the engine; every mutation appends
/// exactly one history entry and bumps `version` for the conditional write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: WorkflowId,
    pub request_id: String,
    pub request_type: RequestType,
    pub request_title: String,
    pub requested_by: String,
    pub requested_for: String,
    pub current_level: u32,
    pub total_levels: u32,
    pub status: WorkflowStatus,
    pub priority: Priority,
    pub approval_levels: Vec<ApprovalLevel>,
    pub workflow_history: Vec<WorkflowHistoryEntry>,
    pub attachments: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    /// Expands a draft into a full document. The id is a placeholder until
    /// the store assigns one on create.
    pub fn from_draft(draft: WorkflowDraft, now: DateTime<Utc>) -> Self {
        let total_levels = draft.total_levels();
        Self {
            id: WorkflowId(String::new()),
            request_id: draft.request_id,
            request_type: draft.request_type,
            request_title: draft.request_title,
            requested_by: draft.requested_by,
            requested_for: draft.requested_for,
            current_level: 1,
            total_levels,
            status: WorkflowStatus::Pending,
            priority: draft.priority,
            approval_levels: draft.approval_levels,
            workflow_history: Vec::new(),
            attachments: Vec::new(),
            submitted_at: draft.submitted_at,
            deadline: draft.deadline,
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The unique level record awaiting action. `None` indicates a corrupt
    /// document and is surfaced as a hard error by the engine.
    pub fn current_approver(&self) -> Option<&ApprovalLevel> {
        self.approval_levels.iter().find(|level| level.level == self.current_level)
    }

    pub fn current_approver_mut(&mut self) -> Option<&mut ApprovalLevel> {
        let current = self.current_level;
        self.approval_levels.iter_mut().find(|level| level.level == current)
    }

    pub fn progress_percent(&self) -> u8 {
        if self.total_levels == 0 {
            return 0;
        }
        ((self.current_level as f64 / self.total_levels as f64) * 100.0).round() as u8
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline.map(|deadline| deadline - now)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
