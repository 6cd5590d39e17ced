pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod policy;
pub mod store;
pub mod templates;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::workflow::{
    ApprovalLevel, ApprovalWorkflow, DelegationInfo, HistoryAction, HistoryStatus, LevelStatus,
    Priority, RequestType, WorkflowDraft, WorkflowHistoryEntry, WorkflowId, WorkflowStatus,
};
pub use engine::{Actor, DelegationRequest, EngineError, WorkflowEngine};
pub use policy::{ApproverPolicy, RoleMatchPolicy};
pub use store::{InMemoryWorkflowStore, StoreError, WorkflowFilter, WorkflowStore, WriteOutcome};
pub use templates::{
    leave_workflow, promotion_workflow, transfer_workflow, LeaveType, MINISTRY_GRADE_THRESHOLD,
};
