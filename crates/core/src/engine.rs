use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::domain::workflow::{
    ApprovalWorkflow, DelegationInfo, HistoryAction, HistoryStatus, LevelStatus, Priority,
    WorkflowDraft, WorkflowHistoryEntry, WorkflowId, WorkflowStatus,
};
use crate::policy::{ApproverPolicy, RoleMatchPolicy};
use crate::store::{StoreError, WorkflowFilter, WorkflowStore, WriteOutcome};

/// Identity acting on a workflow. Threaded explicitly through every
/// operation; the engine holds no ambient notion of a current user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self { user_id: user_id.into(), display_name: display_name.into(), roles }
    }

    /// Synthetic actor recorded on escalations.
    pub fn system() -> Self {
        Self { user_id: "system".to_string(), display_name: "System".to_string(), roles: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegationRequest {
    pub delegated_to: String,
    pub delegated_to_name: String,
    pub reason: String,
    pub is_temporary: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("workflow `{workflow_id}` was not found")]
    NotFound { workflow_id: String },
    #[error("workflow is {status:?} and accepts no further actions")]
    TerminalWorkflow { status: WorkflowStatus },
    #[error("no approval level matches current level {level}")]
    LevelNotFound { level: u32 },
    #[error("invalid operation: {0}")]
    Validation(String),
    #[error("workflow `{workflow_id}` was modified concurrently; reload and retry")]
    Conflict { workflow_id: String },
    #[error("store failure during `{operation}` on `{target}`: {source}")]
    Store {
        operation: &'static str,
        target: String,
        #[source]
        source: StoreError,
    },
}

/// Drives a workflow through its approval levels. Every mutator is a single
/// read-modify-write: load the document, validate, compute the next state,
/// append one history entry, write back conditioned on the version read.
pub struct WorkflowEngine<S, C = SystemClock, P = RoleMatchPolicy> {
    store: S,
    clock: C,
    policy: P,
}

impl<S> WorkflowEngine<S>
where
    S: WorkflowStore,
{
    pub fn new(store: S) -> Self {
        Self { store, clock: SystemClock, policy: RoleMatchPolicy }
    }
}

impl<S, C, P> WorkflowEngine<S, C, P>
where
    S: WorkflowStore,
    C: Clock,
    P: ApproverPolicy,
{
    pub fn with_parts(store: S, clock: C, policy: P) -> Self {
        Self { store, clock, policy }
    }

    /// Persists a new workflow and seeds its history with the `submitted`
    /// entry. The template factory is trusted; no cross-field validation
    /// happens here.
    pub async fn submit(&self, draft: WorkflowDraft, actor: &Actor) -> Result<WorkflowId, EngineError> {
        let now = self.clock.now();
        let request_id = draft.request_id.clone();
        let mut workflow = ApprovalWorkflow::from_draft(draft, now);
        workflow.workflow_history.push(history_entry(
            HistoryAction::Submitted,
            actor,
            now,
            0,
            "",
            None,
            HistoryStatus::Pending,
        ));

        let id = self.store.create(workflow).await.map_err(|source| EngineError::Store {
            operation: "submit",
            target: request_id.clone(),
            source,
        })?;

        info!(
            event_name = "workflow.submitted",
            workflow_id = %id,
            request_id = %request_id,
            "workflow submitted"
        );
        Ok(id)
    }

    /// Approves the level at `current_level`. Advances to the next level, or
    /// completes the workflow when the last level approves.
    pub async fn approve(
        &self,
        id: &WorkflowId,
        comments: &str,
        actor: &Actor,
    ) -> Result<ApprovalWorkflow, EngineError> {
        require_text(comments, "approval comments")?;

        let mut workflow = self.load(id, "approve").await?;
        ensure_actionable(&workflow)?;

        let now = self.clock.now();
        let acted_level = workflow.current_level;
        {
            let level = workflow
                .current_approver_mut()
                .ok_or(EngineError::LevelNotFound { level: acted_level })?;
            level.status = LevelStatus::Approved;
            level.action_date = Some(now);
            level.comments = Some(comments.to_string());
            level.approver_id = Some(actor.user_id.clone());
        }

        let is_last_level = workflow.current_level >= workflow.total_levels;
        let new_status = if is_last_level {
            workflow.status = WorkflowStatus::Approved;
            workflow.completed_at = Some(now);
            HistoryStatus::Approved
        } else {
            workflow.current_level += 1;
            HistoryStatus::Pending
        };

        workflow.workflow_history.push(history_entry(
            HistoryAction::Approved,
            actor,
            now,
            acted_level,
            comments,
            Some(HistoryStatus::Pending),
            new_status,
        ));

        info!(
            event_name = "workflow.level_approved",
            workflow_id = %workflow.id,
            level = acted_level,
            completed = is_last_level,
            "approval recorded"
        );
        self.persist(workflow, now, "approve").await
    }

    /// Rejection at any level terminates the whole workflow; there is no
    /// rollback to a prior level.
    pub async fn reject(
        &self,
        id: &WorkflowId,
        reason: &str,
        actor: &Actor,
    ) -> Result<ApprovalWorkflow, EngineError> {
        require_text(reason, "rejection reason")?;

        let mut workflow = self.load(id, "reject").await?;
        ensure_actionable(&workflow)?;

        let now = self.clock.now();
        let acted_level = workflow.current_level;
        {
            let level = workflow
                .current_approver_mut()
                .ok_or(EngineError::LevelNotFound { level: acted_level })?;
            level.status = LevelStatus::Rejected;
            level.action_date = Some(now);
            level.comments = Some(reason.to_string());
            level.approver_id = Some(actor.user_id.clone());
        }

        workflow.status = WorkflowStatus::Rejected;
        workflow.completed_at = Some(now);
        workflow.workflow_history.push(history_entry(
            HistoryAction::Rejected,
            actor,
            now,
            acted_level,
            reason,
            Some(HistoryStatus::Pending),
            HistoryStatus::Rejected,
        ));

        info!(
            event_name = "workflow.rejected",
            workflow_id = %workflow.id,
            level = acted_level,
            "rejection recorded"
        );
        self.persist(workflow, now, "reject").await
    }

    /// Hands the current level to another approver. The workflow status and
    /// `current_level` are untouched; only who may act changes.
    pub async fn delegate(
        &self,
        id: &WorkflowId,
        request: DelegationRequest,
        actor: &Actor,
    ) -> Result<ApprovalWorkflow, EngineError> {
        require_text(&request.reason, "delegation reason")?;

        let mut workflow = self.load(id, "delegate").await?;
        ensure_actionable(&workflow)?;

        let now = self.clock.now();
        let acted_level = workflow.current_level;
        let reason = request.reason.clone();
        let delegated_to = request.delegated_to.clone();
        {
            let level = workflow
                .current_approver_mut()
                .ok_or(EngineError::LevelNotFound { level: acted_level })?;
            if !level.can_delegate {
                return Err(EngineError::Validation(format!(
                    "level {acted_level} ({}) does not allow delegation",
                    level.approver_role
                )));
            }
            level.status = LevelStatus::Delegated;
            level.approver_id = Some(request.delegated_to.clone());
            level.delegation = Some(DelegationInfo {
                delegated_to: request.delegated_to,
                delegated_to_name: request.delegated_to_name,
                delegated_by: actor.user_id.clone(),
                delegation_date: now,
                reason: request.reason,
                is_temporary: request.is_temporary,
                expiry_date: request.expiry_date,
                is_active: true,
            });
        }

        workflow.workflow_history.push(history_entry(
            HistoryAction::Delegated,
            actor,
            now,
            acted_level,
            &reason,
            Some(HistoryStatus::Pending),
            HistoryStatus::Delegated,
        ));

        info!(
            event_name = "workflow.delegated",
            workflow_id = %workflow.id,
            level = acted_level,
            delegated_to = %delegated_to,
            "delegation recorded"
        );
        self.persist(workflow, now, "delegate").await
    }

    /// Cancels the workflow. Only the original requester may withdraw;
    /// approval levels are left as they stand.
    pub async fn withdraw(
        &self,
        id: &WorkflowId,
        reason: &str,
        actor: &Actor,
    ) -> Result<ApprovalWorkflow, EngineError> {
        let mut workflow = self.load(id, "withdraw").await?;
        if workflow.is_terminal() {
            return Err(EngineError::TerminalWorkflow { status: workflow.status });
        }
        if workflow.requested_by != actor.user_id {
            return Err(EngineError::Validation(
                "only the original requester may withdraw a workflow".to_string(),
            ));
        }

        let now = self.clock.now();
        let previous = workflow.status;
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(now);
        workflow.workflow_history.push(history_entry(
            HistoryAction::Withdrawn,
            actor,
            now,
            workflow.current_level,
            reason,
            Some(previous.into()),
            HistoryStatus::Cancelled,
        ));

        info!(
            event_name = "workflow.withdrawn",
            workflow_id = %workflow.id,
            "withdrawal recorded"
        );
        self.persist(workflow, now, "withdraw").await
    }

    /// Flags the workflow for out-of-band attention and forces urgent
    /// priority. Not terminal: `resume` returns it to the normal flow.
    pub async fn escalate(
        &self,
        id: &WorkflowId,
        escalation_reason: &str,
    ) -> Result<ApprovalWorkflow, EngineError> {
        let mut workflow = self.load(id, "escalate").await?;
        ensure_actionable(&workflow)?;

        let now = self.clock.now();
        let actor = Actor::system();
        workflow.status = WorkflowStatus::Escalated;
        workflow.priority = Priority::Urgent;
        workflow.workflow_history.push(history_entry(
            HistoryAction::Escalated,
            &actor,
            now,
            workflow.current_level,
            escalation_reason,
            Some(HistoryStatus::Pending),
            HistoryStatus::Escalated,
        ));

        info!(
            event_name = "workflow.escalated",
            workflow_id = %workflow.id,
            "escalation recorded"
        );
        self.persist(workflow, now, "escalate").await
    }

    /// Returns an escalated workflow to the pending flow at its current
    /// level. Priority stays where escalation put it.
    pub async fn resume(
        &self,
        id: &WorkflowId,
        reason: &str,
        actor: &Actor,
    ) -> Result<ApprovalWorkflow, EngineError> {
        let mut workflow = self.load(id, "resume").await?;
        if workflow.is_terminal() {
            return Err(EngineError::TerminalWorkflow { status: workflow.status });
        }
        if workflow.status != WorkflowStatus::Escalated {
            return Err(EngineError::Validation(
                "only escalated workflows can be resumed".to_string(),
            ));
        }

        let now = self.clock.now();
        workflow.status = WorkflowStatus::Pending;
        workflow.workflow_history.push(history_entry(
            HistoryAction::Resumed,
            actor,
            now,
            workflow.current_level,
            reason,
            Some(HistoryStatus::Escalated),
            HistoryStatus::Pending,
        ));

        info!(
            event_name = "workflow.resumed",
            workflow_id = %workflow.id,
            "resume recorded"
        );
        self.persist(workflow, now, "resume").await
    }

    pub async fn get(&self, id: &WorkflowId) -> Result<ApprovalWorkflow, EngineError> {
        self.load(id, "get").await
    }

    /// Workflows the user requested or is an approver on at any level, not
    /// just the current one: future approvers see what is heading their way.
    /// Ordered by submission time, newest first.
    pub async fn fetch_user_workflows(
        &self,
        user_id: &str,
        roles: &[String],
        status: Option<WorkflowStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<ApprovalWorkflow>, EngineError> {
        let listed = self
            .store
            .list(&WorkflowFilter { status, limit: None })
            .await
            .map_err(|source| EngineError::Store {
                operation: "list",
                target: user_id.to_string(),
                source,
            })?;

        let mut involved: Vec<ApprovalWorkflow> = listed
            .into_iter()
            .filter(|workflow| {
                workflow.requested_by == user_id
                    || workflow
                        .approval_levels
                        .iter()
                        .any(|level| self.policy.is_level_approver(level, user_id, roles))
            })
            .collect();

        if let Some(limit) = limit {
            involved.truncate(limit as usize);
        }
        Ok(involved)
    }

    pub fn is_current_approver(&self, workflow: &ApprovalWorkflow, actor: &Actor) -> bool {
        workflow
            .current_approver()
            .map(|level| self.policy.is_level_approver(level, &actor.user_id, &actor.roles))
            .unwrap_or(false)
    }

    pub fn can_delegate(&self, workflow: &ApprovalWorkflow, actor: &Actor) -> bool {
        workflow
            .current_approver()
            .map(|level| {
                level.can_delegate
                    && self.policy.is_level_approver(level, &actor.user_id, &actor.roles)
            })
            .unwrap_or(false)
    }

    async fn load(
        &self,
        id: &WorkflowId,
        operation: &'static str,
    ) -> Result<ApprovalWorkflow, EngineError> {
        self.store
            .get(id)
            .await
            .map_err(|source| EngineError::Store { operation, target: id.0.clone(), source })?
            .ok_or_else(|| EngineError::NotFound { workflow_id: id.0.clone() })
    }

    async fn persist(
        &self,
        mut workflow: ApprovalWorkflow,
        now: DateTime<Utc>,
        operation: &'static str,
    ) -> Result<ApprovalWorkflow, EngineError> {
        workflow.updated_at = now;
        let expected_version = workflow.version;
        workflow.version += 1;

        let outcome = self
            .store
            .update(&workflow, expected_version)
            .await
            .map_err(|source| EngineError::Store {
                operation,
                target: workflow.id.0.clone(),
                source,
            })?;

        match outcome {
            WriteOutcome::Updated => Ok(workflow),
            WriteOutcome::Conflict => {
                Err(EngineError::Conflict { workflow_id: workflow.id.0.clone() })
            }
        }
    }
}

fn history_entry(
    action: HistoryAction,
    actor: &Actor,
    performed_at: DateTime<Utc>,
    level: u32,
    comments: &str,
    previous_status: Option<HistoryStatus>,
    new_status: HistoryStatus,
) -> WorkflowHistoryEntry {
    WorkflowHistoryEntry {
        id: Uuid::new_v4().to_string(),
        action,
        performed_by: actor.user_id.clone(),
        performed_by_name: actor.display_name.clone(),
        performed_at,
        level,
        comments: comments.to_string(),
        previous_status,
        new_status,
    }
}

fn ensure_actionable(workflow: &ApprovalWorkflow) -> Result<(), EngineError> {
    if workflow.is_terminal() {
        return Err(EngineError::TerminalWorkflow { status: workflow.status });
    }
    if workflow.status == WorkflowStatus::Escalated {
        return Err(EngineError::Validation(
            "workflow is escalated and must be resumed before further action".to_string(),
        ));
    }
    Ok(())
}

fn require_text(value: &str, what: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Actor, DelegationRequest, EngineError, WorkflowEngine};
    use crate::clock::{Clock, FixedClock};
    use crate::domain::workflow::{
        HistoryAction, HistoryStatus, LevelStatus, Priority, WorkflowId, WorkflowStatus,
    };
    use crate::policy::RoleMatchPolicy;
    use crate::store::InMemoryWorkflowStore;
    use crate::templates::{leave_workflow, promotion_workflow, LeaveType};

    type TestEngine = WorkflowEngine<InMemoryWorkflowStore, FixedClock, RoleMatchPolicy>;

    fn engine() -> (TestEngine, FixedClock) {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let engine =
            WorkflowEngine::with_parts(InMemoryWorkflowStore::default(), clock.clone(), RoleMatchPolicy);
        (engine, clock)
    }

    fn staff() -> Actor {
        Actor::new("u-staff", "Aye Chan", vec!["staff".to_string()])
    }

    fn supervisor() -> Actor {
        Actor::new("u-super", "Khin Maung", vec!["immediate_supervisor".to_string()])
    }

    fn department_head() -> Actor {
        Actor::new("u-head", "Thiri Win", vec!["department_head".to_string()])
    }

    async fn submit_short_leave(engine: &TestEngine, clock: &FixedClock) -> WorkflowId {
        let draft =
            leave_workflow("REQ-100", "u-staff", "u-staff", LeaveType::Annual, 3, clock.now());
        engine.submit(draft, &staff()).await.expect("submit")
    }

    #[tokio::test]
    async fn submit_seeds_history_and_starts_at_level_one() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let workflow = engine.get(&id).await.expect("get");
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.current_level, 1);
        assert_eq!(workflow.version, 1);
        assert_eq!(workflow.workflow_history.len(), 1);

        let seeded = &workflow.workflow_history[0];
        assert_eq!(seeded.action, HistoryAction::Submitted);
        assert_eq!(seeded.level, 0);
        assert_eq!(seeded.previous_status, None);
        assert_eq!(seeded.new_status, HistoryStatus::Pending);
    }

    #[tokio::test]
    async fn two_level_leave_approves_end_to_end() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        clock.advance(Duration::hours(1));
        let after_first = engine.approve(&id, "supervisor sign-off", &supervisor()).await.expect("approve 1");
        assert_eq!(after_first.status, WorkflowStatus::Pending);
        assert_eq!(after_first.current_level, 2);
        assert_eq!(after_first.approval_levels[0].status, LevelStatus::Approved);
        assert_eq!(after_first.approval_levels[1].status, LevelStatus::Pending);
        assert_eq!(after_first.progress_percent(), 100);

        clock.advance(Duration::hours(1));
        let after_second =
            engine.approve(&id, "no staffing concerns", &department_head()).await.expect("approve 2");
        assert_eq!(after_second.status, WorkflowStatus::Approved);
        assert_eq!(after_second.current_level, 2);
        assert_eq!(after_second.completed_at, Some(clock.now()));
        assert_eq!(after_second.workflow_history.len(), 3);
        assert_eq!(after_second.workflow_history[2].new_status, HistoryStatus::Approved);
    }

    #[tokio::test]
    async fn approvals_never_advance_past_the_last_level() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let mut previous_level = 1;
        let first = engine.approve(&id, "ok", &supervisor()).await.expect("approve 1");
        assert!(first.current_level >= previous_level);
        previous_level = first.current_level;

        let second = engine.approve(&id, "ok", &department_head()).await.expect("approve 2");
        assert!(second.current_level >= previous_level);
        assert!(second.current_level <= second.total_levels);
    }

    #[tokio::test]
    async fn rejection_terminates_at_the_acting_level() {
        let (engine, clock) = engine();
        let draft = promotion_workflow("REQ-200", "u-head", "u-staff", 14, 15, clock.now());
        let id = engine.submit(draft, &department_head()).await.expect("submit");

        let rejected =
            engine.reject(&id, "insufficient tenure", &department_head()).await.expect("reject");
        assert_eq!(rejected.status, WorkflowStatus::Rejected);
        assert_eq!(rejected.current_level, 1);
        assert_eq!(rejected.total_levels, 3);
        assert!(rejected.completed_at.is_some());

        let level_one = &rejected.approval_levels[0];
        assert_eq!(level_one.status, LevelStatus::Rejected);
        assert_eq!(level_one.comments.as_deref(), Some("insufficient tenure"));
        assert_eq!(rejected.workflow_history.len(), 2);
        assert_eq!(rejected.workflow_history[1].new_status, HistoryStatus::Rejected);
    }

    #[tokio::test]
    async fn delegation_changes_the_approver_without_advancing() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let request = DelegationRequest {
            delegated_to: "u-deputy".to_string(),
            delegated_to_name: "Soe Moe".to_string(),
            reason: "on field duty this week".to_string(),
            is_temporary: true,
            expiry_date: Some(clock.now() + Duration::days(7)),
        };
        let delegated = engine.delegate(&id, request, &supervisor()).await.expect("delegate");

        assert_eq!(delegated.status, WorkflowStatus::Pending);
        assert_eq!(delegated.current_level, 1);

        let level = delegated.current_approver().expect("level 1");
        assert_eq!(level.status, LevelStatus::Delegated);
        assert_eq!(level.approver_id.as_deref(), Some("u-deputy"));
        let delegation = level.delegation.as_ref().expect("delegation info");
        assert!(delegation.is_active);
        assert_eq!(delegation.delegated_by, "u-super");

        assert_eq!(delegated.workflow_history.len(), 2);
        assert_eq!(delegated.workflow_history[1].action, HistoryAction::Delegated);
        assert_eq!(delegated.workflow_history[1].new_status, HistoryStatus::Delegated);

        // The delegate is now the effective current approver.
        let deputy = Actor::new("u-deputy", "Soe Moe", Vec::new());
        assert!(engine.is_current_approver(&delegated, &deputy));
    }

    #[tokio::test]
    async fn delegation_is_refused_when_the_level_forbids_it() {
        let (engine, clock) = engine();
        let draft =
            leave_workflow("REQ-300", "u-staff", "u-staff", LeaveType::Medical, 8, clock.now());
        let id = engine.submit(draft, &staff()).await.expect("submit");

        engine.approve(&id, "ok", &supervisor()).await.expect("approve 1");
        engine.approve(&id, "ok", &department_head()).await.expect("approve 2");

        // Level 3 is the HR gate with can_delegate = false.
        let request = DelegationRequest {
            delegated_to: "u-other".to_string(),
            delegated_to_name: "Other".to_string(),
            reason: "workload".to_string(),
            is_temporary: false,
            expiry_date: None,
        };
        let hr = Actor::new("u-hr", "HR Officer", vec!["hr_department".to_string()]);
        let error = engine.delegate(&id, request, &hr).await.expect_err("must refuse");
        assert!(matches!(error, EngineError::Validation(_)));

        let unchanged = engine.get(&id).await.expect("get");
        assert_eq!(unchanged.current_approver().expect("level 3").status, LevelStatus::Pending);
        assert_eq!(unchanged.workflow_history.len(), 3);
    }

    #[tokio::test]
    async fn withdraw_is_reserved_for_the_requester() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let error = engine
            .withdraw(&id, "changed my mind", &supervisor())
            .await
            .expect_err("non-requester must be refused");
        assert!(matches!(error, EngineError::Validation(_)));

        let withdrawn = engine.withdraw(&id, "changed my mind", &staff()).await.expect("withdraw");
        assert_eq!(withdrawn.status, WorkflowStatus::Cancelled);
        assert!(withdrawn.completed_at.is_some());
        assert_eq!(withdrawn.approval_levels[0].status, LevelStatus::Pending);
        assert_eq!(withdrawn.workflow_history.len(), 2);
        assert_eq!(withdrawn.workflow_history[1].action, HistoryAction::Withdrawn);
        assert_eq!(
            withdrawn.workflow_history[1].previous_status,
            Some(HistoryStatus::Pending)
        );
    }

    #[tokio::test]
    async fn escalate_then_resume_round_trips_to_pending() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let escalated = engine.escalate(&id, "deadline exceeded").await.expect("escalate");
        assert_eq!(escalated.status, WorkflowStatus::Escalated);
        assert_eq!(escalated.priority, Priority::Urgent);
        assert!(escalated.completed_at.is_none());
        assert_eq!(escalated.workflow_history[1].performed_by, "system");

        // Escalated workflows refuse level actions until resumed.
        let error = engine.approve(&id, "ok", &supervisor()).await.expect_err("must refuse");
        assert!(matches!(error, EngineError::Validation(_)));

        let resumed = engine.resume(&id, "supervisor reassigned", &staff()).await.expect("resume");
        assert_eq!(resumed.status, WorkflowStatus::Pending);
        assert_eq!(resumed.priority, Priority::Urgent);
        assert!(resumed.completed_at.is_none());

        let actions: Vec<HistoryAction> =
            resumed.workflow_history.iter().map(|entry| entry.action).collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Submitted, HistoryAction::Escalated, HistoryAction::Resumed]
        );
    }

    #[tokio::test]
    async fn terminal_workflows_refuse_every_mutator() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        engine.approve(&id, "ok", &supervisor()).await.expect("approve 1");
        engine.approve(&id, "ok", &department_head()).await.expect("approve 2");

        let approve_error = engine.approve(&id, "again", &supervisor()).await.expect_err("approve");
        assert!(matches!(approve_error, EngineError::TerminalWorkflow { .. }));

        let withdraw_error =
            engine.withdraw(&id, "too late", &staff()).await.expect_err("withdraw");
        assert!(matches!(withdraw_error, EngineError::TerminalWorkflow { .. }));

        let escalate_error = engine.escalate(&id, "stale").await.expect_err("escalate");
        assert!(matches!(escalate_error, EngineError::TerminalWorkflow { .. }));
    }

    #[tokio::test]
    async fn blank_comments_are_rejected_before_any_read() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        let error = engine.approve(&id, "   ", &supervisor()).await.expect_err("approve");
        assert!(matches!(error, EngineError::Validation(_)));

        let error = engine.reject(&id, "", &supervisor()).await.expect_err("reject");
        assert!(matches!(error, EngineError::Validation(_)));

        let unchanged = engine.get(&id).await.expect("get");
        assert_eq!(unchanged.workflow_history.len(), 1);
    }

    #[tokio::test]
    async fn missing_workflow_is_a_distinguishable_error() {
        let (engine, _clock) = engine();
        let missing = WorkflowId("wf-does-not-exist".to_string());

        let error = engine.approve(&missing, "ok", &supervisor()).await.expect_err("approve");
        assert_eq!(error, EngineError::NotFound { workflow_id: "wf-does-not-exist".to_string() });
    }

    #[tokio::test]
    async fn history_grows_by_exactly_one_entry_per_mutation() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;

        engine.escalate(&id, "overdue").await.expect("escalate");
        engine.resume(&id, "handled", &staff()).await.expect("resume");
        engine.approve(&id, "ok", &supervisor()).await.expect("approve 1");
        let done = engine.approve(&id, "ok", &department_head()).await.expect("approve 2");

        // submit + 4 mutations
        assert_eq!(done.workflow_history.len(), 5);
        for window in done.workflow_history.windows(2) {
            assert!(window[0].performed_at <= window[1].performed_at);
        }
    }

    #[tokio::test]
    async fn user_listing_includes_future_level_approvers() {
        let (engine, clock) = engine();

        let first = submit_short_leave(&engine, &clock).await;
        clock.advance(Duration::minutes(5));
        let draft =
            promotion_workflow("REQ-201", "u-head", "u-other", 10, 12, clock.now());
        engine.submit(draft, &department_head()).await.expect("submit promotion");

        // HR sits at level 2 of the promotion chain only.
        let hr_roles = vec!["hr_department".to_string()];
        let visible = engine
            .fetch_user_workflows("u-hr", &hr_roles, None, None)
            .await
            .expect("list for hr");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].request_id, "REQ-201");

        // The requester sees their own workflow regardless of role.
        let own = engine
            .fetch_user_workflows("u-staff", &[], None, None)
            .await
            .expect("list for staff");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, first);

        // Newest submissions come first for involved users.
        let head_roles = vec!["department_head".to_string()];
        let for_head = engine
            .fetch_user_workflows("u-head", &head_roles, None, None)
            .await
            .expect("list for head");
        assert_eq!(for_head.len(), 2);
        assert_eq!(for_head[0].request_id, "REQ-201");

        // Status filter narrows the listing.
        engine.reject(&first, "coverage gap", &supervisor()).await.expect("reject");
        let pending_only = engine
            .fetch_user_workflows("u-head", &head_roles, Some(WorkflowStatus::Pending), None)
            .await
            .expect("list pending");
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].request_id, "REQ-201");
    }

    #[tokio::test]
    async fn approver_checks_compose_policy_and_level_flags() {
        let (engine, clock) = engine();
        let id = submit_short_leave(&engine, &clock).await;
        let workflow = engine.get(&id).await.expect("get");

        assert!(engine.is_current_approver(&workflow, &supervisor()));
        assert!(engine.can_delegate(&workflow, &supervisor()));
        assert!(!engine.is_current_approver(&workflow, &department_head()));
        assert!(!engine.can_delegate(&workflow, &department_head()));
    }
}
