use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::workflow::{ApprovalWorkflow, WorkflowId, WorkflowStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored document could not be decoded: {0}")]
    Decode(String),
}

/// Result of a conditional write. `Conflict` means another writer committed
/// between this caller's read and write; nothing was persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated,
    Conflict,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    pub limit: Option<u32>,
}

/// Document-store contract for workflow aggregates.
///
/// `create` assigns the id (any caller-supplied id is replaced) and persists
/// the document at version 1. `update` replaces the full document only when
/// the stored version equals `expected_version`; the caller passes the
/// document with its version already bumped past `expected_version`. `list`
/// returns documents ordered by `submitted_at` descending.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, workflow: ApprovalWorkflow) -> Result<WorkflowId, StoreError>;
    async fn get(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError>;
    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: i64,
    ) -> Result<WriteOutcome, StoreError>;
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<ApprovalWorkflow>, StoreError>;
}

/// Map-backed store for tests and in-process embedding.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, ApprovalWorkflow>>,
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, mut workflow: ApprovalWorkflow) -> Result<WorkflowId, StoreError> {
        let id = WorkflowId(Uuid::new_v4().to_string());
        workflow.id = id.clone();
        workflow.version = 1;

        let mut workflows = self.workflows.write().await;
        workflows.insert(id.0.clone(), workflow);
        Ok(id)
    }

    async fn get(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: i64,
    ) -> Result<WriteOutcome, StoreError> {
        let mut workflows = self.workflows.write().await;
        let stored_version = workflows.get(&workflow.id.0).map(|stored| stored.version);
        match stored_version {
            Some(version) if version == expected_version => {
                workflows.insert(workflow.id.0.clone(), workflow.clone());
                Ok(WriteOutcome::Updated)
            }
            Some(_) => Ok(WriteOutcome::Conflict),
            None => Err(StoreError::Backend(format!(
                "workflow `{}` disappeared during update",
                workflow.id.0
            ))),
        }
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        let workflows = self.workflows.read().await;
        let mut listed: Vec<ApprovalWorkflow> = workflows
            .values()
            .filter(|workflow| filter.status.map_or(true, |status| status == workflow.status))
            .cloned()
            .collect();
        listed.sort_by(|left, right| right.submitted_at.cmp(&left.submitted_at));

        if let Some(limit) = filter.limit {
            listed.truncate(limit as usize);
        }
        Ok(listed)
    }
}
