use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use hrflow_core::domain::workflow::{
    ApprovalWorkflow, Priority, RequestType, WorkflowId, WorkflowStatus,
};
use hrflow_core::store::{StoreError, WorkflowFilter, WorkflowStore, WriteOutcome};

use crate::DbPool;

/// Document store over a single `approval_workflow` table. Array fields are
/// JSON text replaced wholesale on every write; updates are conditioned on
/// the version column.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

pub fn status_as_str(status: &WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Pending => "pending",
        WorkflowStatus::Approved => "approved",
        WorkflowStatus::Rejected => "rejected",
        WorkflowStatus::Cancelled => "cancelled",
        WorkflowStatus::Escalated => "escalated",
    }
}

fn parse_status(raw: &str) -> Result<WorkflowStatus, StoreError> {
    match raw {
        "pending" => Ok(WorkflowStatus::Pending),
        "approved" => Ok(WorkflowStatus::Approved),
        "rejected" => Ok(WorkflowStatus::Rejected),
        "cancelled" => Ok(WorkflowStatus::Cancelled),
        "escalated" => Ok(WorkflowStatus::Escalated),
        other => Err(decode(format!("unknown workflow status `{other}`"))),
    }
}

fn priority_as_str(priority: &Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn parse_priority(raw: &str) -> Result<Priority, StoreError> {
    match raw {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "urgent" => Ok(Priority::Urgent),
        other => Err(decode(format!("unknown priority `{other}`"))),
    }
}

fn request_type_as_str(request_type: &RequestType) -> &'static str {
    match request_type {
        RequestType::Leave => "leave",
        RequestType::Promotion => "promotion",
        RequestType::Transfer => "transfer",
        RequestType::Training => "training",
        RequestType::Disciplinary => "disciplinary",
        RequestType::Expense => "expense",
    }
}

fn parse_request_type(raw: &str) -> Result<RequestType, StoreError> {
    match raw {
        "leave" => Ok(RequestType::Leave),
        "promotion" => Ok(RequestType::Promotion),
        "transfer" => Ok(RequestType::Transfer),
        "training" => Ok(RequestType::Training),
        "disciplinary" => Ok(RequestType::Disciplinary),
        "expense" => Ok(RequestType::Expense),
        other => Err(decode(format!("unknown request type `{other}`"))),
    }
}

fn parse_datetime(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode(format!("invalid timestamp in `{column}`: {error}")))
}

fn parse_optional_datetime(
    raw: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|value| parse_datetime(&value, column)).transpose()
}

fn get_column<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|error| decode(format!("column `{column}`: {error}")))
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalWorkflow, StoreError> {
    let status_str: String = get_column(row, "status")?;
    let priority_str: String = get_column(row, "priority")?;
    let request_type_str: String = get_column(row, "request_type")?;

    let approval_levels_json: String = get_column(row, "approval_levels")?;
    let workflow_history_json: String = get_column(row, "workflow_history")?;
    let attachments_json: String = get_column(row, "attachments")?;

    let submitted_at_str: String = get_column(row, "submitted_at")?;
    let deadline_str: Option<String> = get_column(row, "deadline")?;
    let completed_at_str: Option<String> = get_column(row, "completed_at")?;
    let created_at_str: String = get_column(row, "created_at")?;
    let updated_at_str: String = get_column(row, "updated_at")?;

    Ok(ApprovalWorkflow {
        id: WorkflowId(get_column::<String>(row, "id")?),
        request_id: get_column(row, "request_id")?,
        request_type: parse_request_type(&request_type_str)?,
        request_title: get_column(row, "request_title")?,
        requested_by: get_column(row, "requested_by")?,
        requested_for: get_column(row, "requested_for")?,
        current_level: get_column::<i64>(row, "current_level")? as u32,
        total_levels: get_column::<i64>(row, "total_levels")? as u32,
        status: parse_status(&status_str)?,
        priority: parse_priority(&priority_str)?,
        approval_levels: serde_json::from_str(&approval_levels_json)
            .map_err(|error| decode(format!("approval_levels payload: {error}")))?,
        workflow_history: serde_json::from_str(&workflow_history_json)
            .map_err(|error| decode(format!("workflow_history payload: {error}")))?,
        attachments: serde_json::from_str(&attachments_json)
            .map_err(|error| decode(format!("attachments payload: {error}")))?,
        submitted_at: parse_datetime(&submitted_at_str, "submitted_at")?,
        deadline: parse_optional_datetime(deadline_str, "deadline")?,
        completed_at: parse_optional_datetime(completed_at_str, "completed_at")?,
        version: get_column(row, "version")?,
        created_at: parse_datetime(&created_at_str, "created_at")?,
        updated_at: parse_datetime(&updated_at_str, "updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, request_id, request_type, request_title, requested_by,
            requested_for, current_level, total_levels, status, priority,
            approval_levels, workflow_history, attachments, submitted_at,
            deadline, completed_at, version, created_at, updated_at";

#[async_trait::async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn create(&self, mut workflow: ApprovalWorkflow) -> Result<WorkflowId, StoreError> {
        let id = WorkflowId(Uuid::new_v4().to_string());
        workflow.id = id.clone();
        workflow.version = 1;

        let approval_levels = serde_json::to_string(&workflow.approval_levels)
            .map_err(|error| decode(format!("approval_levels payload: {error}")))?;
        let workflow_history = serde_json::to_string(&workflow.workflow_history)
            .map_err(|error| decode(format!("workflow_history payload: {error}")))?;
        let attachments = serde_json::to_string(&workflow.attachments)
            .map_err(|error| decode(format!("attachments payload: {error}")))?;

        sqlx::query(
            "INSERT INTO approval_workflow (id, request_id, request_type, request_title,
                                            requested_by, requested_for, current_level,
                                            total_levels, status, priority, approval_levels,
                                            workflow_history, attachments, submitted_at,
                                            deadline, completed_at, version, created_at,
                                            updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.request_id)
        .bind(request_type_as_str(&workflow.request_type))
        .bind(&workflow.request_title)
        .bind(&workflow.requested_by)
        .bind(&workflow.requested_for)
        .bind(workflow.current_level as i64)
        .bind(workflow.total_levels as i64)
        .bind(status_as_str(&workflow.status))
        .bind(priority_as_str(&workflow.priority))
        .bind(&approval_levels)
        .bind(&workflow_history)
        .bind(&attachments)
        .bind(workflow.submitted_at.to_rfc3339())
        .bind(workflow.deadline.map(|dt| dt.to_rfc3339()))
        .bind(workflow.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(workflow.version)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(id)
    }

    async fn get(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM approval_workflow WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(ref row) => Ok(Some(row_to_workflow(row)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: i64,
    ) -> Result<WriteOutcome, StoreError> {
        let approval_levels = serde_json::to_string(&workflow.approval_levels)
            .map_err(|error| decode(format!("approval_levels payload: {error}")))?;
        let workflow_history = serde_json::to_string(&workflow.workflow_history)
            .map_err(|error| decode(format!("workflow_history payload: {error}")))?;
        let attachments = serde_json::to_string(&workflow.attachments)
            .map_err(|error| decode(format!("attachments payload: {error}")))?;

        let result = sqlx::query(
            "UPDATE approval_workflow
             SET current_level = ?, status = ?, priority = ?, approval_levels = ?,
                 workflow_history = ?, attachments = ?, deadline = ?, completed_at = ?,
                 version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(workflow.current_level as i64)
        .bind(status_as_str(&workflow.status))
        .bind(priority_as_str(&workflow.priority))
        .bind(&approval_levels)
        .bind(&workflow_history)
        .bind(&attachments)
        .bind(workflow.deadline.map(|dt| dt.to_rfc3339()))
        .bind(workflow.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(workflow.version)
        .bind(workflow.updated_at.to_rfc3339())
        .bind(&workflow.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Updated);
        }

        let exists = sqlx::query("SELECT 1 FROM approval_workflow WHERE id = ?")
            .bind(&workflow.id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match exists {
            Some(_) => Ok(WriteOutcome::Conflict),
            None => Err(StoreError::Backend(format!(
                "workflow `{}` disappeared during update",
                workflow.id.0
            ))),
        }
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        // SQLite treats LIMIT -1 as unbounded.
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(status) = &filter.status {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM approval_workflow
                 WHERE status = ?
                 ORDER BY submitted_at DESC
                 LIMIT ?"
            ))
            .bind(status_as_str(status))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        } else {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM approval_workflow
                 ORDER BY submitted_at DESC
                 LIMIT ?"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        };

        rows.iter().map(row_to_workflow).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use hrflow_core::domain::workflow::{
        ApprovalWorkflow, DelegationInfo, LevelStatus, WorkflowStatus,
    };
    use hrflow_core::store::{WorkflowFilter, WorkflowStore, WriteOutcome};
    use hrflow_core::templates::{leave_workflow, transfer_workflow, LeaveType};

    use super::SqlWorkflowStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_workflow(minute_offset: i64) -> ApprovalWorkflow {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
            + Duration::minutes(minute_offset);
        let draft = leave_workflow("REQ-1", "u-staff", "u-staff", LeaveType::Medical, 8, now);
        ApprovalWorkflow::from_draft(draft, now)
    }

    #[tokio::test]
    async fn create_and_get_round_trips_the_full_document() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);

        let mut workflow = sample_workflow(0);
        workflow.attachments.push("doc://medical-certificate".to_string());

        let id = store.create(workflow.clone()).await.expect("create");
        let found = store.get(&id).await.expect("get").expect("should exist");

        workflow.id = id;
        workflow.version = 1;
        assert_eq!(found, workflow);
    }

    #[tokio::test]
    async fn update_persists_level_mutations_and_delegation() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);

        let id = store.create(sample_workflow(0)).await.expect("create");
        let mut workflow = store.get(&id).await.expect("get").expect("exists");

        let now = workflow.submitted_at + Duration::hours(2);
        {
            let level = workflow.current_approver_mut().expect("level 1");
            level.status = LevelStatus::Delegated;
            level.approver_id = Some("u-deputy".to_string());
            level.delegation = Some(DelegationInfo {
                delegated_to: "u-deputy".to_string(),
                delegated_to_name: "Soe Moe".to_string(),
                delegated_by: "u-super".to_string(),
                delegation_date: now,
                reason: "annual inspection tour".to_string(),
                is_temporary: true,
                expiry_date: Some(now + Duration::days(5)),
                is_active: true,
            });
        }
        workflow.updated_at = now;
        workflow.version = 2;

        let outcome = store.update(&workflow, 1).await.expect("update");
        assert_eq!(outcome, WriteOutcome::Updated);

        let found = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(found, workflow);
        let delegation =
            found.approval_levels[0].delegation.as_ref().expect("delegation round-trips");
        assert_eq!(delegation.delegated_to, "u-deputy");
        assert!(delegation.is_active);
    }

    #[tokio::test]
    async fn stale_version_update_reports_conflict() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);

        let id = store.create(sample_workflow(0)).await.expect("create");
        let fresh = store.get(&id).await.expect("get").expect("exists");

        let mut first = fresh.clone();
        first.status = WorkflowStatus::Escalated;
        first.version = 2;
        assert_eq!(store.update(&first, 1).await.expect("first write"), WriteOutcome::Updated);

        let mut second = fresh;
        second.status = WorkflowStatus::Cancelled;
        second.version = 2;
        assert_eq!(store.update(&second, 1).await.expect("second write"), WriteOutcome::Conflict);

        let stored = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(stored.status, WorkflowStatus::Escalated);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_filters_by_status() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);

        store.create(sample_workflow(0)).await.expect("create oldest");
        let newest = {
            let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
            let draft = transfer_workflow("REQ-2", "u-staff", "u-staff", "Finance", "Planning", now);
            ApprovalWorkflow::from_draft(draft, now)
        };
        let newest_id = store.create(newest).await.expect("create newest");

        let listed = store.list(&WorkflowFilter::default()).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newest_id);

        let mut cancelled = store.get(&newest_id).await.expect("get").expect("exists");
        cancelled.status = WorkflowStatus::Cancelled;
        cancelled.version = 2;
        store.update(&cancelled, 1).await.expect("update");

        let pending = store
            .list(&WorkflowFilter { status: Some(WorkflowStatus::Pending), limit: None })
            .await
            .expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, "REQ-1");

        let limited = store
            .list(&WorkflowFilter { status: None, limit: Some(1) })
            .await
            .expect("list limited");
        assert_eq!(limited.len(), 1);
    }
}
