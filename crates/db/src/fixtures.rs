use chrono::{Duration, TimeZone, Utc};
use thiserror::Error;

use hrflow_core::clock::{Clock, FixedClock};
use hrflow_core::engine::{Actor, EngineError, WorkflowEngine};
use hrflow_core::policy::RoleMatchPolicy;
use hrflow_core::templates::{leave_workflow, promotion_workflow, transfer_workflow, LeaveType};

use crate::repositories::SqlWorkflowStore;
use crate::DbPool;

/// Deterministic demo workflows covering the three request chains: a leave
/// request awaiting its first approval, a promotion mid-flight at level 2,
/// and a rejected transfer. Timestamps come from a fixed clock so repeated
/// seeds differ only in store-assigned ids.
pub struct DemoSeedDataset;

const SEED_REQUEST_IDS: &[&str] = &["REQ-DEMO-LEAVE", "REQ-DEMO-PROMOTION", "REQ-DEMO-TRANSFER"];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Clone, Debug)]
pub struct WorkflowSeedInfo {
    pub request_id: &'static str,
    pub request_type: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub workflows_seeded: Vec<WorkflowSeedInfo>,
}

#[derive(Clone, Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl DemoSeedDataset {
    /// Replaces any previous demo rows, then replays the scenarios through
    /// the engine so documents carry real history ledgers.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, SeedError> {
        for request_id in SEED_REQUEST_IDS {
            sqlx::query("DELETE FROM approval_workflow WHERE request_id = ?")
                .bind(request_id)
                .execute(pool)
                .await?;
        }

        let clock = FixedClock::at(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_else(Utc::now),
        );
        let engine = WorkflowEngine::with_parts(
            SqlWorkflowStore::new(pool.clone()),
            clock.clone(),
            RoleMatchPolicy,
        );

        let staff = Actor::new("u-demo-staff", "Aye Chan", vec!["staff".to_string()]);
        let head =
            Actor::new("u-demo-head", "Thiri Win", vec!["department_head".to_string()]);

        let leave_draft = leave_workflow(
            "REQ-DEMO-LEAVE",
            "u-demo-staff",
            "u-demo-staff",
            LeaveType::Annual,
            3,
            clock.now(),
        );
        engine.submit(leave_draft, &staff).await?;

        clock.advance(Duration::minutes(15));
        let promotion_draft = promotion_workflow(
            "REQ-DEMO-PROMOTION",
            "u-demo-head",
            "u-demo-staff",
            12,
            13,
            clock.now(),
        );
        let promotion_id = engine.submit(promotion_draft, &head).await?;
        clock.advance(Duration::hours(4));
        engine.approve(&promotion_id, "strong performance record", &head).await?;

        clock.advance(Duration::minutes(15));
        let transfer_draft = transfer_workflow(
            "REQ-DEMO-TRANSFER",
            "u-demo-staff",
            "u-demo-staff",
            "Finance",
            "Planning",
            clock.now(),
        );
        let transfer_id = engine.submit(transfer_draft, &staff).await?;
        clock.advance(Duration::hours(1));
        engine.reject(&transfer_id, "position already filled", &head).await?;

        Ok(SeedResult {
            workflows_seeded: vec![
                WorkflowSeedInfo {
                    request_id: "REQ-DEMO-LEAVE",
                    request_type: "leave",
                    status: "pending",
                    description: "3-day annual leave awaiting supervisor",
                },
                WorkflowSeedInfo {
                    request_id: "REQ-DEMO-PROMOTION",
                    request_type: "promotion",
                    status: "pending",
                    description: "grade 12 to 13 promotion at HR review",
                },
                WorkflowSeedInfo {
                    request_id: "REQ-DEMO-TRANSFER",
                    request_type: "transfer",
                    status: "rejected",
                    description: "Finance to Planning transfer rejected at level 1",
                },
            ],
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, SeedError> {
        let mut checks = Vec::new();

        checks.push((
            "leave-pending-level-1",
            seed_state(pool, "REQ-DEMO-LEAVE").await? == Some(("pending".to_string(), 1)),
        ));
        checks.push((
            "promotion-pending-level-2",
            seed_state(pool, "REQ-DEMO-PROMOTION").await? == Some(("pending".to_string(), 2)),
        ));
        checks.push((
            "transfer-rejected-level-1",
            seed_state(pool, "REQ-DEMO-TRANSFER").await? == Some(("rejected".to_string(), 1)),
        ));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(SeedVerification { all_present, checks })
    }
}

async fn seed_state(pool: &DbPool, request_id: &str) -> Result<Option<(String, i64)>, SeedError> {
    let row: Option<(String, i64)> = sqlx::query_as(
        "SELECT status, current_level FROM approval_workflow WHERE request_id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::DemoSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies_all_scenarios() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let result = DemoSeedDataset::load(&pool).await.expect("seed");
        assert_eq!(result.workflows_seeded.len(), 3);

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);
    }

    #[tokio::test]
    async fn seed_is_idempotent_across_runs() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        DemoSeedDataset::load(&pool).await.expect("first seed");
        DemoSeedDataset::load(&pool).await.expect("second seed");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM approval_workflow")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count.0, 3);
    }
}
