use crate::domain::workflow::ApprovalLevel;

/// Decides whether a user may act at a given approval level. Injected so a
/// deployment can swap in a real role-resolution service.
pub trait ApproverPolicy: Send + Sync {
    fn is_level_approver(&self, level: &ApprovalLevel, user_id: &str, roles: &[String]) -> bool;
}

/// Default policy: exact approver id match (covers delegates, whose id is
/// written into the level), falling back to role-class membership. Any holder
/// of the named role may act, not just one assigned individual.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoleMatchPolicy;

impl ApproverPolicy for RoleMatchPolicy {
    fn is_level_approver(&self, level: &ApprovalLevel, user_id: &str, roles: &[String]) -> bool {
        if level.approver_id.as_deref() == Some(user_id) {
            return true;
        }

        let level_role = normalize_key(&level.approver_role);
        roles.iter().any(|role| normalize_key(role) == level_role)
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
