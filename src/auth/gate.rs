//! Privileged action gate.
//!
//! Every mutating admin endpoint funnels through two checks here before it
//! touches the database: a flat role/permission check, and for sensitive
//! actions an additional step-up freshness check. The audit half of the gate
//! lives in `services::audit` and runs inside the mutation's transaction.

use chrono::{DateTime, Utc};

use crate::auth::rbac::{Permission, Role};
use crate::error::ApiError;

/// Grant if any held role includes the requested permission.
pub fn authorize(roles: &[Role], permission: Permission) -> Result<(), ApiError> {
    if roles.iter().any(|role| role.grants(permission)) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Insufficient permissions"))
    }
}

/// Sensitive actions need credentials re-proved within a recent window.
/// `step_up_until` comes from the token's `step_up_exp` claim; absence or
/// expiry rejects the action even when the base permission check passes.
pub fn require_step_up(
    step_up_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    match step_up_until {
        Some(until) if until > now => Ok(()),
        _ => Err(ApiError::step_up_required(
            "This action requires recent re-authentication",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn any_matching_role_grants() {
        let roles = vec![Role::Viewer, Role::Billing];
        assert!(authorize(&roles, Permission::TokenGrant).is_ok());
        assert!(authorize(&roles, Permission::StaffManage).is_err());
    }

    #[test]
    fn empty_role_set_grants_nothing() {
        for permission in Permission::ALL {
            assert!(authorize(&[], permission).is_err());
        }
    }

    #[test]
    fn denial_is_forbidden_not_unauthorized() {
        let err = authorize(&[Role::Viewer], Permission::UserSuspend).unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[test]
    fn step_up_rejected_without_proof() {
        let now = Utc::now();
        let err = require_step_up(None, now).unwrap_err();
        assert_eq!(err.error_code(), "STEP_UP_REQUIRED");
    }

    #[test]
    fn step_up_rejected_after_window() {
        let now = Utc::now();
        let stale = Some(now - Duration::seconds(1));
        assert!(require_step_up(stale, now).is_err());
    }

    #[test]
    fn step_up_accepted_inside_window() {
        let now = Utc::now();
        let fresh = Some(now + Duration::minutes(5));
        assert!(require_step_up(fresh, now).is_ok());
    }

    #[test]
    fn permission_alone_does_not_satisfy_step_up() {
        // An owner with every permission still needs fresh credentials.
        let roles = vec![Role::Owner];
        assert!(authorize(&roles, Permission::TokenGrant).is_ok());
        assert!(require_step_up(None, Utc::now()).is_err());
    }
}
