//! Fixed role and permission model.
//!
//! Six staff roles, ordered by increasing privilege, each mapping to a static
//! permission set. The mapping is a flat capability table: no per-resource
//! ownership rules, no dynamic lookups. Role membership is resolved from the
//! database on every request, so grants and revocations apply on the next
//! permission check.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Support,
    Ops,
    Billing,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Viewer,
        Role::Support,
        Role::Ops,
        Role::Billing,
        Role::Admin,
        Role::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Support => "support",
            Role::Ops => "ops",
            Role::Billing => "billing",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// The static permission set implied by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;

        const VIEWER: &[Permission] = &[
            DashboardView,
            UserView,
            TokenView,
            ActivityView,
            ContentView,
            SystemView,
        ];
        const SUPPORT: &[Permission] = &[
            DashboardView,
            UserView,
            TokenView,
            ActivityView,
            ContentView,
            SystemView,
            UserSuspend,
        ];
        const OPS: &[Permission] = &[
            DashboardView,
            UserView,
            TokenView,
            ActivityView,
            ContentView,
            SystemView,
            UserSuspend,
            JobControl,
        ];
        const BILLING: &[Permission] = &[
            DashboardView,
            UserView,
            TokenView,
            ActivityView,
            ContentView,
            SystemView,
            TokenGrant,
        ];
        const FULL: &[Permission] = &[
            DashboardView,
            UserView,
            TokenView,
            ActivityView,
            ContentView,
            SystemView,
            UserSuspend,
            JobControl,
            TokenGrant,
            UserImpersonate,
            AuditView,
            SystemConfigure,
            StaffManage,
            ApiKeyManage,
        ];

        match self {
            Role::Viewer => VIEWER,
            Role::Support => SUPPORT,
            Role::Ops => OPS,
            Role::Billing => BILLING,
            Role::Admin => FULL,
            Role::Owner => FULL,
        }
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "support" => Ok(Role::Support),
            "ops" => Ok(Role::Ops),
            "billing" => Ok(Role::Billing),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

/// Parse role names from the database, dropping anything unrecognized.
/// Unknown names grant nothing rather than failing the whole request.
pub fn parse_roles<I, S>(names: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|n| n.as_ref().parse().ok())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    DashboardView,
    UserView,
    UserSuspend,
    UserImpersonate,
    TokenView,
    TokenGrant,
    ActivityView,
    AuditView,
    ContentView,
    SystemView,
    SystemConfigure,
    JobControl,
    StaffManage,
    ApiKeyManage,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Permission::DashboardView,
        Permission::UserView,
        Permission::UserSuspend,
        Permission::UserImpersonate,
        Permission::TokenView,
        Permission::TokenGrant,
        Permission::ActivityView,
        Permission::AuditView,
        Permission::ContentView,
        Permission::SystemView,
        Permission::SystemConfigure,
        Permission::JobControl,
        Permission::StaffManage,
        Permission::ApiKeyManage,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use Permission::*;

    // The exact matrix from the dashboard documentation. Any drift between
    // this table and Role::permissions is a bug in one of the two.
    fn expected(role: Role, permission: Permission) -> bool {
        let read_only = matches!(
            permission,
            DashboardView | UserView | TokenView | ActivityView | ContentView | SystemView
        );
        match role {
            Role::Viewer => read_only,
            Role::Support => read_only || permission == UserSuspend,
            Role::Ops => read_only || matches!(permission, UserSuspend | JobControl),
            Role::Billing => read_only || permission == TokenGrant,
            Role::Admin | Role::Owner => true,
        }
    }

    #[test]
    fn matrix_is_exact_for_all_roles() {
        for role in Role::ALL {
            for permission in Permission::ALL {
                assert_eq!(
                    role.grants(permission),
                    expected(role, permission),
                    "role {:?} / permission {:?}",
                    role,
                    permission
                );
            }
        }
    }

    #[test]
    fn permission_sets_have_no_duplicates() {
        for role in Role::ALL {
            let set = role.permissions();
            for (i, p) in set.iter().enumerate() {
                assert!(!set[i + 1..].contains(p), "{:?} duplicated for {:?}", p, role);
            }
        }
    }

    #[test]
    fn role_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn parse_roles_skips_unknown_names() {
        let roles = parse_roles(["support", "bogus", "owner"]);
        assert_eq!(roles, vec![Role::Support, Role::Owner]);
    }

    #[test]
    fn support_can_suspend_users() {
        assert!(Role::Support.grants(UserSuspend));
        assert!(!Role::Support.grants(TokenGrant));
        assert!(!Role::Viewer.grants(UserSuspend));
    }
}
