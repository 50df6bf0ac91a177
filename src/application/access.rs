use serde::{Deserialize, Serialize};

use crate::domain::{CompanyId, Employee, Role, UserId};

/// The authenticated caller. Resolved and verified before any lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, company_id: CompanyId, role: Role) -> Self {
        Self {
            user_id,
            company_id,
            role,
        }
    }
}

impl From<&Employee> for Principal {
    fn from(employee: &Employee) -> Self {
        Self::new(employee.id, employee.company_id, employee.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ApplyLeave,
    ApproveLeave,
    RejectLeave,
    CancelLeave,
    ViewDashboard,
    ViewReports,
    ManageEmployees,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ApplyLeave => "apply leave",
            Permission::ApproveLeave => "approve leave",
            Permission::RejectLeave => "reject leave",
            Permission::CancelLeave => "cancel leave",
            Permission::ViewDashboard => "view dashboard",
            Permission::ViewReports => "view reports",
            Permission::ManageEmployees => "manage employees",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Answers "may this principal perform this action?".
///
/// The lifecycle service asks once per operation and never looks at roles itself.
pub trait PermissionPolicy: Send + Sync {
    fn allows(&self, principal: &Principal, permission: Permission) -> bool;
}

/// Static role-to-permission table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePermissions;

impl PermissionPolicy for RolePermissions {
    fn allows(&self, principal: &Principal, permission: Permission) -> bool {
        use Permission::*;

        match principal.role {
            Role::Admin => true,
            Role::Manager => matches!(
                permission,
                ApproveLeave | RejectLeave | ViewDashboard | ViewReports
            ),
            Role::Employee => matches!(permission, ApplyLeave | CancelLeave),
        }
    }
}

/// Grants everything. Useful when authorization happens upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionPolicy for AllowAll {
    fn allows(&self, _principal: &Principal, _permission: Permission) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn principal(role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), Uuid::new_v4(), role)
    }

    #[test]
    fn test_admin_has_every_permission() {
        let admin = principal(Role::Admin);
        for permission in [
            Permission::ApplyLeave,
            Permission::ApproveLeave,
            Permission::RejectLeave,
            Permission::CancelLeave,
            Permission::ViewDashboard,
            Permission::ViewReports,
            Permission::ManageEmployees,
        ] {
            assert!(RolePermissions.allows(&admin, permission));
        }
    }

    #[test]
    fn test_employee_only_manages_own_requests() {
        let employee = principal(Role::Employee);
        assert!(RolePermissions.allows(&employee, Permission::ApplyLeave));
        assert!(RolePermissions.allows(&employee, Permission::CancelLeave));
        assert!(!RolePermissions.allows(&employee, Permission::ApproveLeave));
        assert!(!RolePermissions.allows(&employee, Permission::ViewDashboard));
    }

    #[test]
    fn test_manager_processes_but_does_not_apply() {
        let manager = principal(Role::Manager);
        assert!(RolePermissions.allows(&manager, Permission::ApproveLeave));
        assert!(RolePermissions.allows(&manager, Permission::RejectLeave));
        assert!(!RolePermissions.allows(&manager, Permission::ApplyLeave));
        assert!(!RolePermissions.allows(&manager, Permission::ManageEmployees));
    }
}
