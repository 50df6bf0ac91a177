use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CompanyId, Days};

pub type UserId = Uuid;

/// Annual allotment given to new employees when none is specified.
pub const DEFAULT_LEAVE_ALLOTMENT: Days = 20;

/// Department assigned to new employees when none is specified.
pub const DEFAULT_DEPARTMENT: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control over the company's leave workflow
    Admin,
    /// Processes requests and reads reports, but does not administer the tenant
    Manager,
    /// Applies for and cancels their own leave
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A member of a company, together with their leave allotment.
///
/// `used_leave` is only ever changed through [`super::reserve`] and
/// [`super::release`]; `version` is bumped by the repository on every
/// balance write and guards against lost updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: UserId,
    pub company_id: CompanyId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    pub total_leave_balance: Days,
    pub used_leave: Days,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        company_id: CompanyId,
        full_name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            full_name: full_name.into(),
            email: email.into().trim().to_lowercase(),
            role,
            department: DEFAULT_DEPARTMENT.to_string(),
            total_leave_balance: DEFAULT_LEAVE_ALLOTMENT,
            used_leave: 0,
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn with_allotment(mut self, total_leave_balance: Days) -> Self {
        self.total_leave_balance = total_leave_balance;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Days still available to be approved.
    pub fn remaining_leave(&self) -> Days {
        self.total_leave_balance - self.used_leave
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Admin, Role::Manager, Role::Employee] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_str("owner"), None);
    }

    #[test]
    fn test_new_employee_defaults() {
        let employee = Employee::new(Uuid::new_v4(), "Ada Lovelace", " Ada@Example.com ", Role::Employee);

        assert_eq!(employee.email, "ada@example.com");
        assert_eq!(employee.department, "General");
        assert_eq!(employee.total_leave_balance, 20);
        assert_eq!(employee.used_leave, 0);
        assert_eq!(employee.remaining_leave(), 20);
    }
}
