use anyhow::{Context, Result};
use sqlx::{Row, Sqlite, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Company, CompanyId, Employee, LeaveId, LeaveRequest, Notification, Role, UserId};

use super::AuditEntry;
use super::repository::{
    DATE_FORMAT, EMPLOYEE_COLUMNS, LEAVE_COLUMNS, row_to_employee, row_to_leave,
};

/// Raised when a guarded write lost a race with another writer.
///
/// Carried inside `anyhow::Error`; see [`is_conflict`].
#[derive(Error, Debug)]
#[error("{entity} {id} was modified concurrently")]
pub struct StaleWrite {
    pub entity: &'static str,
    pub id: Uuid,
}

/// True if the error chain contains a lost-update or a SQLite busy/locked error.
/// Both mean "nothing was written, safe to retry".
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if cause.downcast_ref::<StaleWrite>().is_some() {
            return true;
        }
        match cause.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            _ => false,
        }
    })
}

/// A single database transaction spanning every read and write of one lifecycle step.
///
/// Committing is explicit. If the value is dropped first (error, early return,
/// or the owning future being cancelled) sqlx rolls the transaction back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(super) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }

    // ========================
    // Tenant administration
    // ========================

    pub async fn insert_company(&mut self, company: &Company) -> Result<()> {
        sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?, ?, ?)")
            .bind(company.id.to_string())
            .bind(&company.name)
            .bind(company.created_at.to_rfc3339())
            .execute(&mut *self.tx)
            .await
            .context("Failed to save company")?;
        Ok(())
    }

    pub async fn insert_employee(&mut self, employee: &Employee) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, company_id, full_name, email, role, department, total_leave_balance, used_leave, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee.id.to_string())
        .bind(employee.company_id.to_string())
        .bind(&employee.full_name)
        .bind(&employee.email)
        .bind(employee.role.as_str())
        .bind(&employee.department)
        .bind(employee.total_leave_balance)
        .bind(employee.used_leave)
        .bind(employee.version)
        .bind(employee.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save employee")?;
        Ok(())
    }

    // ========================
    // Reads inside the transaction
    // ========================

    pub async fn get_employee(&mut self, id: UserId) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch employee")?;

        row.as_ref().map(row_to_employee).transpose()
    }

    /// Ids of every administrator of a company.
    pub async fn list_admin_ids(&mut self, company_id: CompanyId) -> Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT id FROM employees WHERE company_id = ? AND role = ? ORDER BY full_name")
            .bind(company_id.to_string())
            .bind(Role::Admin.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to list administrators")?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                Uuid::parse_str(&id).context("Invalid administrator ID")
            })
            .collect()
    }

    /// Find a leave belonging to `company_id`. Other tenants' leaves are invisible.
    pub async fn find_leave_in_company(
        &mut self,
        id: LeaveId,
        company_id: CompanyId,
    ) -> Result<Option<LeaveRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? AND company_id = ?"
        ))
        .bind(id.to_string())
        .bind(company_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch leave")?;

        row.as_ref().map(row_to_leave).transpose()
    }

    /// Find a leave owned by `user_id` within `company_id`.
    pub async fn find_leave_owned_by(
        &mut self,
        id: LeaveId,
        user_id: UserId,
        company_id: CompanyId,
    ) -> Result<Option<LeaveRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? AND user_id = ? AND company_id = ?"
        ))
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(company_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch leave")?;

        row.as_ref().map(row_to_leave).transpose()
    }

    // ========================
    // Writes
    // ========================

    pub async fn insert_leave(&mut self, leave: &LeaveRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leave_requests (id, user_id, company_id, start_date, end_date, reason, leave_type, status, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(leave.id.to_string())
        .bind(leave.user_id.to_string())
        .bind(leave.company_id.to_string())
        .bind(leave.start_date.format(DATE_FORMAT).to_string())
        .bind(leave.end_date.format(DATE_FORMAT).to_string())
        .bind(&leave.reason)
        .bind(leave.leave_type.as_str())
        .bind(leave.status.as_str())
        .bind(leave.version)
        .bind(leave.created_at.to_rfc3339())
        .bind(leave.updated_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save leave")?;
        Ok(())
    }

    /// Persist the leave's status if nobody else wrote it since it was read.
    /// Bumps `leave.version` on success.
    pub async fn update_leave_status(&mut self, leave: &mut LeaveRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?, updated_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(leave.status.as_str())
        .bind(leave.updated_at.to_rfc3339())
        .bind(leave.id.to_string())
        .bind(leave.version)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update leave status")?;

        if result.rows_affected() == 0 {
            return Err(StaleWrite {
                entity: "leave",
                id: leave.id,
            }
            .into());
        }
        leave.version += 1;
        Ok(())
    }

    /// Persist the employee's `used_leave` if nobody else wrote it since it was read.
    /// Bumps `employee.version` on success.
    pub async fn update_employee_balance(&mut self, employee: &mut Employee) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET used_leave = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(employee.used_leave)
        .bind(employee.id.to_string())
        .bind(employee.version)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update leave balance")?;

        if result.rows_affected() == 0 {
            return Err(StaleWrite {
                entity: "employee",
                id: employee.id,
            }
            .into());
        }
        employee.version += 1;
        Ok(())
    }

    pub async fn insert_notification(&mut self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.user_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save notification")?;
        Ok(())
    }

    pub async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_id, company_id, action, entity, entity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.actor_id.to_string())
        .bind(entry.company_id.to_string())
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(entry.entity_id.to_string())
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save audit entry")?;
        Ok(())
    }
}
