use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Company, CompanyId, Employee, LeaveId, LeaveRequest, LeaveStatus, LeaveType, Notification,
    NotificationId, Role, UserId,
};

use super::{MIGRATION_001_INITIAL, UnitOfWork};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(super) const LEAVE_COLUMNS: &str = "id, user_id, company_id, start_date, end_date, reason, leave_type, status, version, created_at, updated_at";

pub(super) const EMPLOYEE_COLUMNS: &str = "id, company_id, full_name, email, role, department, total_leave_balance, used_leave, version, created_at";

/// A leave request joined with the requester's display data, for exports.
#[derive(Debug, Clone)]
pub struct LeaveWithEmployee {
    pub leave: LeaveRequest,
    pub employee_name: String,
    pub department: String,
}

/// One row of the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: UserId,
    pub company_id: CompanyId,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn leave(
        actor_id: UserId,
        company_id: CompanyId,
        action: &str,
        leave_id: LeaveId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            company_id,
            action: action.to_string(),
            entity: "leave".to_string(),
            entity_id: leave_id,
            created_at,
        }
    }
}

/// Per-month status counts backing the trends report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyStatusCount {
    pub month: u32,
    pub status: LeaveStatus,
    pub count: i64,
}

/// Repository for persisting and querying companies, employees, leaves and notifications.
///
/// Plain reads go straight to the pool. Anything that mutates leave or balance
/// state goes through a [`UnitOfWork`] obtained from [`Repository::begin`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    /// Use `?mode=rwc` in the URL to create the file if it doesn't exist.
    pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Open a unit of work. Dropping it without committing rolls everything back.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(UnitOfWork::new(tx))
    }

    // ========================
    // Company operations
    // ========================

    pub async fn get_company(&self, id: CompanyId) -> Result<Option<Company>> {
        let row = sqlx::query("SELECT id, name, created_at FROM companies WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch company")?;

        row.as_ref().map(row_to_company).transpose()
    }

    pub async fn get_company_by_name(&self, name: &str) -> Result<Option<Company>> {
        let row = sqlx::query("SELECT id, name, created_at FROM companies WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch company by name")?;

        row.as_ref().map(row_to_company).transpose()
    }

    // ========================
    // Employee operations
    // ========================

    pub async fn get_employee(&self, id: UserId) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch employee")?;

        row.as_ref().map(row_to_employee).transpose()
    }

    pub async fn get_employee_by_email(&self, email: &str) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE email = ?"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch employee by email")?;

        row.as_ref().map(row_to_employee).transpose()
    }

    /// List all employees of a company, ordered by name.
    pub async fn list_employees(&self, company_id: CompanyId) -> Result<Vec<Employee>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE company_id = ? ORDER BY full_name"
        ))
        .bind(company_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list employees")?;

        rows.iter().map(row_to_employee).collect()
    }

    pub async fn count_employees(&self, company_id: CompanyId, role: Role) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM employees WHERE company_id = ? AND role = ?",
        )
        .bind(company_id.to_string())
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count employees")?;

        Ok(row.get("count"))
    }

    // ========================
    // Leave operations
    // ========================

    /// Get a leave by ID, scoped to a company. A leave of another tenant is `None`.
    pub async fn get_leave(&self, id: LeaveId, company_id: CompanyId) -> Result<Option<LeaveRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? AND company_id = ?"
        ))
        .bind(id.to_string())
        .bind(company_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch leave")?;

        row.as_ref().map(row_to_leave).transpose()
    }

    /// List leaves of a company with optional filters, newest first.
    pub async fn list_leaves(
        &self,
        company_id: CompanyId,
        status: Option<LeaveStatus>,
        user_id: Option<UserId>,
    ) -> Result<Vec<LeaveRequest>> {
        let mut query = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE company_id = ?");

        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        if user_id.is_some() {
            query.push_str(" AND user_id = ?");
        }
        query.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut sql_query = sqlx::query(&query).bind(company_id.to_string());
        if let Some(status) = status {
            sql_query = sql_query.bind(status.as_str());
        }
        if let Some(user_id) = user_id {
            sql_query = sql_query.bind(user_id.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list leaves")?;

        rows.iter().map(row_to_leave).collect()
    }

    /// All leaves of a company with the requester's name and department.
    pub async fn list_leaves_with_employees(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<LeaveWithEmployee>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.user_id, l.company_id, l.start_date, l.end_date, l.reason,
                   l.leave_type, l.status, l.version, l.created_at, l.updated_at,
                   e.full_name, e.department
            FROM leave_requests l
            JOIN employees e ON e.id = l.user_id
            WHERE l.company_id = ?
            ORDER BY l.start_date, e.full_name
            "#,
        )
        .bind(company_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list leaves with employees")?;

        rows.iter()
            .map(|row| {
                Ok(LeaveWithEmployee {
                    leave: row_to_leave(row)?,
                    employee_name: row.get("full_name"),
                    department: row.get("department"),
                })
            })
            .collect()
    }

    /// Count leaves of a company grouped by status. Missing statuses are zero.
    pub async fn count_leaves_by_status(
        &self,
        company_id: CompanyId,
    ) -> Result<HashMap<LeaveStatus, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM leave_requests
            WHERE company_id = ?
            GROUP BY status
            "#,
        )
        .bind(company_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to count leaves by status")?;

        let mut counts: HashMap<LeaveStatus, i64> =
            LeaveStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for row in rows {
            let status = parse_status(row.get("status"))?;
            counts.insert(status, row.get("count"));
        }
        Ok(counts)
    }

    /// Leaves starting in `year`, counted per start month and status.
    pub async fn monthly_status_counts(
        &self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<Vec<MonthlyStatusCount>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(strftime('%m', start_date) AS INTEGER) as month, status, COUNT(*) as count
            FROM leave_requests
            WHERE company_id = ? AND start_date >= ? AND start_date <= ?
            GROUP BY month, status
            ORDER BY month
            "#,
        )
        .bind(company_id.to_string())
        .bind(format!("{year:04}-01-01"))
        .bind(format!("{year:04}-12-31"))
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute monthly counts")?;

        rows.iter()
            .map(|row| {
                let month: i64 = row.get("month");
                Ok(MonthlyStatusCount {
                    month: u32::try_from(month).context("Invalid month")?,
                    status: parse_status(row.get("status"))?,
                    count: row.get("count"),
                })
            })
            .collect()
    }

    // ========================
    // Notification operations
    // ========================

    /// List a user's notifications, newest first.
    pub async fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, message, is_read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list notifications")?;

        rows.iter().map(row_to_notification).collect()
    }

    /// Mark a notification as read. Returns false if it doesn't belong to `user_id`.
    pub async fn mark_notification_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to mark notification as read")?;

        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Audit operations
    // ========================

    pub async fn list_audit_entries(&self, company_id: CompanyId) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, company_id, action, entity, entity_id, created_at
            FROM audit_log
            WHERE company_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(company_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list audit entries")?;

        rows.iter()
            .map(|row| {
                Ok(AuditEntry {
                    id: parse_uuid(row.get("id"), "audit ID")?,
                    actor_id: parse_uuid(row.get("actor_id"), "actor ID")?,
                    company_id: parse_uuid(row.get("company_id"), "company ID")?,
                    action: row.get("action"),
                    entity: row.get("entity"),
                    entity_id: parse_uuid(row.get("entity_id"), "entity ID")?,
                    created_at: parse_timestamp(row.get("created_at"), "created_at")?,
                })
            })
            .collect()
    }
}

// ========================
// Row mapping
// ========================

pub(super) fn parse_uuid(value: String, what: &str) -> Result<Uuid> {
    Uuid::parse_str(&value).with_context(|| format!("Invalid {}", what))
}

pub(super) fn parse_timestamp(value: String, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid {} timestamp", what))?
        .with_timezone(&Utc))
}

fn parse_date(value: String, what: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).with_context(|| format!("Invalid {}", what))
}

fn parse_status(value: String) -> Result<LeaveStatus> {
    LeaveStatus::from_str(&value).ok_or_else(|| anyhow::anyhow!("Invalid leave status: {}", value))
}

pub(super) fn row_to_company(row: &SqliteRow) -> Result<Company> {
    Ok(Company {
        id: parse_uuid(row.get("id"), "company ID")?,
        name: row.get("name"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
    })
}

pub(super) fn row_to_employee(row: &SqliteRow) -> Result<Employee> {
    let role_str: String = row.get("role");

    Ok(Employee {
        id: parse_uuid(row.get("id"), "employee ID")?,
        company_id: parse_uuid(row.get("company_id"), "company ID")?,
        full_name: row.get("full_name"),
        email: row.get("email"),
        role: Role::from_str(&role_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
        department: row.get("department"),
        total_leave_balance: row.get("total_leave_balance"),
        used_leave: row.get("used_leave"),
        version: row.get("version"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
    })
}

pub(super) fn row_to_leave(row: &SqliteRow) -> Result<LeaveRequest> {
    let leave_type_str: String = row.get("leave_type");

    Ok(LeaveRequest {
        id: parse_uuid(row.get("id"), "leave ID")?,
        user_id: parse_uuid(row.get("user_id"), "user ID")?,
        company_id: parse_uuid(row.get("company_id"), "company ID")?,
        start_date: parse_date(row.get("start_date"), "start_date")?,
        end_date: parse_date(row.get("end_date"), "end_date")?,
        reason: row.get("reason"),
        leave_type: LeaveType::from_str(&leave_type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid leave type: {}", leave_type_str))?,
        status: parse_status(row.get("status"))?,
        version: row.get("version"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        updated_at: parse_timestamp(row.get("updated_at"), "updated_at")?,
    })
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: parse_uuid(row.get("id"), "notification ID")?,
        user_id: parse_uuid(row.get("user_id"), "user ID")?,
        title: row.get("title"),
        message: row.get("message"),
        is_read: row.get::<i32, _>("is_read") != 0,
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
    })
}
