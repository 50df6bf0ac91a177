use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Days, LeaveError, LeaveId, LeaveStatus, LedgerError, NotificationId};
use crate::storage::is_conflict;

use super::Permission;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid leave dates: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Insufficient leave balance: {remaining} day(s) remaining, {requested} requested")]
    InsufficientBalance { remaining: Days, requested: Days },

    /// Also returned for leaves that exist in another tenant.
    #[error("Leave not found: {0}")]
    NotFound(LeaveId),

    #[error("Leave {id} already processed (status: {status})")]
    AlreadyProcessed { id: LeaveId, status: LeaveStatus },

    #[error("Only approved leaves can be cancelled (leave {id} is {status})")]
    NotApproved { id: LeaveId, status: LeaveStatus },

    #[error("Cannot cancel leave {id}: it started on {start_date}")]
    AlreadyStarted { id: LeaveId, start_date: NaiveDate },

    #[error("Not allowed to {0}")]
    Forbidden(Permission),

    #[error("Concurrent modification detected, please retry: {0}")]
    ConcurrencyConflict(String),

    #[error("Employee not found: {0}")]
    EmployeeNotFound(String),

    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Leave ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl AppError {
    /// Only lost updates are worth retrying; everything else is a final answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if is_conflict(&err) {
            AppError::ConcurrencyConflict(format!("{:#}", err))
        } else {
            AppError::Database(err)
        }
    }
}

impl From<LeaveError> for AppError {
    fn from(err: LeaveError) -> Self {
        match err {
            LeaveError::InvalidDateRange { start, end } => AppError::InvalidDateRange { start, end },
            LeaveError::AlreadyProcessed { id, status } => AppError::AlreadyProcessed { id, status },
            LeaveError::NotApproved { id, status } => AppError::NotApproved { id, status },
            LeaveError::AlreadyStarted { id, start_date } => {
                AppError::AlreadyStarted { id, start_date }
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                remaining,
                requested,
            } => AppError::InsufficientBalance {
                remaining,
                requested,
            },
            other => AppError::InvariantViolation(other.to_string()),
        }
    }
}
