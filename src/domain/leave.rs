use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{CompanyId, Days, UserId};

pub type LeaveId = Uuid;

/// Lifecycle state of a leave request.
///
/// `Pending` is the only initial state. `Rejected` and `Cancelled` are terminal;
/// `Approved` is terminal unless the leave is cancelled before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub const ALL: [LeaveStatus; 4] = [
        LeaveStatus::Pending,
        LeaveStatus::Approved,
        LeaveStatus::Rejected,
        LeaveStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
            LeaveStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(LeaveStatus::Pending),
            "approved" => Some(LeaveStatus::Approved),
            "rejected" => Some(LeaveStatus::Rejected),
            "cancelled" | "canceled" => Some(LeaveStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of leave. Informational only: it never changes balance math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveType {
    #[default]
    Annual,
    Sick,
    Casual,
    Unpaid,
    Maternity,
    Paternity,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Sick => "sick",
            LeaveType::Casual => "casual",
            LeaveType::Unpaid => "unpaid",
            LeaveType::Maternity => "maternity",
            LeaveType::Paternity => "paternity",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "annual" => Some(LeaveType::Annual),
            "sick" => Some(LeaveType::Sick),
            "casual" => Some(LeaveType::Casual),
            "unpaid" => Some(LeaveType::Unpaid),
            "maternity" => Some(LeaveType::Maternity),
            "paternity" => Some(LeaveType::Paternity),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeaveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rejected state transition on a single leave request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaveError {
    #[error("Invalid leave dates: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Leave {id} already processed (status: {status})")]
    AlreadyProcessed { id: LeaveId, status: LeaveStatus },

    #[error("Only approved leaves can be cancelled (leave {id} is {status})")]
    NotApproved { id: LeaveId, status: LeaveStatus },

    #[error("Cannot cancel leave {id}: it started on {start_date}")]
    AlreadyStarted { id: LeaveId, start_date: NaiveDate },
}

/// Inclusive number of days covered by `start..=end`.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> Days {
    (end - start).num_days() + 1
}

/// A request for time off. The day count is always derived from the date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveId,
    pub user_id: UserId,
    /// Copied from the requester when the leave is created
    pub company_id: CompanyId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub leave_type: LeaveType,
    pub status: LeaveStatus,
    /// Optimistic concurrency token, bumped on every status write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Create a new pending request. Fails if the range is inverted.
    pub fn new(
        user_id: UserId,
        company_id: CompanyId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LeaveError> {
        if end_date < start_date {
            return Err(LeaveError::InvalidDateRange {
                start: start_date,
                end: end_date,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            company_id,
            start_date,
            end_date,
            reason: String::new(),
            leave_type: LeaveType::default(),
            status: LeaveStatus::Pending,
            version: 0,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = leave_type;
        self
    }

    pub fn leave_days(&self) -> Days {
        leave_days(self.start_date, self.end_date)
    }

    pub fn is_pending(&self) -> bool {
        self.status == LeaveStatus::Pending
    }

    /// Pending -> Approved. The caller is responsible for debiting the balance
    /// in the same unit of work.
    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), LeaveError> {
        self.ensure_pending()?;
        self.status = LeaveStatus::Approved;
        self.updated_at = at;
        Ok(())
    }

    /// Pending -> Rejected.
    pub fn reject(&mut self, at: DateTime<Utc>) -> Result<(), LeaveError> {
        self.ensure_pending()?;
        self.status = LeaveStatus::Rejected;
        self.updated_at = at;
        Ok(())
    }

    /// Approved -> Cancelled, allowed only while the leave lies strictly in the future.
    pub fn cancel(&mut self, today: NaiveDate, at: DateTime<Utc>) -> Result<(), LeaveError> {
        if self.status != LeaveStatus::Approved {
            return Err(LeaveError::NotApproved {
                id: self.id,
                status: self.status,
            });
        }
        if self.start_date <= today {
            return Err(LeaveError::AlreadyStarted {
                id: self.id,
                start_date: self.start_date,
            });
        }
        self.status = LeaveStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), LeaveError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(LeaveError::AlreadyProcessed {
                id: self.id,
                status: self.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn pending(start: &str, end: &str) -> LeaveRequest {
        LeaveRequest::new(Uuid::new_v4(), Uuid::new_v4(), date(start), date(end), Utc::now())
            .unwrap()
    }

    #[test]
    fn test_leave_days_is_inclusive() {
        assert_eq!(leave_days(date("2025-03-10"), date("2025-03-14")), 5);
        assert_eq!(leave_days(date("2025-03-10"), date("2025-03-10")), 1);
        // Crosses a month boundary
        assert_eq!(leave_days(date("2025-02-27"), date("2025-03-02")), 4);
    }

    #[test]
    fn test_new_leave_is_pending() {
        let leave = pending("2025-03-10", "2025-03-14")
            .with_reason("Family trip")
            .with_leave_type(LeaveType::Casual);

        assert_eq!(leave.status, LeaveStatus::Pending);
        assert_eq!(leave.leave_days(), 5);
        assert_eq!(leave.reason, "Family trip");
        assert_eq!(leave.leave_type, LeaveType::Casual);
        assert_eq!(leave.version, 0);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let result = LeaveRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            date("2025-03-14"),
            date("2025-03-10"),
            Utc::now(),
        );
        assert!(matches!(result, Err(LeaveError::InvalidDateRange { .. })));
    }

    #[test]
    fn test_only_pending_can_be_approved_or_rejected() {
        let mut leave = pending("2025-03-10", "2025-03-14");
        leave.approve(Utc::now()).unwrap();
        assert_eq!(leave.status, LeaveStatus::Approved);

        assert!(matches!(
            leave.approve(Utc::now()),
            Err(LeaveError::AlreadyProcessed { status: LeaveStatus::Approved, .. })
        ));
        assert!(matches!(
            leave.reject(Utc::now()),
            Err(LeaveError::AlreadyProcessed { .. })
        ));
    }

    #[test]
    fn test_reject_twice_is_already_processed() {
        let mut leave = pending("2025-03-10", "2025-03-14");
        leave.reject(Utc::now()).unwrap();

        let err = leave.reject(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            LeaveError::AlreadyProcessed {
                id: leave.id,
                status: LeaveStatus::Rejected
            }
        );
        assert_eq!(leave.status, LeaveStatus::Rejected);
    }

    #[test]
    fn test_cancel_requires_approved() {
        let mut leave = pending("2025-03-10", "2025-03-14");
        let err = leave.cancel(date("2025-03-01"), Utc::now()).unwrap_err();
        assert!(matches!(err, LeaveError::NotApproved { status: LeaveStatus::Pending, .. }));
    }

    #[test]
    fn test_cancel_only_before_start() {
        let mut leave = pending("2025-03-10", "2025-03-14");
        leave.approve(Utc::now()).unwrap();

        // Start day itself counts as started
        assert!(matches!(
            leave.cancel(date("2025-03-10"), Utc::now()),
            Err(LeaveError::AlreadyStarted { .. })
        ));
        assert!(matches!(
            leave.cancel(date("2025-03-11"), Utc::now()),
            Err(LeaveError::AlreadyStarted { .. })
        ));

        leave.cancel(date("2025-03-09"), Utc::now()).unwrap();
        assert_eq!(leave.status, LeaveStatus::Cancelled);
    }

    #[test]
    fn test_status_parsing() {
        for status in LeaveStatus::ALL {
            assert_eq!(LeaveStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(LeaveStatus::from_str("canceled"), Some(LeaveStatus::Cancelled));
        assert_eq!(LeaveType::from_str("SICK"), Some(LeaveType::Sick));
        assert_eq!(LeaveType::from_str("sabbatical"), None);
    }
}
