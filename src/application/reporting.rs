use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::LeaveStatus;
use crate::storage::MonthlyStatusCount;

/// Headline numbers for a company's admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_employees: i64,
    pub total_leaves: i64,
    pub pending_leaves: i64,
    pub approved_leaves: i64,
    pub rejected_leaves: i64,
    pub cancelled_leaves: i64,
}

/// Leave activity for one calendar month, by start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub month: u32,
    pub total_leaves: i64,
    pub approved: i64,
    pub pending: i64,
    pub rejected: i64,
    pub cancelled: i64,
}

impl MonthlyTrend {
    fn empty(month: u32) -> Self {
        Self {
            month,
            total_leaves: 0,
            approved: 0,
            pending: 0,
            rejected: 0,
            cancelled: 0,
        }
    }

    /// Fold per-(month, status) counts into one row per month with activity,
    /// ordered by month.
    pub fn from_counts(counts: &[MonthlyStatusCount]) -> Vec<MonthlyTrend> {
        let mut months: BTreeMap<u32, MonthlyTrend> = BTreeMap::new();

        for row in counts {
            let trend = months
                .entry(row.month)
                .or_insert_with(|| MonthlyTrend::empty(row.month));
            trend.total_leaves += row.count;
            match row.status {
                LeaveStatus::Pending => trend.pending += row.count,
                LeaveStatus::Approved => trend.approved += row.count,
                LeaveStatus::Rejected => trend.rejected += row.count,
                LeaveStatus::Cancelled => trend.cancelled += row.count,
            }
        }

        months.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trends_fold_statuses_per_month() {
        let counts = vec![
            MonthlyStatusCount {
                month: 3,
                status: LeaveStatus::Approved,
                count: 2,
            },
            MonthlyStatusCount {
                month: 1,
                status: LeaveStatus::Pending,
                count: 1,
            },
            MonthlyStatusCount {
                month: 3,
                status: LeaveStatus::Rejected,
                count: 1,
            },
        ];

        let trends = MonthlyTrend::from_counts(&counts);

        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].month, 1);
        assert_eq!(trends[0].pending, 1);
        assert_eq!(trends[1].month, 3);
        assert_eq!(trends[1].total_leaves, 3);
        assert_eq!(trends[1].approved, 2);
        assert_eq!(trends[1].rejected, 1);
    }

    #[test]
    fn test_no_activity_means_no_rows() {
        assert!(MonthlyTrend::from_counts(&[]).is_empty());
    }
}
