use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::application::{LeaveService, Principal};
use crate::domain::Days;
use crate::storage::LeaveWithEmployee;

/// One line of the leave register.
#[derive(Debug, Clone, Serialize)]
pub struct LeaveRecord {
    pub employee: String,
    pub department: String,
    pub start_date: String,
    pub end_date: String,
    pub days: Days,
    pub leave_type: String,
    pub status: String,
    pub reason: String,
}

impl From<&LeaveWithEmployee> for LeaveRecord {
    fn from(row: &LeaveWithEmployee) -> Self {
        Self {
            employee: row.employee_name.clone(),
            department: row.department.clone(),
            start_date: row.leave.start_date.format("%Y-%m-%d").to_string(),
            end_date: row.leave.end_date.format("%Y-%m-%d").to_string(),
            days: row.leave.leave_days(),
            leave_type: row.leave.leave_type.as_str().to_string(),
            status: row.leave.status.as_str().to_string(),
            reason: row.leave.reason.clone(),
        }
    }
}

/// Exporter for the leave register of the caller's company
pub struct Exporter<'a> {
    service: &'a LeaveService,
    principal: &'a Principal,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LeaveService, principal: &'a Principal) -> Self {
        Self { service, principal }
    }

    /// Export every leave of the company to CSV, ordered by start date.
    /// Returns the number of rows written.
    pub async fn export_leaves_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let rows = self.service.leave_register(self.principal).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // The header comes from the field names; write it even when empty
        if rows.is_empty() {
            csv_writer.write_record([
                "employee",
                "department",
                "start_date",
                "end_date",
                "days",
                "leave_type",
                "status",
                "reason",
            ])?;
        }

        for row in &rows {
            csv_writer.serialize(LeaveRecord::from(row))?;
        }

        csv_writer.flush()?;
        Ok(rows.len())
    }
}
