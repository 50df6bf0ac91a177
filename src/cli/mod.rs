use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{
    ApplyLeave, Clock, FixedClock, LeaveFilter, LeaveService, NewEmployee, NoCache, Principal,
    ServiceConfig,
};
use crate::domain::{LeaveRequest, LeaveStatus, LeaveType, Role};

/// Congedo - multi-tenant leave management
#[derive(Parser)]
#[command(name = "congedo")]
#[command(about = "Leave requests, approvals and balances for multiple companies")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "CONGEDO_DATABASE", default_value = "congedo.db", global = true)]
    pub database: String,

    /// Log filter (e.g. "info", "congedo=debug"); RUST_LOG takes precedence
    #[arg(long, env = "CONGEDO_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Email of the employee performing the command
    #[arg(long = "as", env = "CONGEDO_USER", global = true)]
    pub acting_as: Option<String>,

    /// Attempts per lifecycle command before giving up on a conflict
    #[arg(long, env = "CONGEDO_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    pub max_attempts: u32,

    /// How long to wait on a locked database, in milliseconds
    #[arg(long, env = "CONGEDO_BUSY_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub busy_timeout_ms: u64,

    /// Lifetime of cached reports, in seconds
    #[arg(long, env = "CONGEDO_CACHE_TTL_SECS", default_value_t = 300, global = true)]
    pub cache_ttl_secs: u64,

    /// Compute every report from the database instead of caching it
    #[arg(long, env = "CONGEDO_NO_CACHE", global = true)]
    pub no_cache: bool,

    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long, env = "CONGEDO_TODAY", global = true)]
    pub today: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Company management commands
    #[command(subcommand)]
    Company(CompanyCommands),

    /// Employee management commands
    #[command(subcommand)]
    Employee(EmployeeCommands),

    /// Leave request commands
    #[command(subcommand)]
    Leave(LeaveCommands),

    /// Notification inbox commands
    #[command(subcommand)]
    Notifications(NotificationCommands),

    /// Dashboards, trends and exports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand)]
pub enum CompanyCommands {
    /// Register a company and its first administrator
    Register {
        /// Company name (must be unique)
        name: String,

        /// Administrator's full name
        #[arg(long)]
        admin_name: String,

        /// Administrator's email (must be unique)
        #[arg(long)]
        admin_email: String,
    },
}

#[derive(Subcommand)]
pub enum EmployeeCommands {
    /// Add an employee to the acting user's company
    Add {
        /// Full name
        name: String,

        /// Email (must be unique)
        #[arg(long)]
        email: String,

        /// Role: admin, manager, employee
        #[arg(long, default_value = "employee")]
        role: String,

        /// Department (defaults to "General")
        #[arg(long)]
        department: Option<String>,

        /// Yearly leave allotment in days (defaults to 20)
        #[arg(long)]
        allotment: Option<i64>,
    },

    /// List employees of the acting user's company
    List,

    /// Show a leave balance (the acting user's own if no email is given)
    Balance {
        /// Employee email
        email: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LeaveCommands {
    /// Apply for leave
    Apply {
        /// First day of leave (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last day of leave, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Reason for the leave
        #[arg(short, long, default_value = "")]
        reason: String,

        /// Type: annual, sick, casual, unpaid, maternity, paternity
        #[arg(short = 't', long = "type", default_value = "annual")]
        leave_type: String,
    },

    /// Approve a pending leave
    Approve {
        /// Leave ID
        id: String,
    },

    /// Reject a pending leave
    Reject {
        /// Leave ID
        id: String,
    },

    /// Cancel one of your approved leaves before it starts
    Cancel {
        /// Leave ID
        id: String,
    },

    /// Show detailed leave information
    Show {
        /// Leave ID
        id: String,
    },

    /// List leaves
    List {
        /// Filter by status: pending, approved, rejected, cancelled
        #[arg(long)]
        status: Option<String>,

        /// Filter by employee email
        #[arg(long)]
        employee: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List your notifications, newest first
    List {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Mark a notification as read
    Read {
        /// Notification ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Company dashboard counts
    Dashboard {
        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Monthly leave activity
    Trends {
        /// Year to report on (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Export the company's leave register to CSV
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_attempts: self.max_attempts.max(1),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            ..ServiceConfig::default()
        }
    }

    async fn principal(&self, service: &LeaveService) -> Result<Principal> {
        let email = self
            .acting_as
            .as_deref()
            .context("This command needs an acting user: pass --as <email> or set CONGEDO_USER")?;
        Ok(service.resolve_principal(email).await?)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.service_config();

        if matches!(self.command, Commands::Init) {
            LeaveService::init(&self.database, config).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let mut service = LeaveService::connect(&self.database, config).await?;
        if let Some(today) = &self.today {
            service = service.with_clock(Arc::new(FixedClock::on(parse_date(today)?)));
        }
        if self.no_cache {
            service = service.with_cache(Arc::new(NoCache));
        }

        match &self.command {
            Commands::Init => {}

            Commands::Company(CompanyCommands::Register {
                name,
                admin_name,
                admin_email,
            }) => {
                let (company, admin) = service
                    .register_company(
                        name,
                        NewEmployee::new(admin_name.as_str(), admin_email.as_str(), Role::Admin),
                    )
                    .await?;
                println!("Registered company: {} ({})", company.name, company.id);
                println!("Administrator:      {} <{}>", admin.full_name, admin.email);
            }

            Commands::Employee(cmd) => {
                let principal = self.principal(&service).await?;
                run_employee_command(&service, &principal, cmd).await?;
            }

            Commands::Leave(cmd) => {
                let principal = self.principal(&service).await?;
                run_leave_command(&service, &principal, cmd).await?;
            }

            Commands::Notifications(cmd) => {
                let principal = self.principal(&service).await?;
                run_notification_command(&service, &principal, cmd).await?;
            }

            Commands::Report(cmd) => {
                let principal = self.principal(&service).await?;
                run_report_command(&service, &principal, cmd).await?;
            }
        }

        Ok(())
    }
}

async fn run_employee_command(
    service: &LeaveService,
    principal: &Principal,
    cmd: &EmployeeCommands,
) -> Result<()> {
    match cmd {
        EmployeeCommands::Add {
            name,
            email,
            role,
            department,
            allotment,
        } => {
            let role = Role::from_str(role).with_context(|| {
                format!("Invalid role '{}'. Valid roles: admin, manager, employee", role)
            })?;

            let mut new_employee = NewEmployee::new(name.as_str(), email.as_str(), role);
            if let Some(department) = department {
                new_employee = new_employee.with_department(department.as_str());
            }
            if let Some(days) = allotment {
                new_employee = new_employee.with_allotment(*days);
            }

            let employee = service.add_employee(principal, new_employee).await?;
            println!(
                "Added employee: {} <{}> ({}, {})",
                employee.full_name, employee.email, employee.role, employee.id
            );
        }

        EmployeeCommands::List => {
            let employees = service.list_employees(principal).await?;
            if employees.is_empty() {
                println!("No employees found.");
            } else {
                println!(
                    "{:<24} {:<28} {:<9} {:<14} {:>6} {:>5}",
                    "NAME", "EMAIL", "ROLE", "DEPARTMENT", "TOTAL", "USED"
                );
                println!("{}", "-".repeat(91));
                for employee in employees {
                    println!(
                        "{:<24} {:<28} {:<9} {:<14} {:>6} {:>5}",
                        truncate(&employee.full_name, 24),
                        truncate(&employee.email, 28),
                        employee.role,
                        truncate(&employee.department, 14),
                        employee.total_leave_balance,
                        employee.used_leave
                    );
                }
            }
        }

        EmployeeCommands::Balance { email } => {
            let user_id = match email {
                Some(email) => service.resolve_principal(email).await?.user_id,
                None => principal.user_id,
            };
            let employee = service.get_employee_balance(principal, user_id).await?;
            println!("{} <{}>", employee.full_name, employee.email);
            println!("  Allotment: {:>4} day(s)", employee.total_leave_balance);
            println!("  Used:      {:>4} day(s)", employee.used_leave);
            println!("  Remaining: {:>4} day(s)", employee.remaining_leave());
        }
    }
    Ok(())
}

async fn run_leave_command(
    service: &LeaveService,
    principal: &Principal,
    cmd: &LeaveCommands,
) -> Result<()> {
    match cmd {
        LeaveCommands::Apply {
            start,
            end,
            reason,
            leave_type,
        } => {
            let leave_type = LeaveType::from_str(leave_type).with_context(|| {
                format!(
                    "Invalid leave type '{}'. Valid types: annual, sick, casual, unpaid, maternity, paternity",
                    leave_type
                )
            })?;
            let request = ApplyLeave::new(parse_date(start)?, parse_date(end)?)
                .with_reason(reason.as_str())
                .with_leave_type(leave_type);

            let outcome = service.apply_leave(principal, request).await?;
            let leave = &outcome.leave;
            println!(
                "Applied for leave: {} to {} ({} day(s), {})",
                leave.start_date,
                leave.end_date,
                leave.leave_days(),
                leave.id
            );
        }

        LeaveCommands::Approve { id } => {
            let outcome = service.approve_leave(principal, parse_id(id)?).await?;
            println!("Approved leave: {} ({} day(s))", outcome.leave.id, outcome.leave.leave_days());
        }

        LeaveCommands::Reject { id } => {
            let outcome = service.reject_leave(principal, parse_id(id)?).await?;
            println!("Rejected leave: {}", outcome.leave.id);
        }

        LeaveCommands::Cancel { id } => {
            let outcome = service.cancel_leave(principal, parse_id(id)?).await?;
            println!(
                "Cancelled leave: {} ({} day(s) returned)",
                outcome.leave.id,
                outcome.leave.leave_days()
            );
        }

        LeaveCommands::Show { id } => {
            let leave = service.get_leave(principal, parse_id(id)?).await?;
            print_leave(&leave);
        }

        LeaveCommands::List { status, employee } => {
            let status = status
                .as_deref()
                .map(|s| {
                    LeaveStatus::from_str(s).with_context(|| {
                        format!(
                            "Invalid status '{}'. Valid statuses: pending, approved, rejected, cancelled",
                            s
                        )
                    })
                })
                .transpose()?;
            let user = match employee {
                Some(email) => Some(service.resolve_principal(email).await?.user_id),
                None => None,
            };

            let leaves = service
                .list_leaves(principal, LeaveFilter { status, user })
                .await?;
            print_leave_table(&leaves);
        }
    }
    Ok(())
}

async fn run_notification_command(
    service: &LeaveService,
    principal: &Principal,
    cmd: &NotificationCommands,
) -> Result<()> {
    match cmd {
        NotificationCommands::List { unread } => {
            let notifications: Vec<_> = service
                .list_notifications(principal)
                .await?
                .into_iter()
                .filter(|n| !*unread || !n.is_read)
                .collect();

            if notifications.is_empty() {
                println!("No notifications.");
            } else {
                for notification in notifications {
                    println!(
                        "{} {} {:<22} {}",
                        if notification.is_read { " " } else { "*" },
                        notification.created_at.format("%Y-%m-%d %H:%M"),
                        notification.title,
                        notification.message
                    );
                    println!("    {}", notification.id);
                }
            }
        }

        NotificationCommands::Read { id } => {
            let id = Uuid::parse_str(id).context("Invalid notification ID format (expected UUID)")?;
            service.mark_notification_read(principal, id).await?;
            println!("Marked as read: {}", id);
        }
    }
    Ok(())
}

async fn run_report_command(
    service: &LeaveService,
    principal: &Principal,
    cmd: &ReportCommands,
) -> Result<()> {
    match cmd {
        ReportCommands::Dashboard { format } => {
            let summary = service.dashboard_summary(principal).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                "table" => {
                    println!("Employees:        {:>6}", summary.total_employees);
                    println!("Leaves:           {:>6}", summary.total_leaves);
                    println!("  Pending:        {:>6}", summary.pending_leaves);
                    println!("  Approved:       {:>6}", summary.approved_leaves);
                    println!("  Rejected:       {:>6}", summary.rejected_leaves);
                    println!("  Cancelled:      {:>6}", summary.cancelled_leaves);
                }
                other => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", other),
            }
        }

        ReportCommands::Trends { year, format } => {
            let year = year.unwrap_or_else(|| service.clock().now().year());
            let trends = service.monthly_trends(principal, year).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&trends)?),
                "table" => {
                    if trends.is_empty() {
                        println!("No leave activity in {}.", year);
                    } else {
                        println!(
                            "{:<6} {:>6} {:>9} {:>8} {:>9} {:>10}",
                            "MONTH", "TOTAL", "APPROVED", "PENDING", "REJECTED", "CANCELLED"
                        );
                        println!("{}", "-".repeat(53));
                        for trend in trends {
                            println!(
                                "{:<6} {:>6} {:>9} {:>8} {:>9} {:>10}",
                                format!("{}-{:02}", year, trend.month),
                                trend.total_leaves,
                                trend.approved,
                                trend.pending,
                                trend.rejected,
                                trend.cancelled
                            );
                        }
                    }
                }
                other => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", other),
            }
        }

        ReportCommands::Export { output } => {
            use crate::io::Exporter;
            use std::fs::File;
            use std::io::{Write, stdout};

            let writer: Box<dyn Write> = match output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create output file: {}", path))?;
                    Box::new(file)
                }
                None => Box::new(stdout()),
            };

            let count = Exporter::new(service, principal)
                .export_leaves_csv(writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} leave(s)", count);
            }
        }
    }
    Ok(())
}

fn print_leave(leave: &LeaveRequest) {
    println!("Leave: {}", leave.id);
    println!("  Employee:  {}", leave.user_id);
    println!("  Type:      {}", leave.leave_type);
    println!(
        "  Dates:     {} to {} ({} day(s))",
        leave.start_date,
        leave.end_date,
        leave.leave_days()
    );
    println!("  Status:    {}", leave.status);
    if !leave.reason.is_empty() {
        println!("  Reason:    {}", leave.reason);
    }
    println!("  Applied:   {}", leave.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:   {}", leave.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_leave_table(leaves: &[LeaveRequest]) {
    if leaves.is_empty() {
        println!("No leaves found.");
        return;
    }

    println!(
        "{:<36} {:<10} {:<10} {:>4} {:<9} {:<9} REASON",
        "ID", "START", "END", "DAYS", "TYPE", "STATUS"
    );
    println!("{}", "-".repeat(100));
    for leave in leaves {
        println!(
            "{:<36} {:<10} {:<10} {:>4} {:<9} {:<9} {}",
            leave.id,
            leave.start_date,
            leave.end_date,
            leave.leave_days(),
            leave.leave_type,
            leave.status,
            truncate(&leave.reason, 20)
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).context("Invalid leave ID format (expected UUID)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leave_commands() {
        let cli = Cli::try_parse_from([
            "congedo",
            "--as",
            "ada@example.com",
            "leave",
            "apply",
            "--start",
            "2025-03-10",
            "--end",
            "2025-03-14",
            "-t",
            "sick",
        ])
        .unwrap();

        assert_eq!(cli.acting_as.as_deref(), Some("ada@example.com"));
        assert_eq!(cli.max_attempts, 3);
        match cli.command {
            Commands::Leave(LeaveCommands::Apply { start, leave_type, .. }) => {
                assert_eq!(start, "2025-03-10");
                assert_eq!(leave_type, "sick");
            }
            _ => panic!("expected leave apply"),
        }
    }

    #[test]
    fn test_service_config_from_flags() {
        let cli = Cli::try_parse_from([
            "congedo",
            "--max-attempts",
            "0",
            "--cache-ttl-secs",
            "60",
            "init",
        ])
        .unwrap();

        let config = cli.service_config();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert!(!cli.no_cache);
    }

    #[test]
    fn test_no_cache_flag_is_global() {
        let cli = Cli::try_parse_from(["congedo", "report", "dashboard", "--no-cache"]).unwrap();
        assert!(cli.no_cache);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Élodie Müller-Lüdenscheidt", 10), "Élodie ...");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2025-02-30").is_err());
        assert_eq!(
            parse_date("2025-02-28").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }
}
