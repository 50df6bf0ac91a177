use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    Company, Days, Employee, LeaveId, LeaveRequest, LeaveStatus, LeaveType, Notification,
    NotificationId, Role, UserId, ensure_available, release, reserve,
};
use crate::storage::{AuditEntry, LeaveWithEmployee, Repository, UnitOfWork};

use super::notify::{self, Dispatch, LifecycleEvent};
use super::{
    AppError, Cache, CacheKey, CacheKind, Clock, DashboardSummary, Effects, LogPush, MemoryCache,
    MonthlyTrend, Permission, PermissionPolicy, Principal, PushChannel, RolePermissions,
    ServiceConfig, SystemClock,
};

/// Lifecycle orchestrator and the primary interface for any client (CLI, API, etc.).
///
/// Every transition runs as: authorize, then read/validate/write inside one
/// [`UnitOfWork`], then commit, then apply the resulting [`Effects`]. A failure
/// before the commit leaves no trace: no rows, no notifications, no evictions.
pub struct LeaveService {
    repo: Repository,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn Cache>,
    push: Arc<dyn PushChannel>,
    policy: Arc<dyn PermissionPolicy>,
}

/// A committed transition and the side effects that were applied after it.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub leave: LeaveRequest,
    pub effects: Effects,
}

/// Parameters of a new leave request.
#[derive(Debug, Clone)]
pub struct ApplyLeave {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub leave_type: LeaveType,
}

impl ApplyLeave {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            reason: String::new(),
            leave_type: LeaveType::default(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = leave_type;
        self
    }
}

/// Parameters of a new company member.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub total_leave_balance: Option<Days>,
}

impl NewEmployee {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            role,
            department: None,
            total_leave_balance: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_allotment(mut self, days: Days) -> Self {
        self.total_leave_balance = Some(days);
        self
    }
}

/// Filter for querying leaves
#[derive(Debug, Clone, Default)]
pub struct LeaveFilter {
    pub status: Option<LeaveStatus>,
    pub user: Option<UserId>,
}

impl LeaveService {
    /// Create a service with the system clock, an in-memory cache, logged pushes
    /// and the default role table.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            config: ServiceConfig::default(),
            clock: Arc::new(SystemClock),
            cache: Arc::new(MemoryCache::new()),
            push: Arc::new(LogPush),
            policy: Arc::new(RolePermissions),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = push;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, config.busy_timeout).await?;
        Ok(Self::new(repo).with_config(config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, config.busy_timeout).await?;
        Ok(Self::new(repo).with_config(config))
    }

    /// Read-only access to the underlying store.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // ========================
    // Tenant administration
    // ========================

    /// Create a company together with its first administrator.
    pub async fn register_company(
        &self,
        name: &str,
        admin: NewEmployee,
    ) -> Result<(Company, Employee), AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("company name must not be empty".into()));
        }
        if self.repo.get_company_by_name(name).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("company '{}'", name)));
        }

        let company = Company::new(name).with_created_at(self.clock.now());
        let admin = self
            .build_employee(&company, NewEmployee { role: Role::Admin, ..admin })
            .await?;

        let mut uow = self.repo.begin().await?;
        uow.insert_company(&company).await?;
        uow.insert_employee(&admin).await?;
        uow.commit().await?;

        tracing::info!(company_id = %company.id, admin_id = %admin.id, "company registered");
        Ok((company, admin))
    }

    /// Add a member to the caller's company.
    pub async fn add_employee(
        &self,
        principal: &Principal,
        new_employee: NewEmployee,
    ) -> Result<Employee, AppError> {
        self.authorize(principal, Permission::ManageEmployees)?;

        let company = self
            .repo
            .get_company(principal.company_id)
            .await?
            .ok_or_else(|| AppError::CompanyNotFound(principal.company_id.to_string()))?;
        let employee = self.build_employee(&company, new_employee).await?;

        let mut uow = self.repo.begin().await?;
        uow.insert_employee(&employee).await?;
        uow.commit().await?;

        tracing::info!(company_id = %company.id, employee_id = %employee.id, role = %employee.role, "employee added");
        Ok(employee)
    }

    async fn build_employee(
        &self,
        company: &Company,
        new_employee: NewEmployee,
    ) -> Result<Employee, AppError> {
        if new_employee.full_name.trim().is_empty() || new_employee.email.trim().is_empty() {
            return Err(AppError::InvalidInput("name and email are required".into()));
        }
        if self
            .repo
            .get_employee_by_email(&new_employee.email)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists(format!(
                "employee '{}'",
                new_employee.email.trim()
            )));
        }

        let mut employee = Employee::new(
            company.id,
            new_employee.full_name.trim(),
            new_employee.email,
            new_employee.role,
        )
        .with_created_at(self.clock.now());

        if let Some(department) = new_employee.department {
            employee = employee.with_department(department);
        }
        if let Some(days) = new_employee.total_leave_balance {
            if days < 0 {
                return Err(AppError::InvalidInput(format!(
                    "leave allotment must not be negative, got {}",
                    days
                )));
            }
            employee = employee.with_allotment(days);
        }
        Ok(employee)
    }

    /// Resolve an employee's email into a principal.
    pub async fn resolve_principal(&self, email: &str) -> Result<Principal, AppError> {
        let employee = self
            .repo
            .get_employee_by_email(email)
            .await?
            .ok_or_else(|| AppError::EmployeeNotFound(email.to_string()))?;
        Ok(Principal::from(&employee))
    }

    /// Get an employee with their current balance. Anyone may read their own;
    /// reading a colleague's requires report access.
    pub async fn get_employee_balance(
        &self,
        principal: &Principal,
        user_id: UserId,
    ) -> Result<Employee, AppError> {
        if user_id != principal.user_id {
            self.authorize(principal, Permission::ViewReports)?;
        }
        self.repo
            .get_employee(user_id)
            .await?
            .filter(|employee| employee.company_id == principal.company_id)
            .ok_or_else(|| AppError::EmployeeNotFound(user_id.to_string()))
    }

    pub async fn list_employees(&self, principal: &Principal) -> Result<Vec<Employee>, AppError> {
        self.authorize(principal, Permission::ViewReports)?;
        Ok(self.repo.list_employees(principal.company_id).await?)
    }

    // ========================
    // Leave lifecycle
    // ========================

    /// File a new request. Checks the balance but does not debit it.
    #[tracing::instrument(skip_all, fields(user_id = %principal.user_id, company_id = %principal.company_id))]
    pub async fn apply_leave(
        &self,
        principal: &Principal,
        request: ApplyLeave,
    ) -> Result<TransitionOutcome, AppError> {
        self.authorize(principal, Permission::ApplyLeave)?;
        let outcome = self
            .with_retry("apply", || self.try_apply(principal, &request))
            .await?;
        Ok(self.finish(outcome))
    }

    /// Pending -> Approved, debiting the owner's balance in the same commit.
    #[tracing::instrument(skip_all, fields(user_id = %principal.user_id, company_id = %principal.company_id, leave_id = %leave_id))]
    pub async fn approve_leave(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        self.authorize(principal, Permission::ApproveLeave)?;
        let outcome = self
            .with_retry("approve", || self.try_approve(principal, leave_id))
            .await?;
        Ok(self.finish(outcome))
    }

    /// Pending -> Rejected.
    #[tracing::instrument(skip_all, fields(user_id = %principal.user_id, company_id = %principal.company_id, leave_id = %leave_id))]
    pub async fn reject_leave(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        self.authorize(principal, Permission::RejectLeave)?;
        let outcome = self
            .with_retry("reject", || self.try_reject(principal, leave_id))
            .await?;
        Ok(self.finish(outcome))
    }

    /// Approved -> Cancelled by the owner, before the leave starts. Releases the
    /// full day count back to the balance.
    #[tracing::instrument(skip_all, fields(user_id = %principal.user_id, company_id = %principal.company_id, leave_id = %leave_id))]
    pub async fn cancel_leave(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        self.authorize(principal, Permission::CancelLeave)?;
        let outcome = self
            .with_retry("cancel", || self.try_cancel(principal, leave_id))
            .await?;
        Ok(self.finish(outcome))
    }

    async fn try_apply(
        &self,
        principal: &Principal,
        request: &ApplyLeave,
    ) -> Result<TransitionOutcome, AppError> {
        let now = self.clock.now();
        let leave = LeaveRequest::new(
            principal.user_id,
            principal.company_id,
            request.start_date,
            request.end_date,
            now,
        )?
        .with_reason(request.reason.trim())
        .with_leave_type(request.leave_type);

        let mut uow = self.repo.begin().await?;
        let applicant = uow
            .get_employee(principal.user_id)
            .await?
            .filter(|employee| employee.company_id == principal.company_id)
            .ok_or_else(|| AppError::EmployeeNotFound(principal.user_id.to_string()))?;

        ensure_available(&applicant, leave.leave_days())?;
        uow.insert_leave(&leave).await?;

        let admins = uow.list_admin_ids(leave.company_id).await?;
        let dispatches = notify::compose(
            LifecycleEvent::Applied {
                applicant: &applicant,
                admins: &admins,
            },
            now,
        );
        let effects = self
            .record_transition(&mut uow, principal, "apply", &leave, dispatches, now)
            .await?;
        uow.commit().await?;

        Ok(TransitionOutcome { leave, effects })
    }

    async fn try_approve(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        let now = self.clock.now();
        let mut uow = self.repo.begin().await?;

        let mut leave = uow
            .find_leave_in_company(leave_id, principal.company_id)
            .await?
            .ok_or(AppError::NotFound(leave_id))?;
        leave.approve(now)?;

        let mut owner = self.load_owner(&mut uow, &leave).await?;
        // Authoritative check: other approvals may have consumed balance since apply
        reserve(&mut owner, leave.leave_days())?;

        uow.update_leave_status(&mut leave).await?;
        uow.update_employee_balance(&mut owner).await?;

        let dispatches = notify::compose(LifecycleEvent::Approved(&leave), now);
        let effects = self
            .record_transition(&mut uow, principal, "approve", &leave, dispatches, now)
            .await?;
        uow.commit().await?;

        Ok(TransitionOutcome { leave, effects })
    }

    async fn try_reject(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        let now = self.clock.now();
        let mut uow = self.repo.begin().await?;

        let mut leave = uow
            .find_leave_in_company(leave_id, principal.company_id)
            .await?
            .ok_or(AppError::NotFound(leave_id))?;
        leave.reject(now)?;
        uow.update_leave_status(&mut leave).await?;

        let dispatches = notify::compose(LifecycleEvent::Rejected(&leave), now);
        let effects = self
            .record_transition(&mut uow, principal, "reject", &leave, dispatches, now)
            .await?;
        uow.commit().await?;

        Ok(TransitionOutcome { leave, effects })
    }

    async fn try_cancel(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<TransitionOutcome, AppError> {
        let now = self.clock.now();
        let mut uow = self.repo.begin().await?;

        let mut leave = uow
            .find_leave_owned_by(leave_id, principal.user_id, principal.company_id)
            .await?
            .ok_or(AppError::NotFound(leave_id))?;
        leave.cancel(self.clock.today(), now)?;

        let mut owner = self.load_owner(&mut uow, &leave).await?;
        release(&mut owner, leave.leave_days()).map_err(|err| {
            tracing::error!(leave_id = %leave.id, employee_id = %owner.id, error = %err, "balance ledger out of sync");
            AppError::from(err)
        })?;

        uow.update_leave_status(&mut leave).await?;
        uow.update_employee_balance(&mut owner).await?;

        let dispatches = notify::compose(LifecycleEvent::Cancelled(&leave), now);
        let effects = self
            .record_transition(&mut uow, principal, "cancel", &leave, dispatches, now)
            .await?;
        uow.commit().await?;

        Ok(TransitionOutcome { leave, effects })
    }

    async fn load_owner(
        &self,
        uow: &mut UnitOfWork,
        leave: &LeaveRequest,
    ) -> Result<Employee, AppError> {
        uow.get_employee(leave.user_id)
            .await?
            .filter(|employee| employee.company_id == leave.company_id)
            .ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "leave {} has no owner {} in company {}",
                    leave.id, leave.user_id, leave.company_id
                ))
            })
    }

    /// Persist notifications and the audit entry inside the unit of work and
    /// collect what must happen once it commits.
    async fn record_transition(
        &self,
        uow: &mut UnitOfWork,
        actor: &Principal,
        action: &str,
        leave: &LeaveRequest,
        dispatches: Vec<Dispatch>,
        at: DateTime<Utc>,
    ) -> Result<Effects, AppError> {
        let mut effects = Effects::for_company(leave.company_id, at.year());

        for dispatch in dispatches {
            uow.insert_notification(&dispatch.record).await?;
            effects.push(dispatch.recipient(), dispatch.push);
        }

        let entry = AuditEntry::leave(actor.user_id, leave.company_id, action, leave.id, at);
        uow.insert_audit_entry(&entry).await?;

        Ok(effects)
    }

    fn finish(&self, outcome: TransitionOutcome) -> TransitionOutcome {
        tracing::info!(
            leave_id = %outcome.leave.id,
            company_id = %outcome.leave.company_id,
            status = %outcome.leave.status,
            days = outcome.leave.leave_days(),
            "leave transition committed"
        );
        outcome
            .effects
            .apply(self.cache.as_ref(), self.push.as_ref());
        outcome
    }

    /// Re-run `attempt` while it fails with a conflict, up to the configured limit.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut tries: u32 = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(err) if err.is_retryable() && tries < self.config.max_attempts => {
                    tracing::warn!(operation, attempt = tries, error = %err, "conflict, retrying");
                    tokio::time::sleep(self.config.retry_backoff * tries).await;
                }
                result => return result,
            }
        }
    }

    fn authorize(&self, principal: &Principal, permission: Permission) -> Result<(), AppError> {
        if self.policy.allows(principal, permission) {
            Ok(())
        } else {
            tracing::debug!(user_id = %principal.user_id, %permission, "permission denied");
            Err(AppError::Forbidden(permission))
        }
    }

    // ========================
    // Leave queries
    // ========================

    /// Get a leave in the caller's company. Without report access only the
    /// caller's own leaves are visible.
    pub async fn get_leave(
        &self,
        principal: &Principal,
        leave_id: LeaveId,
    ) -> Result<LeaveRequest, AppError> {
        let can_see_all = self.policy.allows(principal, Permission::ViewReports);
        self.repo
            .get_leave(leave_id, principal.company_id)
            .await?
            .filter(|leave| can_see_all || leave.user_id == principal.user_id)
            .ok_or(AppError::NotFound(leave_id))
    }

    /// List leaves in the caller's company, newest first.
    pub async fn list_leaves(
        &self,
        principal: &Principal,
        filter: LeaveFilter,
    ) -> Result<Vec<LeaveRequest>, AppError> {
        let user = if self.policy.allows(principal, Permission::ViewReports) {
            filter.user
        } else {
            Some(principal.user_id)
        };

        Ok(self
            .repo
            .list_leaves(principal.company_id, filter.status, user)
            .await?)
    }

    /// Every leave of the caller's company with requester details, for exports.
    pub async fn leave_register(
        &self,
        principal: &Principal,
    ) -> Result<Vec<LeaveWithEmployee>, AppError> {
        self.authorize(principal, Permission::ViewReports)?;
        Ok(self
            .repo
            .list_leaves_with_employees(principal.company_id)
            .await?)
    }

    // ========================
    // Notifications inbox
    // ========================

    pub async fn list_notifications(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Notification>, AppError> {
        Ok(self.repo.list_notifications(principal.user_id).await?)
    }

    pub async fn mark_notification_read(
        &self,
        principal: &Principal,
        id: NotificationId,
    ) -> Result<(), AppError> {
        if self
            .repo
            .mark_notification_read(id, principal.user_id)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::NotificationNotFound(id))
        }
    }

    // ========================
    // Reports
    // ========================

    /// Company-wide counts, cached under `dashboard:<company>:<current year>`.
    pub async fn dashboard_summary(
        &self,
        principal: &Principal,
    ) -> Result<DashboardSummary, AppError> {
        self.authorize(principal, Permission::ViewDashboard)?;

        let key = CacheKey::new(
            CacheKind::Dashboard,
            principal.company_id,
            self.clock.now().year(),
        );
        let seen = self.cache.generation(&key.to_string());
        if let Some(summary) = self.cached(&key) {
            return Ok(summary);
        }

        let counts = self.repo.count_leaves_by_status(principal.company_id).await?;
        let count = |status: LeaveStatus| counts.get(&status).copied().unwrap_or(0);
        let summary = DashboardSummary {
            total_employees: self
                .repo
                .count_employees(principal.company_id, Role::Employee)
                .await?,
            total_leaves: counts.values().sum(),
            pending_leaves: count(LeaveStatus::Pending),
            approved_leaves: count(LeaveStatus::Approved),
            rejected_leaves: count(LeaveStatus::Rejected),
            cancelled_leaves: count(LeaveStatus::Cancelled),
        };

        self.store(&key, &summary, seen);
        Ok(summary)
    }

    /// Per-month activity for leaves starting in `year`, cached per company and year.
    pub async fn monthly_trends(
        &self,
        principal: &Principal,
        year: i32,
    ) -> Result<Vec<MonthlyTrend>, AppError> {
        self.authorize(principal, Permission::ViewReports)?;

        let key = CacheKey::new(CacheKind::MonthlyTrends, principal.company_id, year);
        let seen = self.cache.generation(&key.to_string());
        if let Some(trends) = self.cached(&key) {
            return Ok(trends);
        }

        let counts = self
            .repo
            .monthly_status_counts(principal.company_id, year)
            .await?;
        let trends = MonthlyTrend::from_counts(&counts);

        self.store(&key, &trends, seen);
        Ok(trends)
    }

    fn cached<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let value = self.cache.get(&key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(%key, error = %err, "discarding unreadable cache entry");
                self.cache.evict(&key);
                None
            }
        }
    }

    /// Fills `key` only if no transition evicted it after `seen` was read.
    fn store<T: Serialize>(&self, key: &CacheKey, value: &T, seen: u64) {
        match serde_json::to_value(value) {
            Ok(json) => {
                if !self
                    .cache
                    .set(&key.to_string(), json, self.config.cache_ttl, seen)
                {
                    tracing::debug!(%key, "skipped cache fill after concurrent eviction");
                }
            }
            Err(err) => tracing::warn!(%key, error = %err, "failed to cache report"),
        }
    }
}
