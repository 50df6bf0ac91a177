// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::NaiveDate;
use congedo::application::{
    ApplyLeave, FixedClock, LeaveService, MemoryCache, NewEmployee, Principal, PushChannel,
    PushError, PushMessage, ServiceConfig,
};
use congedo::domain::{Company, LeaveId, Role, UserId};
use tempfile::TempDir;

/// Helper to parse a date string into a NaiveDate
pub fn date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Push channel that remembers what it delivered, or fails on demand.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(UserId, PushMessage)>>,
    failing: AtomicBool,
}

impl RecordingPush {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(UserId, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: UserId) -> Vec<PushMessage> {
        self.sent()
            .into_iter()
            .filter(|(user, _)| *user == recipient)
            .map(|(_, message)| message)
            .collect()
    }
}

impl PushChannel for RecordingPush {
    fn notify(&self, recipient: UserId, message: &PushMessage) -> Result<(), PushError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PushError::Transport("connection reset".into()));
        }
        self.sent.lock().unwrap().push((recipient, message.clone()));
        Ok(())
    }
}

/// Test fixture: one company with an administrator and an employee holding the
/// default 20 day allotment, a clock frozen on 2025-03-01 and recording collaborators.
pub struct Fixture {
    pub service: LeaveService,
    pub clock: Arc<FixedClock>,
    pub push: Arc<RecordingPush>,
    pub cache: Arc<MemoryCache>,
    pub company: Company,
    pub admin: Principal,
    pub employee: Principal,
    pub db_path: String,
    pub config: ServiceConfig,
    _temp: TempDir,
}

impl Fixture {
    pub async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db").to_str().unwrap().to_string();

        let config = ServiceConfig {
            max_attempts: 5,
            ..ServiceConfig::default()
        };
        let clock = Arc::new(FixedClock::on(date("2025-03-01")));
        let push = Arc::new(RecordingPush::default());
        let cache = Arc::new(MemoryCache::new());

        let service = LeaveService::init(&db_path, config.clone())
            .await?
            .with_clock(clock.clone())
            .with_push(push.clone())
            .with_cache(cache.clone());

        let (company, admin) = service
            .register_company(
                "Acme",
                NewEmployee::new("Grace Hopper", "grace@acme.test", Role::Admin),
            )
            .await?;
        let admin = Principal::from(&admin);

        let employee = service
            .add_employee(
                &admin,
                NewEmployee::new("Ada Lovelace", "ada@acme.test", Role::Employee)
                    .with_department("Engineering"),
            )
            .await?;
        let employee = Principal::from(&employee);

        Ok(Self {
            service,
            clock,
            push,
            cache,
            company,
            admin,
            employee,
            db_path,
            config,
            _temp: temp_dir,
        })
    }

    /// A second service over the same database, sharing the fixture's clock,
    /// push channel and cache. Callers swap collaborators with the `with_*` builders.
    pub async fn connect(&self) -> Result<LeaveService> {
        Ok(LeaveService::connect(&self.db_path, self.config.clone())
            .await?
            .with_clock(self.clock.clone())
            .with_push(self.push.clone())
            .with_cache(self.cache.clone()))
    }

    /// Add another member of the fixture company.
    pub async fn add(&self, name: &str, email: &str, role: Role) -> Result<Principal> {
        let employee = self
            .service
            .add_employee(&self.admin, NewEmployee::new(name, email, role))
            .await?;
        Ok(Principal::from(&employee))
    }

    /// File a leave for `who` and return its ID.
    pub async fn apply(&self, who: &Principal, start: &str, end: &str) -> Result<LeaveId> {
        let outcome = self
            .service
            .apply_leave(who, ApplyLeave::new(date(start), date(end)))
            .await?;
        Ok(outcome.leave.id)
    }

    /// File and approve a leave for `who`.
    pub async fn approved(&self, who: &Principal, start: &str, end: &str) -> Result<LeaveId> {
        let id = self.apply(who, start, end).await?;
        self.service.approve_leave(&self.admin, id).await?;
        Ok(id)
    }

    pub async fn used_leave(&self, who: &Principal) -> Result<i64> {
        Ok(self
            .service
            .get_employee_balance(&self.admin, who.user_id)
            .await?
            .used_leave)
    }
}
