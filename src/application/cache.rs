use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::domain::CompanyId;

/// Kinds of derived aggregates cached per company and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    MonthlyTrends,
    Dashboard,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::MonthlyTrends => "monthly_trends",
            CacheKind::Dashboard => "dashboard",
        }
    }
}

/// `<kind>:<companyId>:<year>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub company_id: CompanyId,
    pub year: i32,
}

impl CacheKey {
    pub fn new(kind: CacheKind, company_id: CompanyId, year: i32) -> Self {
        Self {
            kind,
            company_id,
            year,
        }
    }

    /// Every aggregate that a leave transition in `company_id` can make stale.
    pub fn affected_by_transition(company_id: CompanyId, year: i32) -> [CacheKey; 2] {
        [
            CacheKey::new(CacheKind::MonthlyTrends, company_id, year),
            CacheKey::new(CacheKind::Dashboard, company_id, year),
        ]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind.as_str(), self.company_id, self.year)
    }
}

/// Key-value cache for derived report data.
///
/// Every key carries a fill generation that `evict` bumps. A reader takes the
/// generation before computing a value and hands it back to `set`, so a value
/// computed before an eviction is never stored after it.
///
/// `evict` must be idempotent. Implementations may drop entries at any time.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Current fill generation of `key`.
    fn generation(&self, key: &str) -> u64;

    /// Store `value` unless `key` was evicted since `generation` was read.
    /// Returns whether the value was stored.
    fn set(&self, key: &str, value: Value, ttl: Duration, generation: u64) -> bool;

    fn evict(&self, key: &str);
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, (Value, Instant)>,
    generations: HashMap<String, u64>,
}

/// In-process cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<Slots>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .entries
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut slots = self.lock();
        match slots.entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                slots.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn generation(&self, key: &str) -> u64 {
        self.lock().generations.get(key).copied().unwrap_or(0)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration, generation: u64) -> bool {
        let mut slots = self.lock();
        let current = slots.generations.get(key).copied().unwrap_or(0);
        if current != generation {
            return false;
        }
        let expires_at = Instant::now() + ttl;
        slots.entries.insert(key.to_string(), (value, expires_at));
        true
    }

    fn evict(&self, key: &str) {
        let mut slots = self.lock();
        slots.entries.remove(key);
        *slots.generations.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn generation(&self, _key: &str) -> u64 {
        0
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration, _generation: u64) -> bool {
        false
    }

    fn evict(&self, _key: &str) {}
}
