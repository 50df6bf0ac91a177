use crate::domain::{CompanyId, UserId};

use super::{Cache, CacheKey, PushChannel, PushMessage};

/// Side effects of a committed transition, applied only after the commit.
///
/// A failed transition never produces an `Effects` value, so nothing here
/// can leak out of a rolled-back unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub evictions: Vec<CacheKey>,
    pub pushes: Vec<(UserId, PushMessage)>,
}

impl Effects {
    /// Start with the cache evictions every transition in `company_id` needs.
    pub fn for_company(company_id: CompanyId, year: i32) -> Self {
        Self {
            evictions: CacheKey::affected_by_transition(company_id, year).to_vec(),
            pushes: Vec::new(),
        }
    }

    pub fn push(&mut self, recipient: UserId, message: PushMessage) {
        self.pushes.push((recipient, message));
    }

    /// Evict first so a reader woken by a push never sees stale aggregates.
    /// Push failures are logged and otherwise ignored.
    pub fn apply(&self, cache: &dyn Cache, channel: &dyn PushChannel) {
        for key in &self.evictions {
            let key = key.to_string();
            cache.evict(&key);
            tracing::debug!(%key, "evicted cached aggregate");
        }

        for (recipient, message) in &self.pushes {
            match channel.notify(*recipient, message) {
                Ok(()) => tracing::debug!(%recipient, title = %message.title, "pushed notification"),
                Err(err) => tracing::warn!(%recipient, error = %err, "push notification dropped"),
            }
        }
    }
}
