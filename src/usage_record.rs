use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Daily call counter for one client identifier.
///
/// `call_count` only has meaning relative to `reset_date`. A record whose
/// `reset_date` is not today is stale and must pass through
/// [`UsageRecord::rolled_over`] before it is read or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub identifier: String,
    pub call_count: u32,
    pub reset_date: NaiveDate,
    pub last_call_time: NaiveDateTime,
}

impl UsageRecord {
    pub fn new(identifier: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            identifier: identifier.into(),
            call_count: 0,
            reset_date: now.date(),
            last_call_time: now,
        }
    }

    /// Day-rollover rule: a record from an earlier day comes back zeroed and
    /// dated `today`; a current record comes back unchanged.
    pub fn rolled_over(&self, today: NaiveDate) -> UsageRecord {
        if self.reset_date == today {
            return self.clone();
        }
        UsageRecord {
            call_count: 0,
            reset_date: today,
            ..self.clone()
        }
    }

    pub fn record_call(&mut self, now: NaiveDateTime) {
        self.call_count = self.call_count.saturating_add(1);
        self.last_call_time = now;
    }

    pub fn remaining(&self, max_calls: u32) -> u32 {
        max_calls.saturating_sub(self.call_count)
    }

    pub fn has_capacity(&self, max_calls: u32) -> bool {
        self.call_count < max_calls
    }

    /// True when `reset_date` is strictly before `cutoff`.
    pub fn is_expired(&self, cutoff: NaiveDate) -> bool {
        self.reset_date < cutoff
    }
}
