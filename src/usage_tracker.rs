use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::usage_record::UsageRecord;

pub const DEFAULT_MAX_CALLS_PER_DAY: u32 = 5;
pub const DEFAULT_RETENTION_DAYS: u32 = 2;

/// Limits applied by the [`UsageTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub max_calls_per_day: u32,
    /// Records whose reset date is older than this many days are swept.
    pub retention_days: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_calls_per_day: DEFAULT_MAX_CALLS_PER_DAY,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Read-only projection of a usage record, taken after rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub current_usage: u32,
    pub remaining_calls: u32,
    pub max_calls: u32,
    pub can_make_call: bool,
    pub reset_date: NaiveDate,
    pub last_call_time: NaiveDateTime,
}

impl UsageSnapshot {
    fn of(record: &UsageRecord, max_calls: u32) -> Self {
        Self {
            current_usage: record.call_count,
            remaining_calls: record.remaining(max_calls),
            max_calls,
            can_make_call: record.has_capacity(max_calls),
            reset_date: record.reset_date,
            last_call_time: record.last_call_time,
        }
    }
}

/// In-memory, per-identifier daily call counter.
///
/// Each identifier's read-modify-write runs under that entry's shard guard,
/// so concurrent calls for one identifier never lose an increment while
/// unrelated identifiers proceed independently. Nothing is persisted.
pub struct UsageTracker {
    records: DashMap<String, UsageRecord>,
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: QuotaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// True while today's call count is below the daily limit.
    pub fn is_allowed(&self, identifier: &str) -> bool {
        let max_calls = self.policy.max_calls_per_day;
        self.with_record(identifier, |record| record.has_capacity(max_calls))
    }

    /// Charge one call to `identifier` and return the resulting snapshot.
    pub fn record_usage(&self, identifier: &str) -> UsageSnapshot {
        let now = self.clock.now();
        let max_calls = self.policy.max_calls_per_day;
        let snapshot = self.with_record(identifier, |record| {
            record.record_call(now);
            UsageSnapshot::of(record, max_calls)
        });

        tracing::info!(
            client_id = %identifier,
            current_usage = snapshot.current_usage,
            max_calls = max_calls,
            "Usage recorded"
        );
        snapshot
    }

    /// Charge one call only if the identifier is under its limit. The check
    /// and the increment happen under one entry guard, so parallel callers
    /// can never push the count past the limit. `Err` carries the unchanged
    /// snapshot.
    pub fn try_record_usage(&self, identifier: &str) -> Result<UsageSnapshot, UsageSnapshot> {
        let now = self.clock.now();
        let max_calls = self.policy.max_calls_per_day;
        let outcome = self.with_record(identifier, |record| {
            if !record.has_capacity(max_calls) {
                return Err(UsageSnapshot::of(record, max_calls));
            }
            record.record_call(now);
            Ok(UsageSnapshot::of(record, max_calls))
        });

        if let Ok(snapshot) = &outcome {
            tracing::info!(
                client_id = %identifier,
                current_usage = snapshot.current_usage,
                max_calls = max_calls,
                "Usage recorded"
            );
        }
        outcome
    }

    pub fn usage_info(&self, identifier: &str) -> UsageSnapshot {
        let max_calls = self.policy.max_calls_per_day;
        self.with_record(identifier, |record| UsageSnapshot::of(record, max_calls))
    }

    /// Drop every record whose reset date is older than the retention window.
    /// Returns the number of records removed.
    pub fn cleanup(&self) -> usize {
        let cutoff = self.clock.today() - Duration::days(i64::from(self.policy.retention_days));
        let before = self.records.len();

        self.records.retain(|_, record| !record.is_expired(cutoff));

        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::info!(removed, %cutoff, "Cleaned up old usage records");
        }
        removed
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.records.len()
    }

    /// Run `f` on the identifier's record with the shard guard held, creating
    /// the record on first use and applying the day-rollover rule first.
    fn with_record<T>(&self, identifier: &str, f: impl FnOnce(&mut UsageRecord) -> T) -> T {
        let now = self.clock.now();
        let today = self.clock.today();

        let mut entry = self
            .records
            .entry(identifier.to_string())
            .or_insert_with(|| UsageRecord::new(identifier, now));

        if entry.reset_date != today {
            tracing::debug!(
                client_id = %identifier,
                previous = %entry.reset_date,
                %today,
                "Resetting daily usage"
            );
            let rolled = entry.rolled_over(today);
            *entry = rolled;
        }

        f(entry.value_mut())
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(QuotaPolicy::default())
    }
}
