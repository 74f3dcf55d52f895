// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Flush cycle counters and observer hooks.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a flush cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleEnd {
    /// Buffer is empty; everything tracked so far was delivered
    Drained,
    /// Attempts ran out with events still queued
    Exhausted,
}

/// Result of one send attempt, as reported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Failed { reason: String },
}

impl AttemptOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered)
    }
}

/// Hooks invoked by the agent and its flush cycles. All methods default to
/// no-ops; implementations must not block.
pub trait FlushObserver: Send + Sync {
    fn on_track(&self) {}

    fn on_cycle_start(&self) {}

    fn on_attempt(&self, _batch_len: usize, _outcome: &AttemptOutcome) {}

    fn on_cycle_end(&self, _end: CycleEnd) {}
}

#[derive(Debug, Default)]
pub struct FlushStats {
    tracked: AtomicU64,
    cycles_started: AtomicU64,
    cycles_exhausted: AtomicU64,
    cooldowns: AtomicU64,
    attempts: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
    events_delivered: AtomicU64,
    persists: AtomicU64,
    persist_failures: AtomicU64,
}

impl FlushStats {
    pub(crate) fn record_track(&self) {
        self.tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle_start(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle_end(&self, end: CycleEnd) {
        if end == CycleEnd::Exhausted {
            self.cycles_exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cooldown(&self) {
        self.cooldowns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self, batch_len: usize, outcome: &AttemptOutcome) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if outcome.is_delivered() {
            self.deliveries.fetch_add(1, Ordering::Relaxed);
            self.events_delivered
                .fetch_add(batch_len as u64, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_persist(&self, ok: bool) {
        if ok {
            self.persists.fetch_add(1, Ordering::Relaxed);
        } else {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            tracked: self.tracked.load(Ordering::Relaxed),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_exhausted: self.cycles_exhausted.load(Ordering::Relaxed),
            cooldowns: self.cooldowns.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            persists: self.persists.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FlushStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStatsSnapshot {
    pub tracked: u64,
    pub cycles_started: u64,
    pub cycles_exhausted: u64,
    pub cooldowns: u64,
    pub attempts: u64,
    pub deliveries: u64,
    pub failures: u64,
    pub events_delivered: u64,
    pub persists: u64,
    pub persist_failures: u64,
}
