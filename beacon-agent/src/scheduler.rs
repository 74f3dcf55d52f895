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

//! Flush cycle scheduling
//!
//! A flush cycle repeatedly waits out a cooldown, sends a snapshot of the
//! buffer and interprets the outcome:
//! - success: the sent entries leave the buffer and the pending store is
//!   cleared
//! - failure: the buffer is persisted and one attempt is used up
//!
//! The cycle stops when the buffer drains or attempts run out. Exhaustion
//! leaves events queued for the next trigger. At most one cycle runs at a
//! time.

use crate::buffer::{BufferEntry, EventBuffer};
use crate::observe::{AttemptOutcome, CycleEnd, FlushObserver, FlushStats, FlushStatsSnapshot};
use crate::store::PendingStore;
use crate::transport::Transport;
use beacon_core::{encode_batch, CooldownPolicy};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    CoolingDown,
    Sending,
    Stopped,
}

impl FlushState {
    pub fn is_active(self) -> bool {
        matches!(self, FlushState::CoolingDown | FlushState::Sending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushEvent {
    /// A cycle was triggered
    Start,
    /// Cooldown delay elapsed
    CooldownElapsed,
    /// Attempt finished and another one follows
    Continue,
    /// Cycle is over (drained or exhausted)
    Stop,
    /// Cycle exited
    Reset,
}

#[derive(Debug, Error)]
#[error("Invalid transition: {current:?} -> {event:?}")]
pub struct InvalidTransition {
    pub current: FlushState,
    pub event: FlushEvent,
}

impl FlushState {
    pub fn transition(self, event: FlushEvent) -> Result<FlushState, InvalidTransition> {
        use FlushEvent::*;
        use FlushState::*;

        let next = match (self, event) {
            (Idle, Start) => CoolingDown,
            (CoolingDown, CooldownElapsed) => Sending,
            (Sending, Continue) => CoolingDown,
            (s, Stop) if s.is_active() => Stopped,
            (Stopped, Reset) => Idle,
            _ => {
                return Err(InvalidTransition {
                    current: self,
                    event,
                })
            }
        };

        Ok(next)
    }
}

pub struct FlushScheduler {
    buffer: Arc<EventBuffer>,
    transport: Arc<dyn Transport>,
    pending: PendingStore,
    policy: CooldownPolicy,
    max_send_attempts: u32,
    active: AtomicBool,
    state: Mutex<FlushState>,
    /// `true` while no cycle is running or about to be re-armed
    idle: watch::Sender<bool>,
    stats: FlushStats,
    observers: RwLock<Vec<Arc<dyn FlushObserver>>>,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<EventBuffer>,
        transport: Arc<dyn Transport>,
        pending: PendingStore,
        policy: CooldownPolicy,
        max_send_attempts: u32,
    ) -> Self {
        Self {
            buffer,
            transport,
            pending,
            policy,
            max_send_attempts,
            active: AtomicBool::new(false),
            state: Mutex::new(FlushState::Idle),
            idle: watch::channel(true).0,
            stats: FlushStats::default(),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn FlushObserver>) {
        self.observers.write().push(observer);
    }

    pub fn state(&self) -> FlushState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn notify_track(&self) {
        self.stats.record_track();
        for observer in self.observers.read().iter() {
            observer.on_track();
        }
    }

    /// Start a flush cycle unless one is already running.
    ///
    /// Returns `true` if this call started the cycle. Outside a Tokio runtime
    /// nothing is started and events stay queued.
    pub fn trigger(self: &Arc<Self>) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("No async runtime, flush deferred: {}", e);
                self.active.store(false, Ordering::Release);
                self.mark_idle_if_inactive();
                return false;
            }
        };

        self.idle.send_replace(false);
        self.advance(FlushEvent::Start);
        self.stats.record_cycle_start();
        for observer in self.observers.read().iter() {
            observer.on_cycle_start();
        }

        let cycle = self.stats.snapshot().cycles_started;
        let this = Arc::clone(self);
        let span = info_span!("flush_cycle", cycle);
        runtime.spawn(async move { this.run().await }.instrument(span));
        true
    }

    /// Wait until no flush cycle is running, including cycles re-armed by
    /// late arrivals. Any number of callers may wait concurrently.
    pub async fn wait_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    fn mark_idle_if_inactive(&self) {
        // Checked under the channel lock so a concurrent trigger's
        // `send_replace(false)` is never overwritten.
        self.idle.send_if_modified(|idle| {
            if *idle || self.is_active() {
                return false;
            }
            *idle = true;
            true
        });
    }

    /// Persist the full buffer, replacing any earlier snapshot.
    ///
    /// Failures are logged and counted, never retried here.
    pub fn persist(&self) -> bool {
        let records = self.buffer.records();
        match self.pending.save(&records) {
            Ok(()) => {
                debug!("Persisted {} pending events", records.len());
                self.stats.record_persist(true);
                true
            }
            Err(e) => {
                warn!("Failed to persist pending events: {}", e);
                self.stats.record_persist(false);
                false
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let end = self.run_cycle().await;

        self.advance(FlushEvent::Stop);
        self.advance(FlushEvent::Reset);
        self.stats.record_cycle_end(end);
        self.active.store(false, Ordering::Release);

        for observer in self.observers.read().iter() {
            observer.on_cycle_end(end);
        }

        match end {
            CycleEnd::Drained => {
                // A track() between the last count check and releasing the
                // guard saw an active cycle and did not start one.
                if !self.buffer.is_empty() {
                    debug!("Late events queued after cycle end, re-arming");
                    self.trigger();
                }
            }
            CycleEnd::Exhausted => {
                info!(
                    "Send attempts exhausted, {} events remain queued",
                    self.buffer.count()
                );
            }
        }

        self.mark_idle_if_inactive();
    }

    async fn run_cycle(&self) -> CycleEnd {
        let mut attempts_left = self.max_send_attempts;
        let mut consecutive_failures = 0u32;

        while attempts_left > 0 {
            if self.buffer.is_empty() {
                return CycleEnd::Drained;
            }

            let delay = self.policy.delay_for_attempt(consecutive_failures);
            self.stats.record_cooldown();
            debug!("Cooling down for {:?}", delay);
            tokio::time::sleep(delay).await;
            self.advance(FlushEvent::CooldownElapsed);

            let batch = self.buffer.snapshot();
            if batch.is_empty() {
                return CycleEnd::Drained;
            }

            let outcome = self.attempt(&batch).await;
            self.stats.record_attempt(batch.len(), &outcome);
            for observer in self.observers.read().iter() {
                observer.on_attempt(batch.len(), &outcome);
            }

            match outcome {
                AttemptOutcome::Delivered => {
                    let removed = self.buffer.remove_all(batch.iter().map(|entry| &entry.id));
                    debug!("Delivered batch of {} events", removed);
                    if let Err(e) = self.pending.delete() {
                        warn!("Failed to clear pending events: {}", e);
                    }
                    consecutive_failures = 0;
                }
                AttemptOutcome::Failed { reason } => {
                    warn!("Failed to send {} events: {}", batch.len(), reason);
                    self.persist();
                    attempts_left -= 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            if attempts_left == 0 {
                return CycleEnd::Exhausted;
            }
            if self.buffer.is_empty() {
                return CycleEnd::Drained;
            }
            self.advance(FlushEvent::Continue);
        }

        CycleEnd::Exhausted
    }

    async fn attempt(&self, batch: &[BufferEntry]) -> AttemptOutcome {
        let body = match encode_batch(batch.iter().map(|entry| &entry.record)) {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        debug!("Sending batch of {} events", batch.len());
        match self.transport.send(body.into_bytes()).await {
            Ok(()) => AttemptOutcome::Delivered,
            Err(e) => AttemptOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn advance(&self, event: FlushEvent) {
        let mut state = self.state.lock();
        match state.transition(event) {
            Ok(next) => *state = next,
            Err(e) => error!("{}", e),
        }
    }
}
