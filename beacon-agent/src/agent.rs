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

//! Agent facade
//!
//! Owns the buffer, the pending store and the flush scheduler, and maps host
//! lifecycle notifications onto them:
//! - `Start`: adopt any persisted snapshot and flush it right away
//! - `Background` / `Terminate`: persist the whole buffer synchronously

use crate::buffer::EventBuffer;
use crate::observe::{FlushObserver, FlushStatsSnapshot};
use crate::scheduler::{FlushScheduler, FlushState};
use crate::store::{KeyValueStore, PendingStore};
use crate::transport::Transport;
use beacon_core::{AgentConfig, CooldownPolicy, EventRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host application lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Process or app initialised
    Start,
    /// Lost focus or moved to the background
    Background,
    /// About to terminate
    Terminate,
}

pub struct Agent {
    buffer: Arc<EventBuffer>,
    pending: PendingStore,
    scheduler: Arc<FlushScheduler>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::builder(transport, store).with_config(config).build()
    }

    pub fn builder(transport: Arc<dyn Transport>, store: Arc<dyn KeyValueStore>) -> AgentBuilder {
        AgentBuilder {
            transport,
            store,
            policy: CooldownPolicy::default(),
            max_send_attempts: beacon_core::DEFAULT_MAX_SEND_ATTEMPTS,
            storage_key: beacon_core::DEFAULT_STORAGE_KEY.to_string(),
            observers: Vec::new(),
        }
    }

    /// Queue an event and start a flush cycle if none is running.
    ///
    /// Never fails; delivery problems are handled in the background.
    pub fn track(&self, kind: impl Into<String>, data: impl Into<String>) {
        let id = self.buffer.add(EventRecord::new(kind, data));
        self.scheduler.notify_track();
        debug!(%id, "Tracked event");

        self.scheduler.trigger();
    }

    pub fn handle(&self, event: Lifecycle) {
        match event {
            Lifecycle::Start => {
                self.on_startup();
            }
            Lifecycle::Background | Lifecycle::Terminate => {
                self.on_suspend_or_terminate();
            }
        }
    }

    /// Adopt a previously persisted snapshot and start flushing it.
    ///
    /// A missing, unreadable or corrupt snapshot counts as "nothing pending";
    /// the stored value is left untouched for inspection and is overwritten by
    /// the next persist. Returns the number of adopted events.
    pub fn on_startup(&self) -> usize {
        let records = match self.pending.load() {
            Ok(Some(records)) => records,
            Ok(None) => {
                debug!("No pending events stored");
                return 0;
            }
            Err(e) => {
                warn!("Ignoring unreadable pending events: {}", e);
                return 0;
            }
        };

        let adopted = self.buffer.replace(records);
        info!("Loaded {} pending events from storage", adopted);

        if adopted > 0 {
            self.scheduler.trigger();
        }
        adopted
    }

    /// Persist the full buffer. Runs to completion before returning and does
    /// not depend on any in-flight send.
    pub fn on_suspend_or_terminate(&self) -> bool {
        self.scheduler.persist()
    }

    /// Persist, then give a running flush cycle up to `grace` to finish.
    ///
    /// Returns `true` if no cycle was left running.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.on_suspend_or_terminate();
        match tokio::time::timeout(grace, self.scheduler.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                info!(
                    "Flush still running after {:?}, {} events left persisted",
                    grace,
                    self.buffer.count()
                );
                false
            }
        }
    }

    /// Wait for the current flush cycle (and any it re-arms) to finish.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    pub fn pending_count(&self) -> usize {
        self.buffer.count()
    }

    pub fn pending_events(&self) -> Vec<EventRecord> {
        self.buffer.records()
    }

    pub fn is_flushing(&self) -> bool {
        self.scheduler.is_active()
    }

    pub fn flush_state(&self) -> FlushState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.scheduler.stats()
    }

    pub fn pending_store(&self) -> &PendingStore {
        &self.pending
    }
}

pub struct AgentBuilder {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    policy: CooldownPolicy,
    max_send_attempts: u32,
    storage_key: String,
    observers: Vec<Arc<dyn FlushObserver>>,
}

impl AgentBuilder {
    /// Take cooldown, attempt limit and storage key from `config`.
    pub fn with_config(self, config: &AgentConfig) -> Self {
        self.cooldown(config.cooldown_policy())
            .max_send_attempts(config.max_send_attempts)
            .storage_key(config.storage_key.clone())
    }

    pub fn cooldown(mut self, policy: CooldownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_send_attempts(mut self, attempts: u32) -> Self {
        self.max_send_attempts = attempts;
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn observer(mut self, observer: Arc<dyn FlushObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Agent {
        let buffer = Arc::new(EventBuffer::new());
        let pending = PendingStore::new(self.store, self.storage_key);
        let scheduler = Arc::new(FlushScheduler::new(
            Arc::clone(&buffer),
            self.transport,
            pending.clone(),
            self.policy,
            self.max_send_attempts,
        ));
        for observer in self.observers {
            scheduler.add_observer(observer);
        }

        Agent {
            buffer,
            pending,
            scheduler,
        }
    }
}
