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

#![allow(dead_code)]

use async_trait::async_trait;
use beacon_agent::{Agent, KeyValueStore, MemoryStore, Transport, TransportError};
use beacon_core::{decode_batch, CooldownPolicy, EventRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

pub const COOLDOWN: Duration = Duration::from_secs(2);

/// Transport whose outcomes follow a script, then a default.
///
/// With a gate, each send records its batch and then blocks until the test
/// releases a permit, which keeps an attempt in flight on demand.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<bool>>,
    default_ok: bool,
    sent: Mutex<Vec<(Instant, Vec<EventRecord>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn succeeding() -> Arc<Self> {
        Self::scripted(Vec::new(), true)
    }

    pub fn failing() -> Arc<Self> {
        Self::scripted(Vec::new(), false)
    }

    pub fn scripted(script: Vec<bool>, default_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default_ok,
            sent: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated(script: Vec<bool>, default_ok: bool) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(Self {
            script: Mutex::new(script.into()),
            default_ok,
            sent: Mutex::new(Vec::new()),
            gate: Some(Arc::clone(&gate)),
        });
        (transport, gate)
    }

    pub fn batches(&self) -> Vec<Vec<EventRecord>> {
        self.sent.lock().iter().map(|(_, batch)| batch.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().len()
    }

    /// Sleep on the paused clock until `n` attempts have been made.
    pub async fn wait_for_attempts(&self, n: usize) {
        while self.attempts() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let raw = String::from_utf8(body).map_err(|e| TransportError::Request(e.to_string()))?;
        let batch = decode_batch(&raw).map_err(|e| TransportError::Request(e.to_string()))?;
        self.sent.lock().push((Instant::now(), batch.into_events()));

        if let Some(gate) = &self.gate {
            gate.acquire().await.map(|permit| permit.forget()).ok();
        }

        let ok = self.script.lock().pop_front().unwrap_or(self.default_ok);
        if ok {
            Ok(())
        } else {
            Err(TransportError::Status(500))
        }
    }
}

pub fn agent_with(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> Agent {
    Agent::builder(transport, store)
        .cooldown(CooldownPolicy::fixed(COOLDOWN))
        .max_send_attempts(5)
        .build()
}

pub fn stored_records(store: &MemoryStore) -> Option<Vec<EventRecord>> {
    store
        .get("StoredEvents")
        .unwrap()
        .map(|raw| decode_batch(&raw).unwrap().into_events())
}

pub fn record(kind: &str, data: &str) -> EventRecord {
    EventRecord::new(kind, data)
}
