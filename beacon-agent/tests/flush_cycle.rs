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

//! Flush cycle behaviour on the paused Tokio clock

mod common;

use beacon_agent::{Agent, CycleEnd, FlushObserver, FlushState, KeyValueStore, MemoryStore};
use beacon_core::{encode_batch, CooldownPolicy};
use common::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_two_clicks_delivered_in_one_batch() {
    let transport = ScriptedTransport::succeeding();
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    let started = Instant::now();
    agent.track("click", "btn1");
    agent.track("click", "btn2");
    agent.wait_idle().await;

    assert_eq!(
        transport.batches(),
        vec![vec![record("click", "btn1"), record("click", "btn2")]]
    );
    assert!(transport.send_times()[0] - started >= COOLDOWN);
    assert_eq!(agent.pending_count(), 0);
    assert!(!agent.pending_store().has().unwrap());

    let stats = agent.stats();
    assert_eq!(stats.cooldowns, 1);
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.events_delivered, 2);
    assert_eq!(agent.flush_state(), FlushState::Idle);
    assert!(!agent.is_flushing());
}

#[tokio::test(start_paused = true)]
async fn test_success_on_fifth_attempt() {
    let transport = ScriptedTransport::scripted(vec![false, false, false, false, true], false);
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    agent.track("a", "1");
    agent.wait_idle().await;

    assert_eq!(transport.attempts(), 5);
    assert_eq!(agent.stats().cooldowns, 5);
    assert_eq!(agent.pending_count(), 0);
    assert!(stored_records(&store).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_transport_exhausts_attempts() {
    let transport = ScriptedTransport::failing();
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    let started = Instant::now();
    agent.track("a", "1");
    agent.wait_idle().await;

    assert_eq!(transport.attempts(), 5);

    // Every attempt, the first included, is preceded by a full cooldown
    let mut previous = started;
    for at in transport.send_times() {
        assert!(at - previous >= COOLDOWN);
        previous = at;
    }

    assert_eq!(agent.pending_events(), vec![record("a", "1")]);
    assert_eq!(stored_records(&store), Some(agent.pending_events()));
    assert_eq!(
        store.get("StoredEvents").unwrap().unwrap(),
        encode_batch(&agent.pending_events()).unwrap()
    );

    let stats = agent.stats();
    assert_eq!(stats.cycles_started, 1);
    assert_eq!(stats.cycles_exhausted, 1);
    assert_eq!(stats.failures, 5);
    assert_eq!(stats.persists, 5);
    assert!(!agent.is_flushing());
}

#[tokio::test(start_paused = true)]
async fn test_track_after_exhaustion_starts_fresh_cycle() {
    let transport = ScriptedTransport::scripted(vec![false; 5], true);
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    agent.track("a", "1");
    agent.wait_idle().await;
    assert_eq!(agent.pending_count(), 1);

    agent.track("b", "2");
    agent.wait_idle().await;

    assert_eq!(agent.stats().cycles_started, 2);
    assert_eq!(transport.attempts(), 6);
    assert_eq!(
        transport.batches().last().unwrap(),
        &vec![record("a", "1"), record("b", "2")]
    );
    assert_eq!(agent.pending_count(), 0);
    assert!(stored_records(&store).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_tracks_starts_single_cycle() {
    let transport = ScriptedTransport::succeeding();
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), store);

    for i in 0..100 {
        agent.track("tick", i.to_string());
        assert_eq!(agent.stats().cycles_started, 1);
    }
    agent.wait_idle().await;

    assert_eq!(agent.stats().cycles_started, 1);
    let batches = transport.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 100);
    let unique: HashSet<_> = batches[0].iter().collect();
    assert_eq!(unique.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tracks_from_many_tasks_start_single_cycle() {
    let (transport, gate) = ScriptedTransport::gated(vec![], true);
    let agent = Arc::new(
        Agent::builder(transport.clone(), Arc::new(MemoryStore::new()))
            .cooldown(CooldownPolicy::fixed(Duration::from_millis(20)))
            .build(),
    );

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let agent = Arc::clone(&agent);
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                agent.track("tick", format!("{worker}-{i}"));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // No attempt can finish while the gate is closed, so the cycle is still running
    assert_eq!(agent.stats().cycles_started, 1);
    assert!(agent.is_flushing());

    gate.add_permits(100);
    agent.wait_idle().await;

    assert_eq!(agent.stats().cycles_started, 1);
    let delivered: Vec<_> = transport.batches().concat();
    assert_eq!(delivered.len(), 200);
    let unique: HashSet<_> = delivered.iter().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(agent.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_all_complete() {
    let transport = ScriptedTransport::scripted(vec![false], true);
    let agent = agent_with(Arc::clone(&transport), Arc::new(MemoryStore::new()));

    // Nothing running yet
    agent.wait_idle().await;

    agent.track("a", "1");
    let ((), (), idle) = tokio::join!(
        agent.wait_idle(),
        agent.wait_idle(),
        agent.shutdown(Duration::from_secs(30)),
    );

    assert!(idle);
    assert_eq!(transport.attempts(), 2);
    assert_eq!(agent.pending_count(), 0);
    assert!(!agent.is_flushing());
    assert_eq!(agent.flush_state(), FlushState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_late_arrival_joins_retry_after_failure() {
    let (transport, gate) = ScriptedTransport::gated(vec![false], true);
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    agent.track("a", "1");
    transport.wait_for_attempts(1).await;

    // First attempt is in flight with a snapshot of ["a"]
    agent.track("b", "2");
    assert_eq!(agent.stats().cycles_started, 1);
    gate.add_permits(2);
    agent.wait_idle().await;

    assert_eq!(
        transport.batches(),
        vec![
            vec![record("a", "1")],
            vec![record("a", "1"), record("b", "2")],
        ]
    );
    assert_eq!(agent.pending_count(), 0);
    assert!(stored_records(&store).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_late_arrival_survives_successful_attempt() {
    let (transport, gate) = ScriptedTransport::gated(vec![], true);
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), store);

    agent.track("a", "1");
    transport.wait_for_attempts(1).await;
    agent.track("b", "2");
    gate.add_permits(1);

    // First attempt succeeded for ["a"] only; "b" is still queued
    transport.wait_for_attempts(2).await;
    assert_eq!(agent.pending_events(), vec![record("b", "2")]);

    gate.add_permits(1);
    agent.wait_idle().await;

    assert_eq!(
        transport.batches(),
        vec![vec![record("a", "1")], vec![record("b", "2")]]
    );
    assert_eq!(agent.pending_count(), 0);
    assert_eq!(agent.stats().cycles_started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_persists_before_retry() {
    let (transport, gate) = ScriptedTransport::gated(vec![false], true);
    let store = Arc::new(MemoryStore::new());
    let agent = agent_with(Arc::clone(&transport), Arc::clone(&store));

    agent.track("a", "1");
    transport.wait_for_attempts(1).await;
    assert!(stored_records(&store).is_none());

    gate.add_permits(1);
    transport.wait_for_attempts(2).await;

    // Second attempt is in flight: the failure was persisted first
    assert_eq!(stored_records(&store), Some(vec![record("a", "1")]));

    gate.add_permits(1);
    agent.wait_idle().await;
    assert!(stored_records(&store).is_none());
}

#[derive(Default)]
struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl FlushObserver for RecordingObserver {
    fn on_track(&self) {
        self.calls.lock().push("track".into());
    }

    fn on_cycle_start(&self) {
        self.calls.lock().push("start".into());
    }

    fn on_attempt(&self, batch_len: usize, outcome: &beacon_agent::AttemptOutcome) {
        self.calls
            .lock()
            .push(format!("attempt:{}:{}", batch_len, outcome.is_delivered()));
    }

    fn on_cycle_end(&self, end: CycleEnd) {
        self.calls.lock().push(format!("end:{:?}", end));
    }
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_cycle() {
    let transport = ScriptedTransport::scripted(vec![false], true);
    let observer = Arc::new(RecordingObserver::default());
    let agent = beacon_agent::Agent::builder(transport, Arc::new(MemoryStore::new()))
        .cooldown(beacon_core::CooldownPolicy::fixed(COOLDOWN))
        .observer(observer.clone())
        .build();

    agent.track("a", "1");
    agent.wait_idle().await;

    assert_eq!(
        *observer.calls.lock(),
        vec![
            "track".to_string(),
            "start".to_string(),
            "attempt:1:false".to_string(),
            "attempt:1:true".to_string(),
            "end:Drained".to_string(),
        ]
    );
}
