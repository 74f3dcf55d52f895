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

//! In-memory buffer of events not yet acknowledged by the collector.
//!
//! Every operation takes the lock for its own duration only. Callers never
//! hold it across an `.await`, so `track()` can append while a flush cycle
//! is waiting on the network.

use beacon_core::EventRecord;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Removal key assigned to an event on insertion. Never transmitted or
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEntry {
    pub id: EntryId,
    pub record: EventRecord,
}

#[derive(Debug, Default)]
pub struct EventBuffer {
    entries: Mutex<Vec<BufferEntry>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its removal key.
    pub fn add(&self, record: EventRecord) -> EntryId {
        let id = EntryId::generate();
        self.entries.lock().push(BufferEntry { id, record });
        id
    }

    /// All current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<BufferEntry> {
        self.entries.lock().clone()
    }

    /// Current records without their ids (the persisted form).
    pub fn records(&self) -> Vec<EventRecord> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Remove exactly the named entries. Ids that are no longer present are
    /// ignored; entries added after the ids were collected are kept.
    pub fn remove_all<'a, I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a EntryId>,
    {
        let ids: HashSet<EntryId> = ids.into_iter().copied().collect();
        if ids.is_empty() {
            return 0;
        }

        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| !ids.contains(&entry.id));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop the current contents and adopt `records` with fresh ids, under a
    /// single lock acquisition.
    pub fn replace<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = EventRecord>,
    {
        let mut entries = self.entries.lock();
        entries.clear();
        entries.extend(records.into_iter().map(|record| BufferEntry {
            id: EntryId::generate(),
            record,
        }));
        entries.len()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
