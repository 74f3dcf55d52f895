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

//! Batch wire/storage format
//!
//! The same JSON document is POSTed to the collector and written to the
//! pending store:
//!
//! ```json
//! { "events": [ { "type": "click", "data": "btn1" } ] }
//! ```
//!
//! Field names are fixed; snapshots persisted by earlier runs must keep
//! decoding.

use crate::error::Result;
use crate::record::EventRecord;
use serde::{Deserialize, Serialize};

/// A set of events encoded together for one transmission attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl Batch {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<EventRecord> {
        self.events
    }
}

/// Encode records as a batch document.
pub fn encode_batch<'a, I>(records: I) -> Result<String>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    #[derive(Serialize)]
    struct BatchRef<'a> {
        events: Vec<&'a EventRecord>,
    }

    let doc = BatchRef {
        events: records.into_iter().collect(),
    };
    Ok(serde_json::to_string(&doc)?)
}

/// Decode a batch document.
pub fn decode_batch(raw: &str) -> Result<Batch> {
    Ok(serde_json::from_str(raw)?)
}
