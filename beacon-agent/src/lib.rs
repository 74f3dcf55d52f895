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

//! Beacon Agent
//!
//! Accumulates application events, delivers them to a collector in batches
//! after a short cooldown, retries failed deliveries a bounded number of
//! times and keeps unacknowledged events in durable storage across restarts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_agent::{Agent, FileStore, HttpTransport, Lifecycle};
//! use beacon_core::AgentConfig;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::load(None)?;
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let store = Arc::new(FileStore::new(&config.data_dir));
//! let agent = Agent::new(&config, transport, store);
//!
//! agent.handle(Lifecycle::Start);
//! agent.track("click", "btn1");
//! agent.handle(Lifecycle::Terminate);
//! ```

pub mod agent;
pub mod buffer;
pub mod observe;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use agent::{Agent, AgentBuilder, Lifecycle};
pub use buffer::{BufferEntry, EntryId, EventBuffer};
pub use observe::{AttemptOutcome, CycleEnd, FlushObserver, FlushStats, FlushStatsSnapshot};
pub use scheduler::{FlushEvent, FlushScheduler, FlushState, InvalidTransition};
pub use store::{FileStore, KeyValueStore, MemoryStore, PendingStore};
pub use transport::{HttpTransport, Transport, TransportError};
