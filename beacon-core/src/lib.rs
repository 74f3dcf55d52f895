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

//! Beacon Core
//!
//! Data types shared by the Beacon agent: the event record, the batch
//! wire/storage codec, configuration and the cooldown policy.

pub mod batch;
pub mod config;
pub mod error;
pub mod policy;
pub mod record;

pub use batch::{decode_batch, encode_batch, Batch};
pub use config::{
    AgentConfig, DEFAULT_COOLDOWN_SECS, DEFAULT_ENDPOINT, DEFAULT_MAX_SEND_ATTEMPTS,
    DEFAULT_STORAGE_KEY,
};
pub use error::{BeaconError, Result};
pub use policy::CooldownPolicy;
pub use record::EventRecord;
