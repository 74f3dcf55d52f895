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

//! Cooldown policy for flush cycles.
//!
//! A cooldown always precedes a send attempt, including the first one, so
//! that bursts of tracked events coalesce into a single batch.

use rand::random;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CooldownPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl CooldownPolicy {
    /// Same delay before every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay doubles with each consecutive failure, capped at `max_delay`.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.multiplier == 1.0 && self.jitter == 0.0
    }

    /// Delay before the next attempt, given the number of consecutive
    /// failures seen so far in the current cycle.
    pub fn delay_for_attempt(&self, consecutive_failures: u32) -> Duration {
        if self.is_fixed() {
            return self.initial_delay;
        }

        let exponent = consecutive_failures.min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let jitter_factor = 1.0 + (random::<f64>() - 0.5) * 2.0 * self.jitter;
        let jittered = base * jitter_factor;
        let clamped = jittered.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(clamped)
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(crate::config::DEFAULT_COOLDOWN_SECS))
    }
}
