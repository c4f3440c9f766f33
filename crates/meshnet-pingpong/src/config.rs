//! Timer configuration for ping-pong endpoints.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timer settings for one ping-pong endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingPongConfig {
    /// Delay before responding to a received token (ms).
    pub delta_respond_ms: u64,
    /// Delay before resending after a transport failure (ms).
    pub delta_resend_ms: u64,
    /// Delay after sending before assuming the token was lost (ms).
    pub delta_recover_ms: u64,
    /// Relative jitter applied to every delay, e.g. 0.02 for +/- 1%.
    pub random_variation: f64,
}

impl Default for PingPongConfig {
    fn default() -> Self {
        Self {
            delta_respond_ms: 1000,
            delta_resend_ms: 500,
            delta_recover_ms: 5000,
            random_variation: 0.02,
        }
    }
}

impl PingPongConfig {
    /// Create a config with the given respond/resend/recover delays and default jitter.
    pub fn new(delta_respond_ms: u64, delta_resend_ms: u64, delta_recover_ms: u64) -> Self {
        Self {
            delta_respond_ms,
            delta_resend_ms,
            delta_recover_ms,
            ..Default::default()
        }
    }

    /// Apply jitter to a base delay: `((r - 0.5) * variation + 1) * base` with `r` in [0, 1).
    pub fn jittered(&self, base_ms: u64) -> Duration {
        let r: f64 = rand::thread_rng().gen();
        jitter_with(base_ms, self.random_variation, r)
    }
}

pub(crate) fn jitter_with(base_ms: u64, variation: f64, r: f64) -> Duration {
    let factor = (r - 0.5) * variation + 1.0;
    let ms = (factor * base_ms as f64).max(0.0).round() as u64;
    Duration::from_millis(ms)
}
