//! Configuration for MeshBases, their proxies and the probe manager.

use meshnet_pingpong::PingPongConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::access::CoherenceSpecification;
use crate::policy::DEFAULT_RPC_WAIT_MS;

/// Settings shared by a MeshBase and every proxy it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Timers of every proxy endpoint.
    pub pingpong: PingPongConfig,
    /// Wait for a partner when the caller does not give a timeout (ms).
    pub default_rpc_wait_ms: u64,
    /// Wait for `try_to_obtain_lock` when none is given (ms).
    pub try_to_obtain_lock_timeout_ms: u64,
    /// Wait for `try_to_obtain_home_replica` when none is given (ms).
    pub try_to_obtain_home_timeout_ms: u64,
    /// Convey snapshots that claim home and lock, so receivers point back at us.
    pub points_replicas_to_itself: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            pingpong: PingPongConfig::default(),
            default_rpc_wait_ms: DEFAULT_RPC_WAIT_MS,
            try_to_obtain_lock_timeout_ms: 5000,
            try_to_obtain_home_timeout_ms: 5000,
            points_replicas_to_itself: false,
        }
    }
}

impl ReplConfig {
    /// Config with the given endpoint timers and default waits.
    pub fn new(pingpong: PingPongConfig) -> Self {
        Self {
            pingpong,
            ..Default::default()
        }
    }

    /// Load from a `.toml` or `.json` file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}

/// Settings of a probe manager and the shadows it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Coherence of shadows whose access path does not ask for one.
    pub default_coherence: CoherenceSpecification,
    /// Settings of every shadow MeshBase.
    pub shadow: ReplConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            default_coherence: CoherenceSpecification::default(),
            shadow: ReplConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Config with the given default coherence.
    pub fn new(default_coherence: CoherenceSpecification) -> Self {
        Self {
            default_coherence,
            ..Default::default()
        }
    }
}
