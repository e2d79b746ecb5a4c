//! Engine configuration.
//!
//! Loadable from TOML; every field has a serde default so a partial (or
//! empty) file yields a working config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Staff group the per-ticket sub-channels are created in.
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl EngineConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle knobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle hours after which the reaper closes a session.
    #[serde(default = "d_24")]
    pub inactivity_threshold_hours: u32,
    /// How often the stale-session reaper runs.
    #[serde(default = "d_300")]
    pub reaper_interval_secs: u64,
    /// How often the pointer auditor runs.
    #[serde(default = "d_600")]
    pub audit_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_hours: 24,
            reaper_interval_secs: 300,
            audit_interval_secs: 600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound queue knobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Hard cap on sends within any trailing 60-second window.
    #[serde(default = "d_30")]
    pub max_per_minute: usize,
    /// Messages sent back-to-back before the drain loop yields.
    #[serde(default = "d_5")]
    pub burst_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 30,
            burst_limit: 5,
        }
    }
}

fn d_24() -> u32 {
    24
}
fn d_300() -> u64 {
    300
}
fn d_600() -> u64 {
    600
}
fn d_30() -> usize {
    30
}
fn d_5() -> usize {
    5
}
