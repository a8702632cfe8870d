//! Per-channel slowmode settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SettingsError;

pub const LIMIT_MIN: u32 = 1;
pub const LIMIT_MAX: u32 = 30;
pub const DECAY_MIN: u32 = 1;
pub const DECAY_MAX: u32 = 300;

/// Messages allowed per user within `decay` seconds while enabled.
///
/// Bounds are enforced by the setters only. Stored values outside the bounds
/// load as-is so a document written by another tool is never rewritten
/// behind the operator's back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowmodeConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default = "default_decay")]
    decay: u32,
    #[serde(flatten)]
    extras: Map<String, Value>,
}

impl Default for SlowmodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_limit(),
            decay: default_decay(),
            extras: Map::new(),
        }
    }
}

impl SlowmodeConfig {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn decay(&self) -> u32 {
        self.decay
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_limit(&mut self, limit: i64) -> Result<(), SettingsError> {
        self.limit = bounded("limit", limit, LIMIT_MIN, LIMIT_MAX)?;
        Ok(())
    }

    pub fn set_decay(&mut self, decay: i64) -> Result<(), SettingsError> {
        self.decay = bounded("decay", decay, DECAY_MIN, DECAY_MAX)?;
        Ok(())
    }

    /// Enable with both values checked up front; nothing changes on error.
    pub fn enable(&mut self, limit: i64, decay: i64) -> Result<(), SettingsError> {
        let limit = bounded("limit", limit, LIMIT_MIN, LIMIT_MAX)?;
        let decay = bounded("decay", decay, DECAY_MIN, DECAY_MAX)?;
        self.enabled = true;
        self.limit = limit;
        self.decay = decay;
        Ok(())
    }
}

fn bounded(field: &'static str, value: i64, min: u32, max: u32) -> Result<u32, SettingsError> {
    if value < i64::from(min) || value > i64::from(max) {
        return Err(SettingsError::OutOfRange {
            field,
            value,
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(value as u32)
}

fn default_limit() -> u32 {
    1
}

fn default_decay() -> u32 {
    5
}
