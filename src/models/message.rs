//! Welcome and goodbye message blocks.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::SettingsError;

/// Longest message body a channel may store.
pub const MESSAGE_MAX_LEN: usize = 2000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default)]
    enabled: bool,
    /// Outer `None` means the key was absent; `Some(None)` is a stored `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    message: Option<Option<String>>,
    #[serde(flatten)]
    extras: Map<String, Value>,
}

impl MessageConfig {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Custom text, or `None` when the bot's default text should be used.
    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().and_then(|text| text.as_deref())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_message(&mut self, message: Option<String>) -> Result<(), SettingsError> {
        if let Some(text) = &message {
            if text.trim().is_empty() {
                return Err(SettingsError::Empty { field: "message" });
            }
            let len = text.chars().count();
            if len > MESSAGE_MAX_LEN {
                return Err(SettingsError::OutOfRange {
                    field: "message length",
                    value: len as i64,
                    min: 1,
                    max: MESSAGE_MAX_LEN as i64,
                });
            }
        }
        self.message = message.map(Some);
        Ok(())
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
