//! The per-guild channels document.
//!
//! Stored as one JSON object keyed by channel id. Each channel maps feature
//! block names to block settings:
//!
//! ```json
//! {"$schema_version": 1, "123456": {"slowmode": {"enabled": true, "limit": 5, "decay": 10}}}
//! ```
//!
//! Blocks this build does not know, blocks that fail to parse, unknown keys
//! inside known blocks and non-object top-level values are all carried through
//! a load/save cycle untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DeserializationWarning;
use crate::models::message::MessageConfig;
use crate::models::slowmode::SlowmodeConfig;

pub const SCHEMA_VERSION: u64 = 1;
pub const SCHEMA_VERSION_KEY: &str = "$schema_version";

/// A feature block this build understands, tagged by its key in the channel object.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureBlock {
    Slowmode(SlowmodeConfig),
    Welcome(MessageConfig),
    Goodbye(MessageConfig),
}

impl FeatureBlock {
    pub const SLOWMODE: &'static str = "slowmode";
    pub const WELCOME: &'static str = "welcome";
    pub const GOODBYE: &'static str = "goodbye";

    pub fn name(&self) -> &'static str {
        match self {
            FeatureBlock::Slowmode(_) => Self::SLOWMODE,
            FeatureBlock::Welcome(_) => Self::WELCOME,
            FeatureBlock::Goodbye(_) => Self::GOODBYE,
        }
    }

    /// `None` when `name` is not a known block.
    pub fn parse(name: &str, value: &Value) -> Option<Result<Self, serde_json::Error>> {
        let parsed = match name {
            Self::SLOWMODE => SlowmodeConfig::deserialize(value).map(FeatureBlock::Slowmode),
            Self::WELCOME => MessageConfig::deserialize(value).map(FeatureBlock::Welcome),
            Self::GOODBYE => MessageConfig::deserialize(value).map(FeatureBlock::Goodbye),
            _ => return None,
        };
        Some(parsed)
    }
}

/// Settings for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    slowmode: Option<SlowmodeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    welcome: Option<MessageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    goodbye: Option<MessageConfig>,
    /// Unknown or unreadable blocks, kept verbatim. Never shares a key with a typed block.
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl ChannelConfig {
    fn parse(
        guild_id: &str,
        channel_id: &str,
        blocks: Map<String, Value>,
        warnings: &mut Vec<DeserializationWarning>,
    ) -> Self {
        let mut channel = Self::default();
        for (name, value) in blocks {
            match FeatureBlock::parse(&name, &value) {
                Some(Ok(block)) => channel.set_block(block),
                Some(Err(err)) => {
                    warnings.push(DeserializationWarning::new(
                        guild_id,
                        format!("channels.{channel_id}.{name}"),
                        err,
                    ));
                    channel.other.insert(name, value);
                }
                None => {
                    debug!(guild_id, channel_id, block = %name, "keeping unknown feature block");
                    channel.other.insert(name, value);
                }
            }
        }
        channel
    }

    pub fn set_block(&mut self, block: FeatureBlock) {
        self.other.remove(block.name());
        match block {
            FeatureBlock::Slowmode(config) => self.slowmode = Some(config),
            FeatureBlock::Welcome(config) => self.welcome = Some(config),
            FeatureBlock::Goodbye(config) => self.goodbye = Some(config),
        }
    }

    pub fn slowmode(&self) -> Option<&SlowmodeConfig> {
        self.slowmode.as_ref()
    }

    /// The slowmode block, created with defaults when absent or unreadable.
    pub fn slowmode_mut(&mut self) -> &mut SlowmodeConfig {
        self.other.remove(FeatureBlock::SLOWMODE);
        self.slowmode.get_or_insert_with(SlowmodeConfig::default)
    }

    pub fn welcome(&self) -> Option<&MessageConfig> {
        self.welcome.as_ref()
    }

    pub fn welcome_mut(&mut self) -> &mut MessageConfig {
        self.other.remove(FeatureBlock::WELCOME);
        self.welcome.get_or_insert_with(MessageConfig::default)
    }

    pub fn goodbye(&self) -> Option<&MessageConfig> {
        self.goodbye.as_ref()
    }

    pub fn goodbye_mut(&mut self) -> &mut MessageConfig {
        self.other.remove(FeatureBlock::GOODBYE);
        self.goodbye.get_or_insert_with(MessageConfig::default)
    }

    /// A block this build does not interpret, as stored.
    pub fn opaque_block(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }
}

/// Every channel's settings for one guild.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    version: u64,
    channels: BTreeMap<String, ChannelConfig>,
    /// Top-level entries whose value is not an object, kept verbatim.
    other: BTreeMap<String, Value>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            channels: BTreeMap::new(),
            other: BTreeMap::new(),
        }
    }
}

impl ChannelSettings {
    /// Parse a stored document. Never fails: unreadable parts are reported as
    /// warnings and skipped. A missing or blank document is an empty mapping.
    pub fn parse(guild_id: &str, raw: Option<&str>) -> (Self, Vec<DeserializationWarning>) {
        let mut warnings = Vec::new();
        let raw = match raw.map(str::trim) {
            None | Some("") => return (Self::default(), warnings),
            Some(raw) => raw,
        };

        let document = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(document)) => document,
            Ok(other) => {
                warnings.push(DeserializationWarning::new(
                    guild_id,
                    "channels",
                    format!("expected a JSON object, found {}", json_kind(&other)),
                ));
                return (Self::default(), warnings);
            }
            Err(err) => {
                warnings.push(DeserializationWarning::new(guild_id, "channels", err));
                return (Self::default(), warnings);
            }
        };

        let mut settings = Self::default();
        for (key, value) in document {
            if key == SCHEMA_VERSION_KEY {
                match value.as_u64() {
                    Some(version) if version > SCHEMA_VERSION => {
                        tracing::warn!(
                            guild_id,
                            version,
                            "channels document was written by a newer schema version"
                        );
                        settings.version = version;
                    }
                    Some(_) => {}
                    None => warnings.push(DeserializationWarning::new(
                        guild_id,
                        SCHEMA_VERSION_KEY,
                        format!("expected an unsigned integer, found {}", json_kind(&value)),
                    )),
                }
                continue;
            }

            match value {
                Value::Object(blocks) => {
                    let channel = ChannelConfig::parse(guild_id, &key, blocks, &mut warnings);
                    settings.channels.insert(key, channel);
                }
                other => {
                    settings.other.insert(key, other);
                }
            }
        }

        (settings, warnings)
    }

    /// Canonical form of the whole document, keys sorted, version included.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut document = Map::new();
        for (key, value) in &self.other {
            document.insert(key.clone(), value.clone());
        }
        for (channel_id, channel) in &self.channels {
            document.insert(channel_id.clone(), serde_json::to_value(channel)?);
        }
        document.insert(SCHEMA_VERSION_KEY.to_string(), Value::from(self.version));
        Ok(Value::Object(document))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelConfig> {
        self.channels.get(channel_id)
    }

    /// The channel's settings, created empty when the channel has none yet.
    pub fn get_or_create(&mut self, channel_id: &str) -> &mut ChannelConfig {
        self.other.remove(channel_id);
        self.channels.entry(channel_id.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelConfig)> {
        self.channels.iter().map(|(id, channel)| (id.as_str(), channel))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> (ChannelSettings, Vec<DeserializationWarning>) {
        ChannelSettings::parse("G1", Some(&value.to_string()))
    }

    #[test]
    fn reads_the_documented_shape() {
        let (settings, warnings) =
            parse(json!({"123456": {"slowmode": {"enabled": true, "limit": 5, "decay": 10}}}));
        assert!(warnings.is_empty());

        let slowmode = settings.get("123456").unwrap().slowmode().unwrap();
        assert!(slowmode.enabled());
        assert_eq!((slowmode.limit(), slowmode.decay()), (5, 10));
        assert_eq!(settings.version(), SCHEMA_VERSION);
    }

    #[test]
    fn broken_json_yields_empty_settings_and_a_warning() {
        let (settings, warnings) = ChannelSettings::parse("G1", Some("{not json"));
        assert!(settings.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].location, "channels");

        let (settings, warnings) = ChannelSettings::parse("G1", Some("[1, 2]"));
        assert!(settings.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn missing_document_is_empty_without_warning() {
        for raw in [None, Some(""), Some("   ")] {
            let (settings, warnings) = ChannelSettings::parse("G1", raw);
            assert!(settings.is_empty());
            assert!(warnings.is_empty());
        }
    }

    #[test]
    fn malformed_block_does_not_discard_siblings() {
        let (settings, warnings) = parse(json!({
            "1": {
                "slowmode": {"enabled": "yes", "limit": -4},
                "welcome": {"enabled": true, "message": "hi"}
            }
        }));

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].location, "channels.1.slowmode");
        let channel = settings.get("1").unwrap();
        assert!(channel.slowmode().is_none());
        assert_eq!(channel.welcome().unwrap().message(), Some("hi"));
        assert_eq!(
            channel.opaque_block("slowmode"),
            Some(&json!({"enabled": "yes", "limit": -4}))
        );
    }

    #[test]
    fn unknown_content_round_trips() {
        let stored = json!({
            "$schema_version": 1,
            "note": "kept",
            "7": {
                "levels": {"multiplier": 2},
                "slowmode": {"enabled": false, "limit": 3, "decay": 9, "exempt": ["mods"]}
            }
        });
        let (settings, warnings) = parse(stored.clone());
        assert!(warnings.is_empty());
        assert_eq!(settings.to_json().unwrap(), stored);
    }

    #[test]
    fn parse_of_serialized_settings_is_identity() {
        let mut settings = ChannelSettings::default();
        settings.get_or_create("1").slowmode_mut().enable(4, 20).unwrap();
        settings
            .get_or_create("2")
            .goodbye_mut()
            .set_message(Some("bye".to_string()))
            .unwrap();

        let json = settings.to_json().unwrap().to_string();
        let (reparsed, warnings) = ChannelSettings::parse("G1", Some(&json));
        assert!(warnings.is_empty());
        assert_eq!(reparsed, settings);
    }

    #[test]
    fn rewriting_a_malformed_block_replaces_it() {
        let (mut settings, _) = parse(json!({"1": {"slowmode": "broken"}}));
        settings.get_or_create("1").slowmode_mut().set_enabled(true);

        let json = settings.to_json().unwrap();
        assert_eq!(json["1"]["slowmode"], json!({"enabled": true, "limit": 1, "decay": 5}));
    }

    #[test]
    fn newer_schema_version_is_preserved() {
        let (settings, warnings) = parse(json!({"$schema_version": 4}));
        assert!(warnings.is_empty());
        assert_eq!(settings.to_json().unwrap()["$schema_version"], json!(4));
    }

    #[test]
    fn output_is_canonical() {
        let (a, _) = ChannelSettings::parse("G1", Some(r#"{"b": {}, "a": {"slowmode": {"decay": 5, "enabled": true, "limit": 1}}}"#));
        let (b, _) = ChannelSettings::parse("G1", Some(r#"{"a": {"slowmode": {"limit": 1, "enabled": true, "decay": 5}}, "b": {}}"#));
        assert_eq!(
            a.to_json().unwrap().to_string(),
            b.to_json().unwrap().to_string()
        );
    }
}
