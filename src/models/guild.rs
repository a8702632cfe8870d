//! In-memory view of one guild row.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{DeserializationWarning, SettingsError};
use crate::models::channel::{ChannelConfig, ChannelSettings};

pub const DEFAULT_LOCALE: &str = "en_US";

/// Scalar columns of the guilds table that the transformer exposes.
pub const SCALAR_COLUMNS: [&str; 5] = ["name", "locale", "prefix", "levels", "modlog"];

/// A guild row as read from the store, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildRow {
    pub id: String,
    pub name: String,
    pub locale: Option<String>,
    pub prefix: Option<String>,
    pub levels: bool,
    pub modlog: Option<String>,
    pub channels: Option<String>,
}

/// Typed, mutable settings of one guild.
///
/// Scalar setters record which columns changed so a save only writes those;
/// the channels document is always written whole.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildTransformer {
    id: String,
    name: String,
    locale: String,
    prefix: Option<String>,
    levels: bool,
    modlog: Option<String>,
    channels: ChannelSettings,
    dirty: BTreeSet<&'static str>,
    warnings: Vec<DeserializationWarning>,
}

impl GuildTransformer {
    pub fn from_row(row: GuildRow) -> Self {
        let (channels, warnings) = ChannelSettings::parse(&row.id, row.channels.as_deref());
        Self {
            locale: row
                .locale
                .filter(|locale| !locale.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            id: row.id,
            name: row.name,
            prefix: row.prefix,
            levels: row.levels,
            modlog: row.modlog,
            channels,
            dirty: BTreeSet::new(),
            warnings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn levels(&self) -> bool {
        self.levels
    }

    pub fn modlog(&self) -> Option<&str> {
        self.modlog.as_deref()
    }

    /// Scalar settings keyed by column name.
    pub fn scalar_settings(&self) -> BTreeMap<&'static str, Value> {
        SCALAR_COLUMNS
            .iter()
            .map(|column| (*column, self.scalar(column)))
            .collect()
    }

    fn scalar(&self, column: &str) -> Value {
        match column {
            "name" => Value::from(self.name.as_str()),
            "locale" => Value::from(self.locale.as_str()),
            "prefix" => self.prefix.clone().map(Value::from).unwrap_or(Value::Null),
            "levels" => Value::from(self.levels),
            "modlog" => self.modlog.clone().map(Value::from).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), SettingsError> {
        let name = non_empty("name", name)?;
        self.name = name;
        self.dirty.insert("name");
        Ok(())
    }

    pub fn set_locale(&mut self, locale: &str) -> Result<(), SettingsError> {
        let locale = non_empty("locale", locale)?;
        self.locale = locale;
        self.dirty.insert("locale");
        Ok(())
    }

    /// `None` restores the bot's default prefix.
    pub fn set_prefix(&mut self, prefix: Option<&str>) -> Result<(), SettingsError> {
        self.prefix = prefix.map(|p| non_empty("prefix", p)).transpose()?;
        self.dirty.insert("prefix");
        Ok(())
    }

    pub fn set_levels(&mut self, enabled: bool) {
        self.levels = enabled;
        self.dirty.insert("levels");
    }

    pub fn set_modlog(&mut self, channel_id: Option<&str>) -> Result<(), SettingsError> {
        self.modlog = channel_id.map(|c| non_empty("modlog", c)).transpose()?;
        self.dirty.insert("modlog");
        Ok(())
    }

    /// Scalar columns changed since load or the last successful save.
    pub fn dirty_scalars(&self) -> Vec<(&'static str, Value)> {
        self.dirty
            .iter()
            .map(|column| (*column, self.scalar(column)))
            .collect()
    }

    pub(crate) fn mark_saved(&mut self) {
        self.dirty.clear();
    }

    pub fn channels(&self) -> &ChannelSettings {
        &self.channels
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelConfig> {
        self.channels.get(channel_id)
    }

    /// The channel's settings, created empty when the channel has none yet.
    pub fn channel_mut(&mut self, channel_id: &str) -> &mut ChannelConfig {
        self.channels.get_or_create(channel_id)
    }

    pub fn channels_to_json(&self) -> Result<Value, serde_json::Error> {
        self.channels.to_json()
    }

    /// Problems found while reading the stored document.
    pub fn warnings(&self) -> &[DeserializationWarning] {
        &self.warnings
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, SettingsError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SettingsError::Empty { field });
    }
    Ok(value.to_string())
}
