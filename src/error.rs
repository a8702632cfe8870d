//! # Error Handling
//!
//! Errors raised by the guild settings model, the guild cache and the command
//! layer. Storage failures keep their statement context for logs; the text a
//! chat user sees comes from [`CacheError::user_message`] and never includes it.

use std::fmt;

use migration::QueryError;
use thiserror::Error;

/// A mutation was rejected before touching the in-memory settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// A part of a stored settings document that could not be read.
///
/// Non-fatal: the affected part is skipped and the rest of the document is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializationWarning {
    pub guild_id: String,
    /// Where in the document the problem is, e.g. `channels` or `channels.42.slowmode`.
    pub location: String,
    pub message: String,
}

impl DeserializationWarning {
    pub fn new(guild_id: &str, location: impl Into<String>, message: impl fmt::Display) -> Self {
        let warning = Self {
            guild_id: guild_id.to_string(),
            location: location.into(),
            message: message.to_string(),
        };
        tracing::warn!(
            guild_id = %warning.guild_id,
            location = %warning.location,
            "ignoring unreadable guild settings: {}",
            warning.message
        );
        warning
    }
}

impl fmt::Display for DeserializationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "guild {}: unreadable {}: {}",
            self.guild_id, self.location, self.message
        )
    }
}

/// Errors raised by the guild cache and repository.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("guild {guild_id} does not exist")]
    TenantNotFound { guild_id: String },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to serialize channels for guild {guild_id}: {source}")]
    Serialize {
        guild_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn tenant_not_found(guild_id: &str) -> Self {
        Self::TenantNotFound {
            guild_id: guild_id.to_string(),
        }
    }

    /// Text safe to show to a chat user.
    pub fn user_message(&self) -> String {
        match self {
            CacheError::TenantNotFound { .. } => {
                "Something went wrong while trying to get the guild settings, please contact one of my developers to look into this issue.".to_string()
            }
            CacheError::Query(_) | CacheError::Serialize { .. } => {
                "Failed to save the guild settings, please try again later.".to_string()
            }
            CacheError::Settings(err) => format!("Invalid setting: {err}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DbErr;

    #[test]
    fn user_message_hides_statement_text() {
        let err = CacheError::from(QueryError::execution(
            "UPDATE \"guilds\" SET \"channels\" = '{}'",
            DbErr::Custom("disk full".to_string()),
        ));
        let message = err.user_message();
        assert!(!message.contains("UPDATE"));
        assert!(!message.contains("disk full"));
        assert!(err.to_string().contains("UPDATE"));
    }

    #[test]
    fn settings_error_reads_naturally() {
        let err = SettingsError::OutOfRange {
            field: "limit",
            value: 31,
            min: 1,
            max: 30,
        };
        assert_eq!(err.to_string(), "limit must be between 1 and 30, got 31");
    }
}
