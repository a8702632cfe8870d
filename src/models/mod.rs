//! # Data Models
//!
//! Guild settings as the rest of the bot sees them: scalar columns plus the
//! per-channel feature document.

pub mod channel;
pub mod guild;
pub mod message;
pub mod slowmode;

pub use channel::{ChannelConfig, ChannelSettings, FeatureBlock, SCHEMA_VERSION};
pub use guild::{GuildRow, GuildTransformer};
pub use message::MessageConfig;
pub use slowmode::SlowmodeConfig;
