//! Command handlers that go through the guild cache.

pub mod slowmode;

pub use slowmode::CommandError;
