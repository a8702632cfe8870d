//! # Repository Layer
//!
//! Data access for guild rows, built on the migration crate's query builder.

pub mod guild;

pub use guild::GuildRepository;
