//! Core data models for the file registry.
//!
//! These entities map to the `files` and `health_check` tables via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod file;
pub mod health;
