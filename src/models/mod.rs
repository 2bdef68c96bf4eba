//! Core data models for the content admin backend.
//!
//! Stored objects and ledger records map to SQLite rows via `sqlx::FromRow`
//! and serialize as JSON via `serde`. Content resources are schemaless JSON
//! documents validated through their typed bodies.

pub mod admin;
pub mod document;
pub mod ledger;
pub mod object;
pub mod upload;
