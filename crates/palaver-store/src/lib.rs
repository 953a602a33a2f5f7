//! # palaver-store
//!
//! SQLite-backed document store for the Palaver chat service.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. The server owns the handle behind an async mutex so every store
//! call is a suspension point for the event loop.

pub mod channels;
pub mod database;
pub mod memberships;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod moderation;
pub mod users;

mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
