//! # courier-store
//!
//! Persistent state a courier node relies on but does not own: client
//! profiles and their current owning node, relationship graphs, topic
//! membership, message history with per-recipient delivery state, mutual
//! requests, and the node directory.
//!
//! The node talks to it exclusively through the [`MessageStore`] trait.
//! [`SqliteStore`] is the bundled implementation; it wraps a synchronous
//! [`Database`] handle behind a mutex so it can be shared across tasks.

pub mod clients;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod mutual;
pub mod nodes;
pub mod store;
pub mod topics;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use store::{MessageStore, SqliteStore};
