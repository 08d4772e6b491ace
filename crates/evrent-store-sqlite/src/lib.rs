//! SQLite-backed durable storage for the client session.
//!
//! Implements [`evrent_core::storage::TokenStorage`] over a single-file
//! database so a signed-in session survives process restarts.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteTokenStorage;
