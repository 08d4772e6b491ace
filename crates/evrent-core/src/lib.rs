//! Core types for the EV rental client.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the wire envelopes, the domain entities, identity decoding and the
//! [`session::SessionStore`]; the storage backend is plugged in through
//! [`storage::TokenStorage`].

pub mod account;
pub mod booking;
pub mod claims;
pub mod envelope;
pub mod error;
pub mod fleet;
pub mod recency;
pub mod session;
pub mod storage;
pub mod token;

pub use error::{Error, Result};
