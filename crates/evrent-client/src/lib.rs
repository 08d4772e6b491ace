//! Authenticated data-access layer for the EV rental backend.
//!
//! Layers, leaf first:
//!
//! - [`pipeline::Pipeline`] sends requests with the current bearer token and
//!   recovers from an expired token with one coordinated refresh
//!   ([`refresh::RefreshGate`]).
//! - [`resource`] maps each REST resource to typed request/response shapes.
//! - [`cache::QueryCache`] keeps keyed, TTL-based read results with
//!   in-flight de-duplication, retry with backoff, and family invalidation.
//! - [`hooks::Aggregations`] computes cross-resource views the backend does
//!   not expose.
//!
//! [`Client`] ties them together around one shared
//! [`evrent_core::session::SessionStore`].

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod refresh;
pub mod resource;
pub mod retry;

pub use client::{Client, ResourceClient};
pub use config::ClientConfig;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
