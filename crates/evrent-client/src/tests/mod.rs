//! End-to-end tests against an in-process fake backend.

mod aggregations;
mod resources;
