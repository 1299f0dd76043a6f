//! HTTP API for the graduation check-in tracker.
//!
//! Exposed as a library so integration tests can build the router over the
//! in-memory backend.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
