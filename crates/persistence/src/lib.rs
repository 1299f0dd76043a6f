//! Persistence layer for the gradcheck backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Postgres repositories implementing the domain storage traits
//! - In-memory backends for single-node runs and tests
//! - The Postgres change listener feeding the roster change feed

pub mod db;
pub mod entities;
pub mod listener;
pub mod memory;
pub mod metrics;
pub mod repositories;
