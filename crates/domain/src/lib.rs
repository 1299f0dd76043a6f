//! Domain layer for the gradcheck backend.
//!
//! This crate contains:
//! - Domain models (Graduate, roster statistics, kiosk outcomes)
//! - Business logic services (check-in state machine, change feed, snapshot cache)
//! - Storage traits implemented by the persistence crate
//! - Domain error types

pub mod models;
pub mod services;
