//! Shared utilities and common types for the gradcheck backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Password hashing with Argon2id
//! - Signed session tokens for admins and kiosks
//! - Common validation logic

pub mod jwt;
pub mod password;
pub mod validation;
