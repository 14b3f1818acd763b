//! Database models for the Pharmacy Management Platform
//!
//! Re-exports models from the shared crate; service-specific rows live
//! next to their services

pub use shared::models::*;
