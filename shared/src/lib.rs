//! Shared types and models for the Pharmacy Management Platform
//!
//! This crate contains the domain model plus the pure pricing, inventory
//! and synchronization rules shared between the backend services and the
//! sync daemon.

pub mod models;
pub mod sync;
pub mod types;
pub mod validation;

pub use models::*;
pub use sync::*;
pub use types::*;
pub use validation::*;
