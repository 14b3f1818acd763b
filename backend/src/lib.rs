//! Pharmacy Management Platform backend
//!
//! Currency-aware pricing, inventory and point-of-sale services for
//! Congolese pharmacies, plus the bidirectional sync engine that keeps a
//! local instance reconciled with the remote server. Consumed by the
//! `pharmsyncd` daemon and the integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
