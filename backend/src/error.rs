//! Error handling for the Pharmacy Management Platform

use thiserror::Error;
use uuid::Uuid;

use shared::models::PricingError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("No exchange rate recorded for USD conversion")]
    MissingExchangeRate,

    #[error("An order for {product} was already placed today")]
    DuplicateOrderToday { product: String },

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Lot ledger short by {shortfall} units on catalog entry {entry_id}")]
    LotShortfall { entry_id: Uuid, shortfall: i32 },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::MissingExchangeRate => AppError::MissingExchangeRate,
            PricingError::InvalidUnitCount => AppError::Validation {
                field: "units_per_box".to_string(),
                message: "Units per box must be strictly positive".to_string(),
            },
        }
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
