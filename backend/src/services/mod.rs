//! Business logic services

pub mod catalog;
pub mod client;
pub mod currency;
pub mod expense;
pub mod lot;
pub mod manufacturer;
pub mod order;
pub mod pharmacy;
pub mod repricing;
pub mod sale;
pub mod sync;

pub use catalog::CatalogService;
pub use client::ClientService;
pub use currency::ExchangeRateService;
pub use expense::ExpenseService;
pub use lot::LotService;
pub use manufacturer::ManufacturerService;
pub use order::OrderService;
pub use pharmacy::PharmacyService;
pub use repricing::RepricingService;
pub use sale::SaleService;
pub use sync::SyncService;
