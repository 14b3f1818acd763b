//! Domain models for the Pharmacy Management Platform

mod advertisement;
mod catalog;
mod client;
mod currency;
mod depot;
mod expense;
mod lot;
mod manufacturer;
mod order;
mod pharmacy;
mod receipt;
mod requisition;
mod sale;
mod user;

pub use advertisement::*;
pub use catalog::*;
pub use client::*;
pub use currency::*;
pub use depot::*;
pub use expense::*;
pub use lot::*;
pub use manufacturer::*;
pub use order::*;
pub use pharmacy::*;
pub use receipt::*;
pub use requisition::*;
pub use sale::*;
pub use user::*;
