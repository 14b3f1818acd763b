//! Lot ledger models, lot numbering and FIFO planning

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character set for the random part of a generated lot number
pub const LOT_NUMBER_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%&*";

/// Prefix of every generated lot number
pub const LOT_NUMBER_PREFIX: &str = "lot-";

/// Length of the random part of a generated lot number
pub const LOT_NUMBER_RANDOM_LEN: usize = 10;

/// A discrete received batch of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub catalog_entry_id: Uuid,
    /// Supplier-provided or generated, unique across all lots
    pub lot_number: String,
    pub expires_on: NaiveDate,
    /// Set once at creation; drives FIFO ordering
    pub entered_on: NaiveDate,
    pub quantity: i32,
    /// Snapshot of the catalog entry's prices at creation
    pub unit_cost: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Generate a candidate lot number (`lot-` + 10 random charset characters)
///
/// Uniqueness is checked against storage by the caller; regenerate on
/// collision.
pub fn generate_lot_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = (0..LOT_NUMBER_RANDOM_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..LOT_NUMBER_CHARSET.len());
            LOT_NUMBER_CHARSET[idx] as char
        })
        .collect();
    format!("{}{}", LOT_NUMBER_PREFIX, suffix)
}

/// Whether a lot number matches the generated format
pub fn is_generated_lot_number(number: &str) -> bool {
    match number.strip_prefix(LOT_NUMBER_PREFIX) {
        Some(suffix) => {
            suffix.len() == LOT_NUMBER_RANDOM_LEN
                && suffix.bytes().all(|b| LOT_NUMBER_CHARSET.contains(&b))
        }
        None => false,
    }
}

/// One lot's share of a planned depletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub taken: i32,
}

/// Outcome of planning a FIFO depletion across a set of lots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepletionPlan {
    pub draws: Vec<LotDraw>,
    /// Units the lots could not cover; zero when fully planned
    pub shortfall: i32,
}

impl DepletionPlan {
    pub fn is_covered(&self) -> bool {
        self.shortfall == 0
    }
}

/// Plan an oldest-first depletion of `requested` units
///
/// `lots` must already be ordered by entry date ascending. Empty lots are
/// passed over; a later lot is never drawn before an earlier one still
/// holds stock.
pub fn plan_depletion(lots: &[(Uuid, i32)], requested: i32) -> DepletionPlan {
    let mut remaining = requested.max(0);
    let mut draws = Vec::new();
    for &(lot_id, quantity) in lots {
        if remaining == 0 {
            break;
        }
        if quantity <= 0 {
            continue;
        }
        let taken = quantity.min(remaining);
        draws.push(LotDraw { lot_id, taken });
        remaining -= taken;
    }
    DepletionPlan {
        draws,
        shortfall: remaining,
    }
}
