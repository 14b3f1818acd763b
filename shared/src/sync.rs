//! Synchronization registry and row reconciliation rules
//!
//! Every entity that replicates between a pharmacy instance and the remote
//! server is declared here once, in dependency order. Both the push and the
//! pull pass walk the same registry so the two directions can never drift
//! apart in coverage or ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local instance to remote server
    Push,
    /// Remote server to local instance
    Pull,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rows of an entity are attributed to a pharmacy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Platform-wide data, replicated to every instance in full
    Global,
    /// Owned by one pharmacy; the predicate binds the pharmacy id as `$1`
    Pharmacy(&'static str),
}

impl SyncScope {
    /// SQL predicate selecting the rows of one pharmacy, if scoped
    pub fn predicate(&self) -> Option<&'static str> {
        match self {
            SyncScope::Global => None,
            SyncScope::Pharmacy(predicate) => Some(predicate),
        }
    }
}

/// One replicated entity type
#[derive(Debug, Clone, Copy)]
pub struct SyncEntity {
    /// Table name on both sides; identical schemas are assumed
    pub table: &'static str,
    /// Full column list, used verbatim when copying rows
    pub columns: &'static [&'static str],
    pub scope: SyncScope,
    /// Entities without a last-modified column are create-once: inserted
    /// when absent, never overwritten
    pub has_updated_at: bool,
}

impl SyncEntity {
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }
}

/// Ordered registry of every replicated entity
///
/// Order matters: parents precede dependents so inserts on the target side
/// never hit a missing foreign key. Global entities come first because
/// pharmacy-scoped rows reference them.
pub const SYNC_REGISTRY: &[SyncEntity] = &[
    SyncEntity {
        table: "exchange_rates",
        columns: &["id", "rate", "rate_date", "updated_at"],
        scope: SyncScope::Global,
        has_updated_at: true,
    },
    SyncEntity {
        table: "manufacturers",
        columns: &["id", "name", "country", "updated_at"],
        scope: SyncScope::Global,
        has_updated_at: true,
    },
    SyncEntity {
        table: "depots",
        columns: &[
            "id",
            "manufacturer_id",
            "name",
            "city",
            "commune",
            "quarter",
            "address",
            "latitude",
            "longitude",
            "phone",
            "updated_at",
        ],
        scope: SyncScope::Global,
        has_updated_at: true,
    },
    SyncEntity {
        table: "manufacturer_products",
        columns: &[
            "id",
            "manufacturer_id",
            "name",
            "box_price",
            "currency",
            "units_per_box",
            "updated_at",
        ],
        scope: SyncScope::Global,
        has_updated_at: true,
    },
    SyncEntity {
        table: "advertisements",
        columns: &["id", "image_url", "description", "starts_on", "ends_on", "updated_at"],
        scope: SyncScope::Global,
        has_updated_at: true,
    },
    SyncEntity {
        table: "pharmacies",
        columns: &[
            "id",
            "name",
            "city",
            "commune",
            "address",
            "national_id",
            "phone",
            "logo_url",
            "latitude",
            "longitude",
            "monthly_fee",
            "is_active",
            "expires_on",
            "created_at",
        ],
        scope: SyncScope::Pharmacy("id = $1"),
        has_updated_at: false,
    },
    SyncEntity {
        table: "users",
        columns: &[
            "id",
            "username",
            "first_name",
            "last_name",
            "email",
            "role",
            "pharmacy_id",
            "is_active",
            "joined_at",
        ],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: false,
    },
    SyncEntity {
        table: "catalog_entries",
        columns: &[
            "id",
            "pharmacy_id",
            "manufacturer_product_id",
            "barcode",
            "name",
            "indication",
            "shelf_location",
            "packaging",
            "expires_on",
            "category",
            "alert_threshold",
            "quantity",
            "unit_cost",
            "margin_percent",
            "sale_price",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
    SyncEntity {
        table: "lots",
        columns: &[
            "id",
            "catalog_entry_id",
            "lot_number",
            "expires_on",
            "entered_on",
            "quantity",
            "unit_cost",
            "sale_price",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy(
            "catalog_entry_id IN (SELECT id FROM catalog_entries WHERE pharmacy_id = $1)",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "orders",
        columns: &["id", "pharmacy_id", "manufacturer_id", "status", "ordered_at", "updated_at"],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
    SyncEntity {
        table: "order_lines",
        columns: &[
            "id",
            "order_id",
            "manufacturer_product_id",
            "quantity",
            "box_cost",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy(
            "order_id IN (SELECT id FROM orders WHERE pharmacy_id = $1)",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "receipts",
        columns: &["id", "order_id", "received_at", "user_id", "updated_at"],
        scope: SyncScope::Pharmacy(
            "order_id IN (SELECT id FROM orders WHERE pharmacy_id = $1)",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "receipt_lines",
        columns: &["id", "receipt_id", "order_line_id", "quantity_received", "updated_at"],
        scope: SyncScope::Pharmacy(
            "receipt_id IN (SELECT id FROM receipts WHERE order_id IN \
             (SELECT id FROM orders WHERE pharmacy_id = $1))",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "clients",
        columns: &[
            "id",
            "pharmacy_id",
            "full_name",
            "phone",
            "loyalty_score",
            "total_spent",
            "last_purchase_at",
            "created_at",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
    SyncEntity {
        table: "sales",
        columns: &["id", "pharmacy_id", "client_id", "user_id", "total", "sold_at", "updated_at"],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
    SyncEntity {
        table: "sale_lines",
        columns: &[
            "id",
            "sale_id",
            "catalog_entry_id",
            "quantity",
            "unit_price",
            "line_total",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy(
            "sale_id IN (SELECT id FROM sales WHERE pharmacy_id = $1)",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "client_purchases",
        columns: &[
            "id",
            "client_id",
            "catalog_entry_id",
            "quantity",
            "points",
            "purchased_at",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy(
            "client_id IN (SELECT id FROM clients WHERE pharmacy_id = $1)",
        ),
        has_updated_at: true,
    },
    SyncEntity {
        table: "requisitions",
        columns: &[
            "id",
            "pharmacy_id",
            "manufacturer_product_id",
            "custom_name",
            "request_count",
            "created_at",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
    SyncEntity {
        table: "expenses",
        columns: &[
            "id",
            "pharmacy_id",
            "category",
            "description",
            "amount",
            "payment_method",
            "spent_on",
            "user_id",
            "updated_at",
        ],
        scope: SyncScope::Pharmacy("pharmacy_id = $1"),
        has_updated_at: true,
    },
];

/// Look up a registry entry by table name
pub fn sync_entity(table: &str) -> Option<&'static SyncEntity> {
    SYNC_REGISTRY.iter().find(|entity| entity.table == table)
}

/// Outcome chosen for one source row during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Row absent on the target: copy it over
    Insert,
    /// Row present but the source copy is strictly newer: replace it
    Overwrite,
    /// Row present and not older than the source: leave it alone
    Skip,
}

/// Decide what to do with one source row
///
/// Create-once entities are never overwritten. For timestamped entities the
/// source wins only when strictly newer; a target row missing its timestamp
/// is treated as stale.
pub fn decide_row_action(
    target_exists: bool,
    has_updated_at: bool,
    source_updated_at: Option<DateTime<Utc>>,
    target_updated_at: Option<DateTime<Utc>>,
) -> SyncAction {
    if !target_exists {
        return SyncAction::Insert;
    }
    if !has_updated_at {
        return SyncAction::Skip;
    }
    match (source_updated_at, target_updated_at) {
        (Some(source), Some(target)) if source > target => SyncAction::Overwrite,
        (Some(_), None) => SyncAction::Overwrite,
        _ => SyncAction::Skip,
    }
}
