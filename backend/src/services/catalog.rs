//! Pharmacy catalog
//!
//! Catalog entries are a pharmacy's stocked, priced instances of
//! manufacturer products. Prices are cached in CDF and recomputed from
//! the manufacturer price and the effective exchange rate whenever an
//! entry is persisted.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use crate::services::currency::ExchangeRateService;
use shared::models::{
    alert_level, compute_entry_prices, generate_barcode, AlertLevel, CatalogEntry, Currency,
    EntryPrices, Packaging, Requisition,
};
use shared::types::Pagination;
use shared::validation::{
    validate_alert_threshold, validate_barcode, validate_margin_percent,
    validate_positive_quantity,
};

const MAX_GENERATION_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
    inventory: InventoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryInput {
    pub manufacturer_product_id: Uuid,
    /// Unset barcodes are generated
    pub barcode: Option<String>,
    /// Defaults to the manufacturer product name
    pub name: Option<String>,
    pub indication: Option<String>,
    pub shelf_location: Option<String>,
    pub packaging: Option<Packaging>,
    pub expires_on: Option<NaiveDate>,
    pub category: Option<String>,
    pub alert_threshold: Option<i32>,
    pub margin_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryInput {
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub indication: Option<String>,
    pub shelf_location: Option<String>,
    pub packaging: Option<Packaging>,
    pub expires_on: Option<NaiveDate>,
    pub category: Option<String>,
    pub alert_threshold: Option<i32>,
    pub margin_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct RecordRequisitionInput {
    /// Known manufacturer product, when the request maps to one
    pub manufacturer_product_id: Option<Uuid>,
    /// Free-text name for anything outside the manufacturer catalog
    pub custom_name: Option<String>,
    /// How many requests to add; defaults to 1
    pub count: Option<i32>,
}

/// A stock position at or under its alert threshold
#[derive(Debug, Clone, Serialize)]
pub struct StockAlert {
    pub catalog_entry_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub alert_threshold: i32,
    pub level: AlertLevel,
}

const ENTRY_COLUMNS: &str = "id, pharmacy_id, manufacturer_product_id, barcode, name, indication, \
     shelf_location, packaging, expires_on, category, alert_threshold, quantity, unit_cost, \
     margin_percent, sale_price, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    pharmacy_id: Uuid,
    manufacturer_product_id: Uuid,
    barcode: String,
    name: String,
    indication: Option<String>,
    shelf_location: String,
    packaging: String,
    expires_on: NaiveDate,
    category: String,
    alert_threshold: i32,
    quantity: i32,
    unit_cost: Decimal,
    margin_percent: Decimal,
    sale_price: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_model(self) -> AppResult<CatalogEntry> {
        let packaging = Packaging::from_str(&self.packaging).ok_or_else(|| {
            AppError::Internal(format!("Unknown packaging {} on entry {}", self.packaging, self.id))
        })?;

        Ok(CatalogEntry {
            id: self.id,
            pharmacy_id: self.pharmacy_id,
            manufacturer_product_id: self.manufacturer_product_id,
            barcode: self.barcode,
            name: self.name,
            indication: self.indication,
            shelf_location: self.shelf_location,
            packaging,
            expires_on: self.expires_on,
            category: self.category,
            alert_threshold: self.alert_threshold,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            margin_percent: self.margin_percent,
            sale_price: self.sale_price,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductPricingRow {
    name: String,
    box_price: Decimal,
    currency: String,
    units_per_box: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct RequisitionRow {
    id: Uuid,
    pharmacy_id: Uuid,
    manufacturer_product_id: Option<Uuid>,
    custom_name: String,
    request_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RequisitionRow {
    fn into_model(self) -> Requisition {
        Requisition {
            id: self.id,
            pharmacy_id: self.pharmacy_id,
            manufacturer_product_id: self.manufacturer_product_id,
            custom_name: self.custom_name,
            request_count: self.request_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const REQUISITION_COLUMNS: &str =
    "id, pharmacy_id, manufacturer_product_id, custom_name, request_count, created_at, updated_at";

impl CatalogService {
    pub fn new(db: PgPool, inventory: InventoryConfig) -> Self {
        Self { db, inventory }
    }

    /// Stock a manufacturer product in a pharmacy's catalog
    ///
    /// Prices are derived from the manufacturer box price under the
    /// latest exchange rate. A USD product with no recorded rate is
    /// rejected rather than priced at a default.
    pub async fn create_entry(
        &self,
        pharmacy_id: Uuid,
        input: CreateEntryInput,
    ) -> AppResult<CatalogEntry> {
        // Validate
        let margin_percent = input
            .margin_percent
            .unwrap_or(self.inventory.default_margin_percent);
        validate_margin_percent(margin_percent).map_err(|msg| AppError::Validation {
            field: "margin_percent".to_string(),
            message: msg.to_string(),
        })?;

        let alert_threshold = input
            .alert_threshold
            .unwrap_or(self.inventory.default_alert_threshold);
        validate_alert_threshold(alert_threshold).map_err(|msg| AppError::Validation {
            field: "alert_threshold".to_string(),
            message: msg.to_string(),
        })?;

        let product = self.product_pricing(input.manufacturer_product_id).await?;

        // Derive CDF prices under the latest rate
        let rates = ExchangeRateService::new(self.db.clone());
        let rate = rates.latest_rate().await?;
        let prices = compute_entry_prices(
            product.box_price,
            product.currency,
            product.units_per_box,
            margin_percent,
            rate,
        )?;

        let barcode = match input.barcode {
            Some(code) => {
                validate_barcode(&code).map_err(|msg| AppError::Validation {
                    field: "barcode".to_string(),
                    message: msg.to_string(),
                })?;
                self.ensure_barcode_free(pharmacy_id, &code, None).await?;
                code
            }
            None => self.generate_unique_barcode(pharmacy_id).await?,
        };

        let name = input.name.unwrap_or_else(|| product.name.clone());
        let expires_on = input
            .expires_on
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(self.inventory.entry_expiry_days));

        let query = format!(
            r#"
            INSERT INTO catalog_entries
                (pharmacy_id, manufacturer_product_id, barcode, name, indication, shelf_location,
                 packaging, expires_on, category, alert_threshold, quantity, unit_cost,
                 margin_percent, sale_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $13)
            RETURNING {ENTRY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(pharmacy_id)
            .bind(input.manufacturer_product_id)
            .bind(&barcode)
            .bind(name.trim())
            .bind(input.indication)
            .bind(input.shelf_location.unwrap_or_else(|| "A0".to_string()))
            .bind(input.packaging.unwrap_or(Packaging::Box).as_str())
            .bind(expires_on)
            .bind(input.category.unwrap_or_default())
            .bind(alert_threshold)
            .bind(prices.unit_cost)
            .bind(margin_percent)
            .bind(prices.sale_price)
            .fetch_one(&self.db)
            .await?;

        row.into_model()
    }

    pub async fn get_entry(&self, pharmacy_id: Uuid, entry_id: Uuid) -> AppResult<CatalogEntry> {
        let query =
            format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE id = $1 AND pharmacy_id = $2");
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(entry_id)
            .bind(pharmacy_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Catalog entry".to_string()))?;

        row.into_model()
    }

    /// Barcode scan lookup
    pub async fn find_by_barcode(&self, pharmacy_id: Uuid, barcode: &str) -> AppResult<CatalogEntry> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE pharmacy_id = $1 AND barcode = $2"
        );
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(pharmacy_id)
            .bind(barcode)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Catalog entry".to_string()))?;

        row.into_model()
    }

    pub async fn list_entries(
        &self,
        pharmacy_id: Uuid,
        page: &Pagination,
    ) -> AppResult<Vec<CatalogEntry>> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE pharmacy_id = $1 ORDER BY name LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&query)
            .bind(pharmacy_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(EntryRow::into_model).collect()
    }

    /// Update descriptive fields and recompute cached prices
    pub async fn update_entry(
        &self,
        pharmacy_id: Uuid,
        entry_id: Uuid,
        input: UpdateEntryInput,
    ) -> AppResult<CatalogEntry> {
        let current = self.get_entry(pharmacy_id, entry_id).await?;

        let margin_percent = input.margin_percent.unwrap_or(current.margin_percent);
        validate_margin_percent(margin_percent).map_err(|msg| AppError::Validation {
            field: "margin_percent".to_string(),
            message: msg.to_string(),
        })?;

        let alert_threshold = input.alert_threshold.unwrap_or(current.alert_threshold);
        validate_alert_threshold(alert_threshold).map_err(|msg| AppError::Validation {
            field: "alert_threshold".to_string(),
            message: msg.to_string(),
        })?;

        let barcode = match input.barcode {
            Some(code) if code != current.barcode => {
                validate_barcode(&code).map_err(|msg| AppError::Validation {
                    field: "barcode".to_string(),
                    message: msg.to_string(),
                })?;
                self.ensure_barcode_free(pharmacy_id, &code, Some(entry_id))
                    .await?;
                code
            }
            Some(code) => code,
            None => current.barcode,
        };

        // Persisting an entry refreshes its cached prices
        let product = self
            .product_pricing(current.manufacturer_product_id)
            .await?;
        let rates = ExchangeRateService::new(self.db.clone());
        let rate = rates.latest_rate().await?;
        let prices = compute_entry_prices(
            product.box_price,
            product.currency,
            product.units_per_box,
            margin_percent,
            rate,
        )?;

        let query = format!(
            r#"
            UPDATE catalog_entries
            SET barcode = $1, name = $2, indication = $3, shelf_location = $4, packaging = $5,
                expires_on = $6, category = $7, alert_threshold = $8, unit_cost = $9,
                margin_percent = $10, sale_price = $11, updated_at = NOW()
            WHERE id = $12 AND pharmacy_id = $13
            RETURNING {ENTRY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(&barcode)
            .bind(input.name.unwrap_or(current.name).trim())
            .bind(input.indication.or(current.indication))
            .bind(input.shelf_location.unwrap_or(current.shelf_location))
            .bind(input.packaging.unwrap_or(current.packaging).as_str())
            .bind(input.expires_on.unwrap_or(current.expires_on))
            .bind(input.category.unwrap_or(current.category))
            .bind(alert_threshold)
            .bind(prices.unit_cost)
            .bind(margin_percent)
            .bind(prices.sale_price)
            .bind(entry_id)
            .bind(pharmacy_id)
            .fetch_one(&self.db)
            .await?;

        row.into_model()
    }

    /// Recompute one entry's cached prices under the latest rate
    pub async fn recompute_prices(
        &self,
        pharmacy_id: Uuid,
        entry_id: Uuid,
    ) -> AppResult<EntryPrices> {
        let entry = self.get_entry(pharmacy_id, entry_id).await?;
        let product = self.product_pricing(entry.manufacturer_product_id).await?;

        let rates = ExchangeRateService::new(self.db.clone());
        let rate = rates.latest_rate().await?;
        let prices = compute_entry_prices(
            product.box_price,
            product.currency,
            product.units_per_box,
            entry.margin_percent,
            rate,
        )?;

        sqlx::query(
            "UPDATE catalog_entries SET unit_cost = $1, sale_price = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(prices.unit_cost)
        .bind(prices.sale_price)
        .bind(entry_id)
        .execute(&self.db)
        .await?;

        Ok(prices)
    }

    /// Entries at or under their alert threshold, most depleted first
    pub async fn stock_alerts(&self, pharmacy_id: Uuid) -> AppResult<Vec<StockAlert>> {
        let rows = sqlx::query_as::<_, (Uuid, String, i32, i32)>(
            r#"
            SELECT id, name, quantity, alert_threshold
            FROM catalog_entries
            WHERE pharmacy_id = $1 AND quantity <= alert_threshold
            ORDER BY quantity, name
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(catalog_entry_id, name, quantity, alert_threshold)| {
                alert_level(quantity, alert_threshold).map(|level| StockAlert {
                    catalog_entry_id,
                    name,
                    quantity,
                    alert_threshold,
                    level,
                })
            })
            .collect())
    }

    /// Record demand for a product the pharmacy could not serve
    ///
    /// Repeated requests for the same product or name accumulate on one
    /// row instead of creating duplicates.
    pub async fn record_requisition(
        &self,
        pharmacy_id: Uuid,
        input: RecordRequisitionInput,
    ) -> AppResult<Requisition> {
        let count = input.count.unwrap_or(1);
        validate_positive_quantity(count).map_err(|msg| AppError::Validation {
            field: "count".to_string(),
            message: msg.to_string(),
        })?;

        let (manufacturer_product_id, custom_name) = match input.manufacturer_product_id {
            Some(product_id) => {
                let product = self.product_pricing(product_id).await?;
                (Some(product_id), product.name)
            }
            None => {
                let name = input
                    .custom_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::Validation {
                        field: "custom_name".to_string(),
                        message: "A product or a custom name is required".to_string(),
                    })?;
                (None, name)
            }
        };

        // Start transaction
        let mut tx = self.db.begin().await?;

        let existing = match manufacturer_product_id {
            Some(product_id) => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM requisitions WHERE pharmacy_id = $1 AND manufacturer_product_id = $2 FOR UPDATE",
                )
                .bind(pharmacy_id)
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM requisitions WHERE pharmacy_id = $1 AND custom_name = $2 AND manufacturer_product_id IS NULL FOR UPDATE",
                )
                .bind(pharmacy_id)
                .bind(&custom_name)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let row = match existing {
            Some(id) => {
                let query = format!(
                    r#"
                    UPDATE requisitions
                    SET request_count = request_count + $1, updated_at = NOW()
                    WHERE id = $2
                    RETURNING {REQUISITION_COLUMNS}
                    "#
                );
                sqlx::query_as::<_, RequisitionRow>(&query)
                    .bind(count)
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?
            }
            None => {
                let query = format!(
                    r#"
                    INSERT INTO requisitions (pharmacy_id, manufacturer_product_id, custom_name, request_count)
                    VALUES ($1, $2, $3, $4)
                    RETURNING {REQUISITION_COLUMNS}
                    "#
                );
                sqlx::query_as::<_, RequisitionRow>(&query)
                    .bind(pharmacy_id)
                    .bind(manufacturer_product_id)
                    .bind(&custom_name)
                    .bind(count)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;

        Ok(row.into_model())
    }

    /// Requisitions by accumulated demand, highest first
    pub async fn list_requisitions(&self, pharmacy_id: Uuid) -> AppResult<Vec<Requisition>> {
        let query = format!(
            "SELECT {REQUISITION_COLUMNS} FROM requisitions WHERE pharmacy_id = $1 ORDER BY request_count DESC, updated_at DESC"
        );
        let rows = sqlx::query_as::<_, RequisitionRow>(&query)
            .bind(pharmacy_id)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(RequisitionRow::into_model).collect())
    }

    async fn product_pricing(&self, product_id: Uuid) -> AppResult<ProductPricing> {
        let row = sqlx::query_as::<_, ProductPricingRow>(
            "SELECT name, box_price, currency, units_per_box FROM manufacturer_products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Manufacturer product".to_string()))?;

        let currency = Currency::from_str(&row.currency).ok_or_else(|| {
            AppError::Internal(format!("Unknown currency {} on product {}", row.currency, product_id))
        })?;

        Ok(ProductPricing {
            name: row.name,
            box_price: row.box_price,
            currency,
            units_per_box: row.units_per_box,
        })
    }

    async fn ensure_barcode_free(
        &self,
        pharmacy_id: Uuid,
        barcode: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM catalog_entries
                WHERE pharmacy_id = $1 AND barcode = $2 AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(pharmacy_id)
        .bind(barcode)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;

        if taken {
            return Err(AppError::DuplicateEntry(format!(
                "Barcode {} is already in use",
                barcode
            )));
        }

        Ok(())
    }

    async fn generate_unique_barcode(&self, pharmacy_id: Uuid) -> AppResult<String> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = {
                let mut rng = rand::thread_rng();
                generate_barcode(&mut rng)
            };

            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM catalog_entries WHERE pharmacy_id = $1 AND barcode = $2)",
            )
            .bind(pharmacy_id)
            .bind(&candidate)
            .fetch_one(&self.db)
            .await?;

            if !taken {
                return Ok(candidate);
            }
        }

        Err(AppError::Internal(
            "Could not generate a unique barcode".to_string(),
        ))
    }
}

struct ProductPricing {
    name: String,
    box_price: Decimal,
    currency: Currency,
    units_per_box: i32,
}
