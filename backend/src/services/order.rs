//! Supplier orders and goods receipt
//!
//! Orders snapshot box costs in CDF at placement time. Receiving is one
//! transaction: stock increments, lot creation and the status flip land
//! together or not at all.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use shared::models::{
    compute_entry_prices, generate_barcode, generate_lot_number, order_line_cost, Currency, Order,
    OrderLine, OrderStatus, Receipt, ReceiptLine,
};
use shared::types::Pagination;
use shared::validation::validate_positive_quantity;

const MAX_GENERATION_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    inventory: InventoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub manufacturer_id: Uuid,
    pub lines: Vec<OrderLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineInput {
    pub manufacturer_product_id: Uuid,
    /// Boxes ordered
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmReceiptInput {
    /// User recording the delivery
    pub user_id: Option<Uuid>,
    pub lines: Vec<ReceiptLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptLineInput {
    pub order_line_id: Uuid,
    /// Boxes received
    pub quantity_received: i32,
}

#[derive(Debug, Serialize)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptWithLines {
    pub receipt: Receipt,
    pub lines: Vec<ReceiptLine>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    pharmacy_id: Uuid,
    manufacturer_id: Uuid,
    status: String,
    ordered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_model(self) -> AppResult<Order> {
        let status = OrderStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown order status {} on order {}", self.status, self.id))
        })?;

        Ok(Order {
            id: self.id,
            pharmacy_id: self.pharmacy_id,
            manufacturer_id: self.manufacturer_id,
            status,
            ordered_at: self.ordered_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    manufacturer_product_id: Uuid,
    quantity: i32,
    box_cost: Decimal,
    updated_at: DateTime<Utc>,
}

impl OrderLineRow {
    fn into_model(self) -> OrderLine {
        OrderLine {
            id: self.id,
            order_id: self.order_id,
            manufacturer_product_id: self.manufacturer_product_id,
            quantity: self.quantity,
            box_cost: self.box_cost,
            updated_at: self.updated_at,
        }
    }
}

/// Product data joined onto an order line during receiving
#[derive(Debug, sqlx::FromRow)]
struct LineProductRow {
    id: Uuid,
    manufacturer_product_id: Uuid,
    name: String,
    box_price: Decimal,
    currency: String,
    units_per_box: i32,
}

const ORDER_COLUMNS: &str = "id, pharmacy_id, manufacturer_id, status, ordered_at, updated_at";
const ORDER_LINE_COLUMNS: &str =
    "id, order_id, manufacturer_product_id, quantity, box_cost, updated_at";

impl OrderService {
    pub fn new(db: PgPool, inventory: InventoryConfig) -> Self {
        Self { db, inventory }
    }

    /// Place an order with a manufacturer
    ///
    /// Rejects any line whose product the pharmacy already ordered today,
    /// and snapshots each line's box cost in CDF before anything is
    /// written.
    pub async fn create_order(
        &self,
        pharmacy_id: Uuid,
        input: CreateOrderInput,
    ) -> AppResult<OrderWithLines> {
        // Validate
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "An order needs at least one line".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for line in &input.lines {
            validate_positive_quantity(line.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;
            if !seen.insert(line.manufacturer_product_id) {
                return Err(AppError::Validation {
                    field: "lines".to_string(),
                    message: "The same product appears on several lines".to_string(),
                });
            }
        }

        let manufacturer_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM manufacturers WHERE id = $1)",
        )
        .bind(input.manufacturer_id)
        .fetch_one(&self.db)
        .await?;
        if !manufacturer_exists {
            return Err(AppError::NotFound("Manufacturer".to_string()));
        }

        // Resolve products and enforce the one-order-per-day guard
        let mut products = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let (name, box_price, currency, manufacturer_id) =
                sqlx::query_as::<_, (String, Decimal, String, Uuid)>(
                    "SELECT name, box_price, currency, manufacturer_id FROM manufacturer_products WHERE id = $1",
                )
                .bind(line.manufacturer_product_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("Manufacturer product".to_string()))?;

            if manufacturer_id != input.manufacturer_id {
                return Err(AppError::Validation {
                    field: "lines".to_string(),
                    message: format!("{} belongs to another manufacturer", name),
                });
            }

            let ordered_today = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM order_lines l
                    JOIN orders o ON o.id = l.order_id
                    WHERE o.pharmacy_id = $1
                      AND l.manufacturer_product_id = $2
                      AND o.ordered_at::date = CURRENT_DATE
                )
                "#,
            )
            .bind(pharmacy_id)
            .bind(line.manufacturer_product_id)
            .fetch_one(&self.db)
            .await?;
            if ordered_today {
                return Err(AppError::DuplicateOrderToday { product: name });
            }

            let currency = Currency::from_str(&currency).ok_or_else(|| {
                AppError::Internal(format!(
                    "Unknown currency {} on product {}",
                    currency, line.manufacturer_product_id
                ))
            })?;
            products.push((box_price, currency));
        }

        // Snapshot box costs in CDF under the latest rate
        let rate = self.latest_rate().await?;
        let mut costs = Vec::with_capacity(input.lines.len());
        for (box_price, currency) in &products {
            costs.push(order_line_cost(*box_price, *currency, rate)?);
        }

        // Start transaction
        let mut tx = self.db.begin().await?;

        let query = format!(
            r#"
            INSERT INTO orders (pharmacy_id, manufacturer_id, status)
            VALUES ($1, $2, 'pending')
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order_row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(pharmacy_id)
            .bind(input.manufacturer_id)
            .fetch_one(&mut *tx)
            .await?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for (line, box_cost) in input.lines.iter().zip(costs) {
            let query = format!(
                r#"
                INSERT INTO order_lines (order_id, manufacturer_product_id, quantity, box_cost)
                VALUES ($1, $2, $3, $4)
                RETURNING {ORDER_LINE_COLUMNS}
                "#
            );
            let row = sqlx::query_as::<_, OrderLineRow>(&query)
                .bind(order_row.id)
                .bind(line.manufacturer_product_id)
                .bind(line.quantity)
                .bind(box_cost)
                .fetch_one(&mut *tx)
                .await?;
            lines.push(row.into_model());
        }

        tx.commit().await?;

        let order = order_row.into_model()?;
        tracing::info!(order_id = %order.id, lines = lines.len(), "Placed supplier order");

        Ok(OrderWithLines { order, lines })
    }

    pub async fn get_order(&self, pharmacy_id: Uuid, order_id: Uuid) -> AppResult<OrderWithLines> {
        let query =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND pharmacy_id = $2");
        let order_row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(order_id)
            .bind(pharmacy_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let query = format!(
            "SELECT {ORDER_LINE_COLUMNS} FROM order_lines WHERE order_id = $1 ORDER BY updated_at"
        );
        let line_rows = sqlx::query_as::<_, OrderLineRow>(&query)
            .bind(order_id)
            .fetch_all(&self.db)
            .await?;

        Ok(OrderWithLines {
            order: order_row.into_model()?,
            lines: line_rows.into_iter().map(OrderLineRow::into_model).collect(),
        })
    }

    pub async fn list_orders(&self, pharmacy_id: Uuid, page: &Pagination) -> AppResult<Vec<Order>> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE pharmacy_id = $1 ORDER BY ordered_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(pharmacy_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(OrderRow::into_model).collect()
    }

    /// Record a delivery against an order
    ///
    /// For each received line the stock increments by boxes × units per
    /// box. Products never stocked before get a catalog entry created
    /// with defaults; every received batch gets a lot. The order flips to
    /// confirmed. All of it commits atomically.
    pub async fn confirm_receipt(
        &self,
        pharmacy_id: Uuid,
        order_id: Uuid,
        input: ConfirmReceiptInput,
    ) -> AppResult<ReceiptWithLines> {
        // Validate
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A receipt needs at least one line".to_string(),
            });
        }
        for line in &input.lines {
            validate_positive_quantity(line.quantity_received).map_err(|msg| {
                AppError::Validation {
                    field: "quantity_received".to_string(),
                    message: msg.to_string(),
                }
            })?;
        }

        // Start transaction
        let mut tx = self.db.begin().await?;

        let order_exists = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM orders WHERE id = $1 AND pharmacy_id = $2 FOR UPDATE",
        )
        .bind(order_id)
        .bind(pharmacy_id)
        .fetch_optional(&mut *tx)
        .await?;
        if order_exists.is_none() {
            return Err(AppError::NotFound("Order".to_string()));
        }

        let line_products = sqlx::query_as::<_, LineProductRow>(
            r#"
            SELECT l.id, l.manufacturer_product_id, p.name, p.box_price, p.currency, p.units_per_box
            FROM order_lines l
            JOIN manufacturer_products p ON p.id = l.manufacturer_product_id
            WHERE l.order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;
        let line_products: HashMap<Uuid, LineProductRow> =
            line_products.into_iter().map(|row| (row.id, row)).collect();

        // One rate lookup covers every auto-created entry
        let rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT rate FROM exchange_rates ORDER BY rate_date DESC, updated_at DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let receipt_row = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, Option<Uuid>, DateTime<Utc>)>(
            r#"
            INSERT INTO receipts (order_id, user_id)
            VALUES ($1, $2)
            RETURNING id, order_id, received_at, user_id, updated_at
            "#,
        )
        .bind(order_id)
        .bind(input.user_id)
        .fetch_one(&mut *tx)
        .await?;
        let receipt = Receipt {
            id: receipt_row.0,
            order_id: receipt_row.1,
            received_at: receipt_row.2,
            user_id: receipt_row.3,
            updated_at: receipt_row.4,
        };

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let product = line_products.get(&line.order_line_id).ok_or_else(|| {
                AppError::Validation {
                    field: "order_line_id".to_string(),
                    message: "Order line does not belong to this order".to_string(),
                }
            })?;

            let units = line.quantity_received * product.units_per_box;

            let entry = sqlx::query_as::<_, (Uuid, Decimal, Option<Decimal>)>(
                r#"
                SELECT id, unit_cost, sale_price FROM catalog_entries
                WHERE pharmacy_id = $1 AND manufacturer_product_id = $2
                FOR UPDATE
                "#,
            )
            .bind(pharmacy_id)
            .bind(product.manufacturer_product_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (entry_id, lot_cost, lot_price) = match entry {
                Some((entry_id, unit_cost, sale_price)) => {
                    sqlx::query(
                        "UPDATE catalog_entries SET quantity = quantity + $1, updated_at = NOW() WHERE id = $2",
                    )
                    .bind(units)
                    .bind(entry_id)
                    .execute(&mut *tx)
                    .await?;

                    (entry_id, unit_cost, sale_price)
                }
                None => {
                    let entry_id = self
                        .create_entry_for_receipt(&mut tx, pharmacy_id, product, units, rate)
                        .await?;
                    let (unit_cost, sale_price) = sqlx::query_as::<_, (Decimal, Option<Decimal>)>(
                        "SELECT unit_cost, sale_price FROM catalog_entries WHERE id = $1",
                    )
                    .bind(entry_id)
                    .fetch_one(&mut *tx)
                    .await?;

                    (entry_id, unit_cost, sale_price)
                }
            };

            // Every received batch becomes a lot
            let lot_number = generate_unique_lot_number_in(&mut tx).await?;
            let lot_expires =
                Utc::now().date_naive() + Duration::days(self.inventory.lot_expiry_days);
            sqlx::query(
                r#"
                INSERT INTO lots (catalog_entry_id, lot_number, expires_on, entered_on, quantity, unit_cost, sale_price)
                VALUES ($1, $2, $3, CURRENT_DATE, $4, $5, $6)
                "#,
            )
            .bind(entry_id)
            .bind(&lot_number)
            .bind(lot_expires)
            .bind(units)
            .bind(lot_cost)
            .bind(lot_price)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, DateTime<Utc>)>(
                r#"
                INSERT INTO receipt_lines (receipt_id, order_line_id, quantity_received)
                VALUES ($1, $2, $3)
                RETURNING id, receipt_id, order_line_id, quantity_received, updated_at
                "#,
            )
            .bind(receipt.id)
            .bind(line.order_line_id)
            .bind(line.quantity_received)
            .fetch_one(&mut *tx)
            .await?;
            lines.push(ReceiptLine {
                id: row.0,
                receipt_id: row.1,
                order_line_id: row.2,
                quantity_received: row.3,
                updated_at: row.4,
            });
        }

        sqlx::query("UPDATE orders SET status = 'confirmed', updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, receipt_id = %receipt.id, lines = lines.len(), "Recorded goods receipt");

        Ok(ReceiptWithLines { receipt, lines })
    }

    async fn create_entry_for_receipt(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        pharmacy_id: Uuid,
        product: &LineProductRow,
        units: i32,
        rate: Option<Decimal>,
    ) -> AppResult<Uuid> {
        let currency = Currency::from_str(&product.currency).ok_or_else(|| {
            AppError::Internal(format!(
                "Unknown currency {} on product {}",
                product.currency, product.manufacturer_product_id
            ))
        })?;

        let prices = compute_entry_prices(
            product.box_price,
            currency,
            product.units_per_box,
            self.inventory.default_margin_percent,
            rate,
        )?;

        let barcode = generate_unique_barcode_in(tx, pharmacy_id).await?;
        let expires_on =
            Utc::now().date_naive() + Duration::days(self.inventory.entry_expiry_days);

        let entry_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO catalog_entries
                (pharmacy_id, manufacturer_product_id, barcode, name, expires_on, alert_threshold,
                 quantity, unit_cost, margin_percent, sale_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(pharmacy_id)
        .bind(product.manufacturer_product_id)
        .bind(&barcode)
        .bind(&product.name)
        .bind(expires_on)
        .bind(self.inventory.default_alert_threshold)
        .bind(units)
        .bind(prices.unit_cost)
        .bind(self.inventory.default_margin_percent)
        .bind(prices.sale_price)
        .fetch_one(&mut **tx)
        .await?;

        tracing::info!(entry_id = %entry_id, product = %product.name, "Auto-created catalog entry on receipt");

        Ok(entry_id)
    }

    async fn latest_rate(&self) -> AppResult<Option<Decimal>> {
        let rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT rate FROM exchange_rates ORDER BY rate_date DESC, updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(rate)
    }
}

async fn generate_unique_barcode_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    pharmacy_id: Uuid,
) -> AppResult<String> {
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
        .fetch_one(&mut **tx)
        .await?;

        if !taken {
            return Ok(candidate);
        }
    }

    Err(AppError::Internal(
        "Could not generate a unique barcode".to_string(),
    ))
}

async fn generate_unique_lot_number_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> AppResult<String> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = {
            let mut rng = rand::thread_rng();
            generate_lot_number(&mut rng)
        };

        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM lots WHERE lot_number = $1)",
        )
        .bind(&candidate)
        .fetch_one(&mut **tx)
        .await?;

        if !taken {
            return Ok(candidate);
        }
    }

    Err(AppError::Internal(
        "Could not generate a unique lot number".to_string(),
    ))
}
