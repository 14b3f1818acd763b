//! Manufacturer directory
//!
//! Manufacturers, their priced products and the wholesale depots that
//! carry them. All of it is platform-wide reference data maintained on
//! the remote server and pulled down to pharmacies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::repricing::{RepricingReport, RepricingService};
use shared::models::{Currency, Depot, Manufacturer, ManufacturerProduct};
use shared::types::GpsCoordinates;
use shared::validation::validate_units_per_box;

#[derive(Clone)]
pub struct ManufacturerService {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct CreateManufacturerInput {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub manufacturer_id: Uuid,
    pub name: String,
    pub box_price: Decimal,
    pub currency: Currency,
    pub units_per_box: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub box_price: Option<Decimal>,
    pub currency: Option<Currency>,
    pub units_per_box: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepotInput {
    pub manufacturer_id: Uuid,
    pub name: String,
    pub city: String,
    pub commune: String,
    pub quarter: String,
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub phone: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    manufacturer_id: Uuid,
    name: String,
    box_price: Decimal,
    currency: String,
    units_per_box: i32,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_model(self) -> AppResult<ManufacturerProduct> {
        let currency = Currency::from_str(&self.currency).ok_or_else(|| {
            AppError::Internal(format!("Unknown currency {} on product {}", self.currency, self.id))
        })?;

        Ok(ManufacturerProduct {
            id: self.id,
            manufacturer_id: self.manufacturer_id,
            name: self.name,
            box_price: self.box_price,
            currency,
            units_per_box: self.units_per_box,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepotRow {
    id: Uuid,
    manufacturer_id: Uuid,
    name: String,
    city: String,
    commune: String,
    quarter: String,
    address: String,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    phone: Option<String>,
    updated_at: DateTime<Utc>,
}

impl DepotRow {
    fn into_model(self) -> Depot {
        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GpsCoordinates::new(lat, lng)),
            _ => None,
        };

        Depot {
            id: self.id,
            manufacturer_id: self.manufacturer_id,
            name: self.name,
            city: self.city,
            commune: self.commune,
            quarter: self.quarter,
            address: self.address,
            location,
            phone: self.phone,
            updated_at: self.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, manufacturer_id, name, box_price, currency, units_per_box, updated_at";
const DEPOT_COLUMNS: &str =
    "id, manufacturer_id, name, city, commune, quarter, address, latitude, longitude, phone, updated_at";

impl ManufacturerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_manufacturer(
        &self,
        input: CreateManufacturerInput,
    ) -> AppResult<Manufacturer> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Manufacturer name cannot be empty".to_string(),
            });
        }

        let row = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
            r#"
            INSERT INTO manufacturers (name, country)
            VALUES ($1, $2)
            RETURNING id, name, country, updated_at
            "#,
        )
        .bind(input.name.trim())
        .bind(input.country.trim())
        .fetch_one(&self.db)
        .await?;

        Ok(Manufacturer {
            id: row.0,
            name: row.1,
            country: row.2,
            updated_at: row.3,
        })
    }

    pub async fn get_manufacturer(&self, id: Uuid) -> AppResult<Manufacturer> {
        let row = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
            "SELECT id, name, country, updated_at FROM manufacturers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Manufacturer".to_string()))?;

        Ok(Manufacturer {
            id: row.0,
            name: row.1,
            country: row.2,
            updated_at: row.3,
        })
    }

    pub async fn list_manufacturers(&self) -> AppResult<Vec<Manufacturer>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
            "SELECT id, name, country, updated_at FROM manufacturers ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Manufacturer {
                id: row.0,
                name: row.1,
                country: row.2,
                updated_at: row.3,
            })
            .collect())
    }

    /// Add a product to a manufacturer's price list
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<ManufacturerProduct> {
        // Validate
        validate_units_per_box(input.units_per_box).map_err(|msg| AppError::Validation {
            field: "units_per_box".to_string(),
            message: msg.to_string(),
        })?;
        if input.box_price < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "box_price".to_string(),
                message: "Box price cannot be negative".to_string(),
            });
        }
        self.get_manufacturer(input.manufacturer_id).await?;

        let query = format!(
            r#"
            INSERT INTO manufacturer_products (manufacturer_id, name, box_price, currency, units_per_box)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ProductRow>(&query)
            .bind(input.manufacturer_id)
            .bind(input.name.trim())
            .bind(input.box_price)
            .bind(input.currency.as_str())
            .bind(input.units_per_box)
            .fetch_one(&self.db)
            .await?;

        row.into_model()
    }

    pub async fn get_product(&self, id: Uuid) -> AppResult<ManufacturerProduct> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM manufacturer_products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Manufacturer product".to_string()))?;

        row.into_model()
    }

    pub async fn list_products(&self, manufacturer_id: Uuid) -> AppResult<Vec<ManufacturerProduct>> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM manufacturer_products WHERE manufacturer_id = $1 ORDER BY name"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&query)
            .bind(manufacturer_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(ProductRow::into_model).collect()
    }

    /// Update a product's price list entry and resweep dependent prices
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<(ManufacturerProduct, RepricingReport)> {
        let current = self.get_product(id).await?;

        let name = input.name.unwrap_or(current.name);
        let box_price = input.box_price.unwrap_or(current.box_price);
        let currency = input.currency.unwrap_or(current.currency);
        let units_per_box = input.units_per_box.unwrap_or(current.units_per_box);

        validate_units_per_box(units_per_box).map_err(|msg| AppError::Validation {
            field: "units_per_box".to_string(),
            message: msg.to_string(),
        })?;
        if box_price < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "box_price".to_string(),
                message: "Box price cannot be negative".to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE manufacturer_products
            SET name = $1, box_price = $2, currency = $3, units_per_box = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ProductRow>(&query)
            .bind(name.trim())
            .bind(box_price)
            .bind(currency.as_str())
            .bind(units_per_box)
            .bind(id)
            .fetch_one(&self.db)
            .await?;

        let product = row.into_model()?;

        // Catalog entries snapshot this product's pricing
        let repricing = RepricingService::new(self.db.clone());
        let report = repricing.apply_product_change(id).await?;

        Ok((product, report))
    }

    pub async fn create_depot(&self, input: CreateDepotInput) -> AppResult<Depot> {
        self.get_manufacturer(input.manufacturer_id).await?;

        if input.name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Depot name cannot be empty".to_string(),
            });
        }

        let query = format!(
            r#"
            INSERT INTO depots (manufacturer_id, name, city, commune, quarter, address, latitude, longitude, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {DEPOT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DepotRow>(&query)
            .bind(input.manufacturer_id)
            .bind(input.name.trim())
            .bind(input.city.trim())
            .bind(input.commune.trim())
            .bind(input.quarter.trim())
            .bind(input.address.trim())
            .bind(input.latitude)
            .bind(input.longitude)
            .bind(input.phone)
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    /// Depots carrying a manufacturer's products, or the whole directory
    pub async fn list_depots(&self, manufacturer_id: Option<Uuid>) -> AppResult<Vec<Depot>> {
        let rows = match manufacturer_id {
            Some(manufacturer_id) => {
                let query = format!(
                    "SELECT {DEPOT_COLUMNS} FROM depots WHERE manufacturer_id = $1 ORDER BY city, name"
                );
                sqlx::query_as::<_, DepotRow>(&query)
                    .bind(manufacturer_id)
                    .fetch_all(&self.db)
                    .await?
            }
            None => {
                let query = format!("SELECT {DEPOT_COLUMNS} FROM depots ORDER BY city, name");
                sqlx::query_as::<_, DepotRow>(&query).fetch_all(&self.db).await?
            }
        };

        Ok(rows.into_iter().map(DepotRow::into_model).collect())
    }
}
