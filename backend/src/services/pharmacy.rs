//! Pharmacy administration
//!
//! Registration and subscription housekeeping for tenant pharmacies.
//! Pharmacy rows are created once and identified forever; there is no
//! last-modified timestamp on them, so edits stay on the side where they
//! were made.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::Pharmacy;
use shared::types::GpsCoordinates;
use shared::validation::{validate_drc_phone, validate_rccm_number};

#[derive(Clone)]
pub struct PharmacyService {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePharmacyInput {
    pub name: String,
    pub city: String,
    pub commune: String,
    pub address: String,
    /// RCCM registration number
    pub national_id: String,
    pub phone: String,
    pub logo_url: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub monthly_fee: Option<Decimal>,
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePharmacyInput {
    pub name: Option<String>,
    pub city: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub monthly_fee: Option<Decimal>,
    pub expires_on: Option<NaiveDate>,
}

const PHARMACY_COLUMNS: &str = "id, name, city, commune, address, national_id, phone, logo_url, \
     latitude, longitude, monthly_fee, is_active, expires_on, created_at";

#[derive(Debug, sqlx::FromRow)]
struct PharmacyRow {
    id: Uuid,
    name: String,
    city: String,
    commune: String,
    address: String,
    national_id: String,
    phone: String,
    logo_url: Option<String>,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    monthly_fee: Decimal,
    is_active: bool,
    expires_on: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl PharmacyRow {
    fn into_model(self) -> Pharmacy {
        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GpsCoordinates::new(lat, lng)),
            _ => None,
        };

        Pharmacy {
            id: self.id,
            name: self.name,
            city: self.city,
            commune: self.commune,
            address: self.address,
            national_id: self.national_id,
            phone: self.phone,
            logo_url: self.logo_url,
            location,
            monthly_fee: self.monthly_fee,
            is_active: self.is_active,
            expires_on: self.expires_on,
            created_at: self.created_at,
        }
    }
}

impl PharmacyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a pharmacy on the platform
    pub async fn create_pharmacy(&self, input: CreatePharmacyInput) -> AppResult<Pharmacy> {
        // Validate
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Pharmacy name cannot be empty".to_string(),
            });
        }
        validate_drc_phone(&input.phone).map_err(|msg| AppError::Validation {
            field: "phone".to_string(),
            message: msg.to_string(),
        })?;
        validate_rccm_number(&input.national_id).map_err(|msg| AppError::Validation {
            field: "national_id".to_string(),
            message: msg.to_string(),
        })?;

        let monthly_fee = input.monthly_fee.unwrap_or(Decimal::ZERO);
        if monthly_fee < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "monthly_fee".to_string(),
                message: "Monthly fee cannot be negative".to_string(),
            });
        }

        let query = format!(
            r#"
            INSERT INTO pharmacies
                (name, city, commune, address, national_id, phone, logo_url, latitude, longitude,
                 monthly_fee, expires_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PHARMACY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PharmacyRow>(&query)
            .bind(&name)
            .bind(input.city.trim())
            .bind(input.commune.trim())
            .bind(input.address.trim())
            .bind(input.national_id.trim())
            .bind(&input.phone)
            .bind(input.logo_url)
            .bind(input.latitude)
            .bind(input.longitude)
            .bind(monthly_fee)
            .bind(input.expires_on)
            .fetch_one(&self.db)
            .await?;

        let pharmacy = row.into_model();
        tracing::info!(pharmacy_id = %pharmacy.id, name = %pharmacy.name, "Registered pharmacy");

        Ok(pharmacy)
    }

    pub async fn get_pharmacy(&self, id: Uuid) -> AppResult<Pharmacy> {
        let query = format!("SELECT {PHARMACY_COLUMNS} FROM pharmacies WHERE id = $1");
        let row = sqlx::query_as::<_, PharmacyRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Pharmacy".to_string()))?;

        Ok(row.into_model())
    }

    pub async fn list_pharmacies(&self) -> AppResult<Vec<Pharmacy>> {
        let query = format!("SELECT {PHARMACY_COLUMNS} FROM pharmacies ORDER BY name");
        let rows = sqlx::query_as::<_, PharmacyRow>(&query)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(PharmacyRow::into_model).collect())
    }

    pub async fn update_pharmacy(
        &self,
        id: Uuid,
        input: UpdatePharmacyInput,
    ) -> AppResult<Pharmacy> {
        let current = self.get_pharmacy(id).await?;

        if let Some(phone) = &input.phone {
            validate_drc_phone(phone).map_err(|msg| AppError::Validation {
                field: "phone".to_string(),
                message: msg.to_string(),
            })?;
        }
        let monthly_fee = input.monthly_fee.unwrap_or(current.monthly_fee);
        if monthly_fee < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "monthly_fee".to_string(),
                message: "Monthly fee cannot be negative".to_string(),
            });
        }

        let (latitude, longitude) = match (input.latitude, input.longitude) {
            (None, None) => match current.location {
                Some(location) => (Some(location.latitude), Some(location.longitude)),
                None => (None, None),
            },
            pair => pair,
        };

        let query = format!(
            r#"
            UPDATE pharmacies
            SET name = $1, city = $2, commune = $3, address = $4, phone = $5, logo_url = $6,
                latitude = $7, longitude = $8, monthly_fee = $9, expires_on = $10
            WHERE id = $11
            RETURNING {PHARMACY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PharmacyRow>(&query)
            .bind(input.name.unwrap_or(current.name).trim())
            .bind(input.city.unwrap_or(current.city).trim())
            .bind(input.commune.unwrap_or(current.commune).trim())
            .bind(input.address.unwrap_or(current.address).trim())
            .bind(input.phone.unwrap_or(current.phone))
            .bind(input.logo_url.or(current.logo_url))
            .bind(latitude)
            .bind(longitude)
            .bind(monthly_fee)
            .bind(input.expires_on.or(current.expires_on))
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> AppResult<Pharmacy> {
        let query = format!(
            "UPDATE pharmacies SET is_active = $1 WHERE id = $2 RETURNING {PHARMACY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PharmacyRow>(&query)
            .bind(active)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Pharmacy".to_string()))?;

        Ok(row.into_model())
    }

    /// Deactivate every pharmacy whose subscription has lapsed
    ///
    /// A pharmacy is still valid on its expiration date itself.
    pub async fn deactivate_expired(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pharmacies
            SET is_active = FALSE
            WHERE is_active AND expires_on IS NOT NULL AND expires_on < CURRENT_DATE
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Active pharmacies whose subscription lapses within the given days
    pub async fn expiring_soon(&self, within_days: i32) -> AppResult<Vec<Pharmacy>> {
        let query = format!(
            r#"
            SELECT {PHARMACY_COLUMNS} FROM pharmacies
            WHERE is_active
              AND expires_on IS NOT NULL
              AND expires_on >= CURRENT_DATE
              AND expires_on <= CURRENT_DATE + $1
            ORDER BY expires_on
            "#
        );
        let rows = sqlx::query_as::<_, PharmacyRow>(&query)
            .bind(within_days)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(PharmacyRow::into_model).collect())
    }
}
