//! Product records and DTOs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::serde_helpers::double_option;

/// A product counts as "new" while its release date is within this window.
pub const NEW_PRODUCT_WINDOW_DAYS: i64 = 180;

/// Persisted product record. Unique on (name, model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub release_date: NaiveDate,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product reached the market within the last 180 days of
    /// `today`. The reference date is passed in so callers sample the clock
    /// once per operation.
    pub fn is_new(&self, today: NaiveDate) -> bool {
        self.release_date > today - Duration::days(NEW_PRODUCT_WINDOW_DAYS)
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub model: String,
    pub release_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Partial update for a product
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price: Option<Option<Decimal>>,
}
