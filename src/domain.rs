//! Domain data shapes shared across layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Published,
    Trash,
    #[serde(rename = "invalid_status")]
    Invalid,
}

impl ProductStatus {
    /// Case-insensitive; anything unrecognised becomes `Invalid`.
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "draft" => ProductStatus::Draft,
            "published" => ProductStatus::Published,
            "trash" => ProductStatus::Trash,
            _ => ProductStatus::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Published => "published",
            ProductStatus::Trash => "trash",
            ProductStatus::Invalid => "invalid_status",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive attributes mirrored from the external catalog as-is.
///
/// Field names follow the catalog's flat snake_case schema so a shard line
/// deserializes straight into this struct. Numbers and booleans are kept as
/// their textual form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(default, deserialize_with = "opaque_text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub creator: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub created_t: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub last_modified_t: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub brands: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub categories: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub labels: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub cities: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub purchase_places: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub stores: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub ingredients_text: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub traces: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub serving_size: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub serving_quantity: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub nutriscore_score: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub nutriscore_grade: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub main_category: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub image_url: Option<String>,
}

impl ProductDetails {
    /// Fields set in `patch` win; unset fields keep the current value.
    pub fn merged_with(self, patch: ProductDetails) -> ProductDetails {
        ProductDetails {
            url: patch.url.or(self.url),
            creator: patch.creator.or(self.creator),
            created_t: patch.created_t.or(self.created_t),
            last_modified_t: patch.last_modified_t.or(self.last_modified_t),
            product_name: patch.product_name.or(self.product_name),
            quantity: patch.quantity.or(self.quantity),
            brands: patch.brands.or(self.brands),
            categories: patch.categories.or(self.categories),
            labels: patch.labels.or(self.labels),
            cities: patch.cities.or(self.cities),
            purchase_places: patch.purchase_places.or(self.purchase_places),
            stores: patch.stores.or(self.stores),
            ingredients_text: patch.ingredients_text.or(self.ingredients_text),
            traces: patch.traces.or(self.traces),
            serving_size: patch.serving_size.or(self.serving_size),
            serving_quantity: patch.serving_quantity.or(self.serving_quantity),
            nutriscore_score: patch.nutriscore_score.or(self.nutriscore_score),
            nutriscore_grade: patch.nutriscore_grade.or(self.nutriscore_grade),
            main_category: patch.main_category.or(self.main_category),
            image_url: patch.image_url.or(self.image_url),
        }
    }
}

/// A product ready to be persisted; the storage layer assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub status: ProductStatus,
    pub imported_t: DateTime<Utc>,
    #[serde(flatten)]
    pub details: ProductDetails,
}

/// A product as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub code: String,
    pub status: ProductStatus,
    pub imported_t: DateTime<Utc>,
    #[serde(flatten)]
    pub details: ProductDetails,
}

impl Product {
    pub fn without_id(&self) -> NewProduct {
        NewProduct {
            code: self.code.clone(),
            status: self.status,
            imported_t: self.imported_t,
            details: self.details.clone(),
        }
    }
}

/// Partial update; every field left as `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub imported_t: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: ProductDetails,
}

impl ProductPatch {
    pub fn apply_to(self, current: NewProduct) -> NewProduct {
        NewProduct {
            code: self.code.unwrap_or(current.code),
            status: self.status.unwrap_or(current.status),
            imported_t: self.imported_t.unwrap_or(current.imported_t),
            details: current.details.merged_with(self.details),
        }
    }
}

/// One line of a catalog shard.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    #[serde(deserialize_with = "required_text")]
    pub code: String,
    #[serde(flatten)]
    pub details: ProductDetails,
}

impl CatalogRecord {
    /// Every freshly imported product starts as a draft.
    pub fn into_new_product(self, imported_t: DateTime<Utc>) -> NewProduct {
        NewProduct {
            code: self.code,
            status: ProductStatus::Draft,
            imported_t,
            details: self.details,
        }
    }
}

/// One orchestrator run as stored in the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportHistoryRecord {
    pub id: String,
    pub quantity_imported_products: u64,
    pub created_at: DateTime<Utc>,
    pub is_success: bool,
    pub runtime_in_milliseconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewImportHistory {
    pub quantity_imported_products: u64,
    pub created_at: DateTime<Utc>,
    pub is_success: bool,
    pub runtime_in_milliseconds: f64,
}

fn value_as_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn opaque_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_as_text(serde_json::Value::deserialize(deserializer)?))
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    value_as_text(serde_json::Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("code must not be null"))
}
