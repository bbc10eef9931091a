use async_trait::async_trait;
use std::path::Path;

use crate::domain::{ImportHistoryRecord, NewImportHistory, NewProduct, Product};
use crate::error::{FetchError, StorageError};

// Catalog-side ports
#[async_trait]
pub trait ProductsRepositoryPort: Send + Sync {
    /// Codes of every product stored locally.
    async fn list_codes(&self) -> Result<Vec<String>, StorageError>;
    async fn save_many(&self, products: &[NewProduct]) -> Result<(), StorageError>;
    async fn find(&self, code: &str) -> Result<Option<Product>, StorageError>;
    async fn update(&self, code: &str, product: &NewProduct) -> Result<(), StorageError>;
    /// Marks the product as trash and returns it as stored afterwards.
    async fn soft_delete(&self, code: &str) -> Result<Product, StorageError>;
    async fn list_page(&self, skip: u64, take: u64) -> Result<Vec<Product>, StorageError>;
}

#[async_trait]
pub trait ImportHistoryPort: Send + Sync {
    async fn find_last(&self) -> Result<Option<ImportHistoryRecord>, StorageError>;
    async fn save(&self, record: &NewImportHistory) -> Result<(), StorageError>;
}

// Provider-side ports
#[async_trait]
pub trait CatalogProviderPort: Send + Sync {
    async fn fetch_new_products(
        &self,
        known_codes: &[String],
        per_shard_cap: usize,
    ) -> Result<Vec<NewProduct>, FetchError>;
}

#[async_trait]
pub trait FileDownloaderPort: Send + Sync {
    /// Downloads `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64>;
}

// Observability
#[derive(Clone, Debug, PartialEq)]
pub struct UseCaseTiming {
    pub use_case: &'static str,
    pub runtime_in_ms: f64,
    pub is_success: bool,
}

pub trait UseCaseLogPort: Send + Sync {
    fn log_use_case_time(&self, timing: &UseCaseTiming);
}
