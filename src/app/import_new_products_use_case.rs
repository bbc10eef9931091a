use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::app::ports::{CatalogProviderPort, ProductsRepositoryPort};
use crate::error::{ErrorStatus, FetchError, StorageError};

#[derive(Error, Debug)]
pub enum ImportNewProductsError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ImportNewProductsError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            ImportNewProductsError::Storage(e) => e.status(),
            ImportNewProductsError::Fetch(e) => e.status(),
        }
    }
}

/// Pulls every catalog product not yet stored locally and persists it.
pub struct ImportNewProductsUseCase {
    products: Arc<dyn ProductsRepositoryPort>,
    provider: Arc<dyn CatalogProviderPort>,
    per_shard_cap: usize,
}

impl ImportNewProductsUseCase {
    pub fn new(
        products: Arc<dyn ProductsRepositoryPort>,
        provider: Arc<dyn CatalogProviderPort>,
        per_shard_cap: usize,
    ) -> Self {
        Self {
            products,
            provider,
            per_shard_cap,
        }
    }

    /// Returns the codes of the products persisted by this run.
    #[instrument(skip(self), fields(per_shard_cap = self.per_shard_cap))]
    pub async fn execute(&self) -> Result<Vec<String>, ImportNewProductsError> {
        let known_codes = self.products.list_codes().await?;
        info!("{} products already stored locally", known_codes.len());

        let new_products = self
            .provider
            .fetch_new_products(&known_codes, self.per_shard_cap)
            .await?;

        if new_products.is_empty() {
            info!("Catalog has no new products");
            return Ok(Vec::new());
        }

        self.products.save_many(&new_products).await?;
        crate::metrics::import::products_imported(new_products.len());
        info!("Imported {} new products", new_products.len());

        Ok(new_products.into_iter().map(|p| p.code).collect())
    }
}
