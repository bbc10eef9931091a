//! Read, update and delete operations over locally stored products.
//!
//! Trashed products and products with an invalid status are treated as
//! absent: lookups report them as not found and listings leave them out.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::app::ports::{ImportHistoryPort, ProductsRepositoryPort, UseCaseLogPort};
use crate::app::timing::timed;
use crate::domain::{ImportHistoryRecord, Product, ProductPatch, ProductStatus};
use crate::error::{ErrorStatus, StorageError};

/// Page sizes a listing may ask for.
pub const ALLOWED_PAGE_SIZES: [u64; 3] = [10, 30, 50];

#[derive(Error, Debug)]
pub enum ProductError {
    #[error("Product with code {code} not exists.")]
    NotFound { code: String },
    #[error("Invalid pagination parameters: skip = {skip}, take = {take}")]
    InvalidPagination { skip: i64, take: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProductError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            ProductError::NotFound { .. } => ErrorStatus::NotFound,
            ProductError::InvalidPagination { .. } => ErrorStatus::Invalid,
            ProductError::Storage(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateConfirmation {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedProduct {
    pub id: String,
    pub code: String,
    pub status: ProductStatus,
}

fn is_visible(product: &Product) -> bool {
    !matches!(product.status, ProductStatus::Trash | ProductStatus::Invalid)
}

async fn find_visible(repo: &dyn ProductsRepositoryPort, code: &str) -> Result<Product, ProductError> {
    repo.find(code)
        .await?
        .filter(is_visible)
        .ok_or_else(|| ProductError::NotFound { code: code.to_string() })
}

pub struct FindProductUseCase {
    products: Arc<dyn ProductsRepositoryPort>,
    logger: Arc<dyn UseCaseLogPort>,
}

impl FindProductUseCase {
    pub fn new(products: Arc<dyn ProductsRepositoryPort>, logger: Arc<dyn UseCaseLogPort>) -> Self {
        Self { products, logger }
    }

    pub async fn execute(&self, code: &str) -> Result<Product, ProductError> {
        timed("FindProduct", self.logger.as_ref(), find_visible(self.products.as_ref(), code)).await
    }
}

pub struct UpdateProductUseCase {
    products: Arc<dyn ProductsRepositoryPort>,
    logger: Arc<dyn UseCaseLogPort>,
}

impl UpdateProductUseCase {
    pub fn new(products: Arc<dyn ProductsRepositoryPort>, logger: Arc<dyn UseCaseLogPort>) -> Self {
        Self { products, logger }
    }

    /// Fields left out of `patch` keep their stored value.
    pub async fn execute(&self, code: &str, patch: ProductPatch) -> Result<UpdateConfirmation, ProductError> {
        timed("UpdateProduct", self.logger.as_ref(), async {
            let current = find_visible(self.products.as_ref(), code).await?;
            let updated = patch.apply_to(current.without_id());
            self.products.update(code, &updated).await?;
            Ok(UpdateConfirmation {
                message: "Product updated successfully.".to_string(),
            })
        })
        .await
    }
}

pub struct DeleteProductUseCase {
    products: Arc<dyn ProductsRepositoryPort>,
    logger: Arc<dyn UseCaseLogPort>,
}

impl DeleteProductUseCase {
    pub fn new(products: Arc<dyn ProductsRepositoryPort>, logger: Arc<dyn UseCaseLogPort>) -> Self {
        Self { products, logger }
    }

    pub async fn execute(&self, code: &str) -> Result<DeletedProduct, ProductError> {
        timed("DeleteProduct", self.logger.as_ref(), async {
            let product = find_visible(self.products.as_ref(), code).await?;
            let deleted = self.products.soft_delete(&product.code).await?;
            Ok(DeletedProduct {
                id: deleted.id,
                code: deleted.code,
                status: deleted.status,
            })
        })
        .await
    }
}

pub struct ListProductsUseCase {
    products: Arc<dyn ProductsRepositoryPort>,
    logger: Arc<dyn UseCaseLogPort>,
}

impl ListProductsUseCase {
    pub fn new(products: Arc<dyn ProductsRepositoryPort>, logger: Arc<dyn UseCaseLogPort>) -> Self {
        Self { products, logger }
    }

    pub async fn execute(&self, skip: i64, take: u64) -> Result<Vec<Product>, ProductError> {
        timed("ListProducts", self.logger.as_ref(), async {
            if skip < 0 || !ALLOWED_PAGE_SIZES.contains(&take) {
                return Err(ProductError::InvalidPagination { skip, take });
            }
            let page = self.products.list_page(skip as u64, take).await?;
            Ok(page.into_iter().filter(is_visible).collect())
        })
        .await
    }
}

pub struct GetLastImportHistoryUseCase {
    history: Arc<dyn ImportHistoryPort>,
    logger: Arc<dyn UseCaseLogPort>,
}

impl GetLastImportHistoryUseCase {
    pub fn new(history: Arc<dyn ImportHistoryPort>, logger: Arc<dyn UseCaseLogPort>) -> Self {
        Self { history, logger }
    }

    pub async fn execute(&self) -> Result<Option<ImportHistoryRecord>, StorageError> {
        timed("GetLastProductsImportHistory", self.logger.as_ref(), self.history.find_last()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::UseCaseTiming;
    use crate::domain::{NewImportHistory, NewProduct, ProductDetails};
    use crate::infra::in_memory_repository::InMemoryCatalogStore;
    use chrono::{Duration, Utc};

    struct NoopLogger;

    impl UseCaseLogPort for NoopLogger {
        fn log_use_case_time(&self, _timing: &UseCaseTiming) {}
    }

    fn product(code: &str, status: ProductStatus) -> NewProduct {
        NewProduct {
            code: code.to_string(),
            status,
            imported_t: Utc::now(),
            details: ProductDetails {
                product_name: Some(format!("name {code}")),
                brands: Some("Acme".to_string()),
                ..Default::default()
            },
        }
    }

    fn store(products: Vec<NewProduct>) -> Arc<InMemoryCatalogStore> {
        Arc::new(InMemoryCatalogStore::with_products(products))
    }

    #[tokio::test]
    async fn find_returns_stored_product() {
        let store = store(vec![product("100", ProductStatus::Published)]);
        let found = FindProductUseCase::new(store, Arc::new(NoopLogger)).execute("100").await.unwrap();
        assert_eq!(found.code, "100");
        assert_eq!(found.details.brands.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn find_hides_trashed_and_missing_products() {
        let store = store(vec![product("100", ProductStatus::Trash)]);
        let use_case = FindProductUseCase::new(store, Arc::new(NoopLogger));

        let trashed = use_case.execute("100").await.unwrap_err();
        assert_eq!(trashed.status(), ErrorStatus::NotFound);
        assert!(matches!(use_case.execute("404").await, Err(ProductError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_merges_patch_over_stored_fields() {
        let store = store(vec![product("100", ProductStatus::Draft)]);
        let use_case = UpdateProductUseCase::new(store.clone(), Arc::new(NoopLogger));

        let patch = ProductPatch {
            status: Some(ProductStatus::Published),
            details: ProductDetails {
                product_name: Some("Renamed".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let confirmation = use_case.execute("100", patch).await.unwrap();
        assert_eq!(confirmation.message, "Product updated successfully.");

        let stored = &store.products()[0];
        assert_eq!(stored.status, ProductStatus::Published);
        assert_eq!(stored.details.product_name.as_deref(), Some("Renamed"));
        assert_eq!(stored.details.brands.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn update_of_unknown_product_is_not_found() {
        let store = store(vec![]);
        let err = UpdateProductUseCase::new(store, Arc::new(NoopLogger))
            .execute("404", ProductPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProductError::NotFound { code } if code == "404"));
    }

    #[tokio::test]
    async fn delete_moves_product_to_trash() {
        let store = store(vec![product("100", ProductStatus::Published)]);
        let use_case = DeleteProductUseCase::new(store.clone(), Arc::new(NoopLogger));

        let deleted = use_case.execute("100").await.unwrap();
        assert_eq!(deleted.code, "100");
        assert_eq!(deleted.status, ProductStatus::Trash);
        assert_eq!(deleted.id, store.products()[0].id);

        // a second delete no longer sees it
        assert!(matches!(use_case.execute("100").await, Err(ProductError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_validates_pagination() {
        let use_case = ListProductsUseCase::new(store(vec![]), Arc::new(NoopLogger));

        for (skip, take) in [(-1, 10), (0, 20), (0, 0)] {
            let err = use_case.execute(skip, take).await.unwrap_err();
            assert_eq!(err.status(), ErrorStatus::Invalid, "skip={skip} take={take}");
        }
    }

    #[tokio::test]
    async fn list_pages_in_insertion_order_without_trash() {
        let mut products: Vec<NewProduct> = (0..12)
            .map(|i| product(&format!("{i:03}"), ProductStatus::Draft))
            .collect();
        products[1].status = ProductStatus::Trash;
        let use_case = ListProductsUseCase::new(store(products), Arc::new(NoopLogger));

        let first = use_case.execute(0, 10).await.unwrap();
        assert_eq!(first.len(), 9);
        assert_eq!(first[0].code, "000");
        assert_eq!(first[1].code, "002");

        let second = use_case.execute(10, 10).await.unwrap();
        let codes: Vec<&str> = second.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["010", "011"]);
    }

    #[tokio::test]
    async fn last_import_history_is_most_recent_record() {
        let store = Arc::new(InMemoryCatalogStore::new());
        let use_case = GetLastImportHistoryUseCase::new(store.clone(), Arc::new(NoopLogger));
        assert!(use_case.execute().await.unwrap().is_none());

        for (hours_ago, quantity) in [(48, 1), (2, 7), (30, 3)] {
            store
                .save(&NewImportHistory {
                    quantity_imported_products: quantity,
                    created_at: Utc::now() - Duration::hours(hours_ago),
                    is_success: true,
                    runtime_in_milliseconds: 5.0,
                })
                .await
                .unwrap();
        }

        let last = use_case.execute().await.unwrap().unwrap();
        assert_eq!(last.quantity_imported_products, 7);
    }
}
