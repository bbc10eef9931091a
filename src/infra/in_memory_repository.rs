use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::app::ports::{ImportHistoryPort, ProductsRepositoryPort};
use crate::domain::{ImportHistoryRecord, NewImportHistory, NewProduct, Product, ProductStatus};
use crate::error::{RepositoryName, StorageError};

/// In-memory storage implementation for development/testing
///
/// Products keep insertion order so pagination is stable. `set_offline`
/// makes every call fail with a storage error.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    products: Mutex<Vec<Product>>,
    history: Mutex<Vec<ImportHistoryRecord>>,
    offline: AtomicBool,
    history_save_failing: AtomicBool,
    save_many_calls: AtomicUsize,
    history_save_calls: AtomicUsize,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<NewProduct>) -> Self {
        let store = Self::new();
        store
            .products
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(products.into_iter().map(with_fresh_id));
        store
    }

    pub fn with_history(self, record: ImportHistoryRecord) -> Self {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).push(record);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes only history `save` fail; reads keep working.
    pub fn set_history_save_failing(&self, failing: bool) {
        self.history_save_failing.store(failing, Ordering::SeqCst);
    }

    pub fn save_many_calls(&self) -> usize {
        self.save_many_calls.load(Ordering::SeqCst)
    }

    pub fn history_save_calls(&self) -> usize {
        self.history_save_calls.load(Ordering::SeqCst)
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn history(&self) -> Vec<ImportHistoryRecord> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check_online(&self, repository: RepositoryName, method: &'static str) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            let err = StorageError::new(repository, method, "in-memory store offline");
            error!("{}", err);
            return Err(err);
        }
        Ok(())
    }
}

fn with_fresh_id(product: NewProduct) -> Product {
    Product {
        id: Uuid::new_v4().to_string(),
        code: product.code,
        status: product.status,
        imported_t: product.imported_t,
        details: product.details,
    }
}

fn missing(method: &'static str, code: &str) -> StorageError {
    let err = StorageError::new(RepositoryName::Products, method, format!("no product with code {code}"));
    error!("{}", err);
    err
}

#[async_trait]
impl ProductsRepositoryPort for InMemoryCatalogStore {
    async fn list_codes(&self) -> Result<Vec<String>, StorageError> {
        self.check_online(RepositoryName::Products, "get all")?;
        let products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        Ok(products.iter().map(|p| p.code.clone()).collect())
    }

    async fn save_many(&self, products: &[NewProduct]) -> Result<(), StorageError> {
        self.save_many_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online(RepositoryName::Products, "save many")?;
        let mut stored = self.products.lock().unwrap_or_else(|e| e.into_inner());
        stored.extend(products.iter().cloned().map(with_fresh_id));
        debug!("Saved {} products in memory", products.len());
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Product>, StorageError> {
        self.check_online(RepositoryName::Products, "find")?;
        let products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        Ok(products.iter().find(|p| p.code == code).cloned())
    }

    async fn update(&self, code: &str, product: &NewProduct) -> Result<(), StorageError> {
        self.check_online(RepositoryName::Products, "update")?;
        let mut products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        let stored = products
            .iter_mut()
            .find(|p| p.code == code)
            .ok_or_else(|| missing("update", code))?;
        stored.code = product.code.clone();
        stored.status = product.status;
        stored.imported_t = product.imported_t;
        stored.details = product.details.clone();
        Ok(())
    }

    async fn soft_delete(&self, code: &str) -> Result<Product, StorageError> {
        self.check_online(RepositoryName::Products, "soft delete")?;
        let mut products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        let stored = products
            .iter_mut()
            .find(|p| p.code == code)
            .ok_or_else(|| missing("soft delete", code))?;
        stored.status = ProductStatus::Trash;
        Ok(stored.clone())
    }

    async fn list_page(&self, skip: u64, take: u64) -> Result<Vec<Product>, StorageError> {
        self.check_online(RepositoryName::Products, "get with pagination")?;
        let products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        Ok(products
            .iter()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ImportHistoryPort for InMemoryCatalogStore {
    async fn find_last(&self) -> Result<Option<ImportHistoryRecord>, StorageError> {
        self.check_online(RepositoryName::ProductsImportHistory, "find last")?;
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        Ok(history.iter().max_by_key(|r| r.created_at).cloned())
    }

    async fn save(&self, record: &NewImportHistory) -> Result<(), StorageError> {
        self.history_save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online(RepositoryName::ProductsImportHistory, "save")?;
        if self.history_save_failing.load(Ordering::SeqCst) {
            let err = StorageError::new(RepositoryName::ProductsImportHistory, "save", "history table is read-only");
            error!("{}", err);
            return Err(err);
        }
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ImportHistoryRecord {
                id: Uuid::new_v4().to_string(),
                quantity_imported_products: record.quantity_imported_products,
                created_at: record.created_at,
                is_success: record.is_success,
                runtime_in_milliseconds: record.runtime_in_milliseconds,
            });
        Ok(())
    }
}
