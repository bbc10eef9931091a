use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::app::ports::{ImportHistoryPort, ProductsRepositoryPort};
use crate::domain::{ImportHistoryRecord, NewImportHistory, NewProduct, Product, ProductDetails, ProductStatus};
use crate::error::{BoxError, RepositoryName, StorageError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        id          TEXT PRIMARY KEY,
        code        TEXT NOT NULL UNIQUE,
        status      TEXT NOT NULL,
        imported_t  TEXT NOT NULL,
        details     TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS products_import_history (
        id                          TEXT PRIMARY KEY,
        quantity_imported_products  INTEGER NOT NULL,
        created_at                  INTEGER NOT NULL,
        is_success                  INTEGER NOT NULL,
        runtime_in_milliseconds     REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_import_history_created_at
        ON products_import_history (created_at);
"#;

/// Products and import history in one SQLite file.
///
/// Descriptive product attributes live in a single JSON column; only the
/// fields the import pipeline reads or writes get their own columns.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

type ProductRow = (String, String, String, String, String);

impl SqliteCatalogStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(RepositoryName::Products, "open", e))?;
        }
        let conn = Connection::open(db_path).map_err(|e| fail(RepositoryName::Products, "open", e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| fail(RepositoryName::Products, "open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        // journal_mode answers with a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| fail(RepositoryName::Products, "migrate", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| fail(RepositoryName::Products, "migrate", e))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wraps and logs a storage failure where it happens.
fn fail(repository: RepositoryName, method: &'static str, source: impl Into<BoxError>) -> StorageError {
    let err = StorageError::new(repository, method, source);
    error!(repository = %repository, method, "{}", err);
    err
}

fn products_fail(method: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| fail(RepositoryName::Products, method, e)
}

fn history_fail(method: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| fail(RepositoryName::ProductsImportHistory, method, e)
}

fn product_from_row(method: &'static str, row: ProductRow) -> Result<Product, StorageError> {
    let (id, code, status, imported_t, details) = row;
    let imported_t = DateTime::parse_from_rfc3339(&imported_t)
        .map_err(|e| fail(RepositoryName::Products, method, e))?
        .with_timezone(&Utc);
    let details: ProductDetails =
        serde_json::from_str(&details).map_err(|e| fail(RepositoryName::Products, method, e))?;
    Ok(Product {
        id,
        code,
        status: ProductStatus::parse(&status),
        imported_t,
        details,
    })
}

fn read_product_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn find_by_code(conn: &Connection, method: &'static str, code: &str) -> Result<Option<Product>, StorageError> {
    let row = conn
        .query_row(
            "SELECT id, code, status, imported_t, details FROM products WHERE code = ?1",
            params![code],
            read_product_row,
        )
        .optional()
        .map_err(products_fail(method))?;
    row.map(|r| product_from_row(method, r)).transpose()
}

#[async_trait]
impl ProductsRepositoryPort for SqliteCatalogStore {
    async fn list_codes(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT code FROM products")
            .map_err(products_fail("get all"))?;
        let codes = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(products_fail("get all"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(products_fail("get all"))?;
        Ok(codes)
    }

    async fn save_many(&self, products: &[NewProduct]) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(products_fail("save many"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO products (id, code, status, imported_t, details) VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(products_fail("save many"))?;
            for product in products {
                let details = serde_json::to_string(&product.details)
                    .map_err(|e| fail(RepositoryName::Products, "save many", e))?;
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    product.code,
                    product.status.as_str(),
                    product.imported_t.to_rfc3339(),
                    details,
                ])
                .map_err(products_fail("save many"))?;
            }
        }
        tx.commit().map_err(products_fail("save many"))?;
        debug!("Saved {} products", products.len());
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Product>, StorageError> {
        find_by_code(&self.conn(), "find", code)
    }

    async fn update(&self, code: &str, product: &NewProduct) -> Result<(), StorageError> {
        let conn = self.conn();
        let details = serde_json::to_string(&product.details)
            .map_err(|e| fail(RepositoryName::Products, "update", e))?;
        let changed = conn
            .execute(
                "UPDATE products SET code = ?1, status = ?2, imported_t = ?3, details = ?4 WHERE code = ?5",
                params![
                    product.code,
                    product.status.as_str(),
                    product.imported_t.to_rfc3339(),
                    details,
                    code
                ],
            )
            .map_err(products_fail("update"))?;
        if changed == 0 {
            return Err(fail(RepositoryName::Products, "update", format!("no product with code {code}")));
        }
        Ok(())
    }

    async fn soft_delete(&self, code: &str) -> Result<Product, StorageError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE products SET status = ?1 WHERE code = ?2",
            params![ProductStatus::Trash.as_str(), code],
        )
        .map_err(products_fail("soft delete"))?;
        find_by_code(&conn, "soft delete", code)?
            .ok_or_else(|| fail(RepositoryName::Products, "soft delete", format!("no product with code {code}")))
    }

    async fn list_page(&self, skip: u64, take: u64) -> Result<Vec<Product>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, code, status, imported_t, details FROM products ORDER BY rowid LIMIT ?1 OFFSET ?2")
            .map_err(products_fail("get with pagination"))?;
        let rows = stmt
            .query_map(params![take as i64, skip as i64], read_product_row)
            .map_err(products_fail("get with pagination"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(products_fail("get with pagination"))?;
        rows.into_iter()
            .map(|r| product_from_row("get with pagination", r))
            .collect()
    }
}

#[async_trait]
impl ImportHistoryPort for SqliteCatalogStore {
    async fn find_last(&self) -> Result<Option<ImportHistoryRecord>, StorageError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, quantity_imported_products, created_at, is_success, runtime_in_milliseconds
                 FROM products_import_history ORDER BY created_at DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(history_fail("find last"))?;

        let Some((id, quantity, created_at_ms, is_success, runtime)) = row else {
            return Ok(None);
        };
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            fail(
                RepositoryName::ProductsImportHistory,
                "find last",
                format!("created_at out of range: {created_at_ms}"),
            )
        })?;
        Ok(Some(ImportHistoryRecord {
            id,
            quantity_imported_products: quantity.max(0) as u64,
            created_at,
            is_success,
            runtime_in_milliseconds: runtime,
        }))
    }

    async fn save(&self, record: &NewImportHistory) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO products_import_history
                 (id, quantity_imported_products, created_at, is_success, runtime_in_milliseconds)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    record.quantity_imported_products as i64,
                    record.created_at.timestamp_millis(),
                    record.is_success,
                    record.runtime_in_milliseconds,
                ],
            )
            .map_err(history_fail("save"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product(code: &str, name: &str) -> NewProduct {
        NewProduct {
            code: code.to_string(),
            status: ProductStatus::Draft,
            imported_t: Utc::now(),
            details: ProductDetails {
                product_name: Some(name.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn saves_and_reads_back_products() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .save_many(&[product("001", "Oats"), product("002", "Rice")])
            .await
            .unwrap();

        assert_eq!(store.list_codes().await.unwrap(), vec!["001", "002"]);
        let found = store.find("002").await.unwrap().unwrap();
        assert_eq!(found.details.product_name.as_deref(), Some("Rice"));
        assert_eq!(found.status, ProductStatus::Draft);
        assert!(store.find("003").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected_and_batch_rolls_back() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.save_many(&[product("001", "Oats")]).await.unwrap();

        let result = store
            .save_many(&[product("002", "Rice"), product("001", "Oats again")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.list_codes().await.unwrap(), vec!["001"]);
    }

    #[tokio::test]
    async fn soft_delete_marks_trash() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.save_many(&[product("001", "Oats")]).await.unwrap();

        let deleted = store.soft_delete("001").await.unwrap();
        assert_eq!(deleted.status, ProductStatus::Trash);
        assert!(store.soft_delete("999").await.is_err());
    }

    #[tokio::test]
    async fn pagination_follows_insertion_order() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let batch: Vec<_> = (0..5).map(|i| product(&format!("{i:03}"), "x")).collect();
        store.save_many(&batch).await.unwrap();

        let page = store.list_page(2, 2).await.unwrap();
        let codes: Vec<_> = page.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["002", "003"]);
    }

    #[tokio::test]
    async fn history_find_last_orders_by_creation_time() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        assert!(store.find_last().await.unwrap().is_none());

        let now = Utc::now();
        for (qty, hours_ago) in [(10u64, 48i64), (20, 2), (30, 26)] {
            store
                .save(&NewImportHistory {
                    quantity_imported_products: qty,
                    created_at: now - Duration::hours(hours_ago),
                    is_success: qty != 30,
                    runtime_in_milliseconds: 12.5,
                })
                .await
                .unwrap();
        }

        let last = store.find_last().await.unwrap().unwrap();
        assert_eq!(last.quantity_imported_products, 20);
        assert!(last.is_success);
        assert_eq!(last.runtime_in_milliseconds, 12.5);
        assert_eq!(
            last.created_at.timestamp_millis(),
            (now - Duration::hours(2)).timestamp_millis()
        );
    }
}
