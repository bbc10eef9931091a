//! Builds the adapters named by the configuration and hands them to the use
//! cases as `Arc<dyn Port>`.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::app::import_new_products_use_case::ImportNewProductsUseCase;
use crate::app::ports::{CatalogProviderPort, ImportHistoryPort, ProductsRepositoryPort, UseCaseLogPort};
use crate::app::product_use_cases::{
    DeleteProductUseCase, FindProductUseCase, GetLastImportHistoryUseCase, ListProductsUseCase, UpdateProductUseCase,
};
use crate::app::scheduled_import_use_case::ScheduledImportUseCase;
use crate::config::Config;
use crate::infra::catalog_fetcher::CatalogFetcher;
use crate::infra::http_client::ReqwestDownloader;
use crate::infra::sqlite_repository::SqliteCatalogStore;
use crate::infra::use_case_logger::TracingUseCaseLogger;

pub struct AppServices {
    pub scheduled_import: Arc<ScheduledImportUseCase>,
    pub find_product: FindProductUseCase,
    pub update_product: UpdateProductUseCase,
    pub delete_product: DeleteProductUseCase,
    pub list_products: ListProductsUseCase,
    pub last_import: GetLastImportHistoryUseCase,
}

impl AppServices {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteCatalogStore::open(&config.storage.database_path)
                .with_context(|| format!("opening database {}", config.storage.database_path.display()))?,
        );
        info!("Using SQLite store at {}", config.storage.database_path.display());

        let downloader = Arc::new(ReqwestDownloader::new(config.http_timeout())?);
        let fetcher = Arc::new(CatalogFetcher::new(
            downloader,
            config.catalog.base_url.clone(),
            config.catalog.index_file.clone(),
            config.catalog.tmp_dir.clone(),
        ));

        Ok(Self::wire(
            store.clone(),
            store,
            fetcher,
            Arc::new(TracingUseCaseLogger),
            config,
        ))
    }

    /// Wires use cases over already-built adapters.
    pub fn wire(
        products: Arc<dyn ProductsRepositoryPort>,
        history: Arc<dyn ImportHistoryPort>,
        provider: Arc<dyn CatalogProviderPort>,
        logger: Arc<dyn UseCaseLogPort>,
        config: &Config,
    ) -> Self {
        let import = Arc::new(ImportNewProductsUseCase::new(
            products.clone(),
            provider,
            config.import.per_shard_cap,
        ));
        let scheduled_import = Arc::new(ScheduledImportUseCase::new(
            history.clone(),
            import,
            logger.clone(),
            config.cooldown(),
        ));

        Self {
            scheduled_import,
            find_product: FindProductUseCase::new(products.clone(), logger.clone()),
            update_product: UpdateProductUseCase::new(products.clone(), logger.clone()),
            delete_product: DeleteProductUseCase::new(products.clone(), logger.clone()),
            list_products: ListProductsUseCase::new(products, logger.clone()),
            last_import: GetLastImportHistoryUseCase::new(history, logger),
        }
    }
}
