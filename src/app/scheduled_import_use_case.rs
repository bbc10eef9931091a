use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::app::import_new_products_use_case::ImportNewProductsUseCase;
use crate::app::ports::{ImportHistoryPort, UseCaseLogPort};
use crate::app::timing::timed;
use crate::domain::NewImportHistory;
use crate::error::{ErrorStatus, StorageError};

pub const IMPORT_NEW_PRODUCTS: &str = "ImportNewProducts";
pub const CRON_IMPORT_NEW_PRODUCTS: &str = "CronImportNewProducts";

#[derive(Error, Debug)]
pub enum ScheduledImportError {
    #[error("last import was too recent, next one allowed in {time_left_ms} ms")]
    TooSoon { time_left_ms: i64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ScheduledImportError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            ScheduledImportError::TooSoon { .. } => ErrorStatus::Invalid,
            ScheduledImportError::Storage(e) => e.status(),
        }
    }
}

/// What a run that got past the cooldown gate did. Mirrors the history
/// record it wrote, plus the failure message when acquisition failed.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRunReport {
    pub created_at: DateTime<Utc>,
    pub is_success: bool,
    pub quantity_imported_products: u64,
    pub runtime_in_milliseconds: f64,
    pub imported_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Rate-limited wrapper around the acquisition use case. Every run that
/// passes the cooldown leaves exactly one history record behind.
pub struct ScheduledImportUseCase {
    history: Arc<dyn ImportHistoryPort>,
    import: Arc<ImportNewProductsUseCase>,
    logger: Arc<dyn UseCaseLogPort>,
    cooldown: Duration,
}

impl ScheduledImportUseCase {
    pub fn new(
        history: Arc<dyn ImportHistoryPort>,
        import: Arc<ImportNewProductsUseCase>,
        logger: Arc<dyn UseCaseLogPort>,
        cooldown: Duration,
    ) -> Self {
        Self {
            history,
            import,
            logger,
            cooldown,
        }
    }

    #[instrument(skip(self), fields(cooldown_ms = self.cooldown.num_milliseconds()))]
    pub async fn execute(&self) -> Result<ImportRunReport, ScheduledImportError> {
        timed(CRON_IMPORT_NEW_PRODUCTS, self.logger.as_ref(), self.run()).await
    }

    async fn run(&self) -> Result<ImportRunReport, ScheduledImportError> {
        self.check_cooldown().await?;

        let started = Instant::now();
        let outcome = timed(IMPORT_NEW_PRODUCTS, self.logger.as_ref(), self.import.execute()).await;
        let runtime_in_milliseconds = started.elapsed().as_secs_f64() * 1000.0;

        let (imported_codes, failure) = match outcome {
            Ok(codes) => (codes, None),
            Err(e) => {
                error!("Product import failed: {}", e);
                (Vec::new(), Some(e.to_string()))
            }
        };
        let is_success = failure.is_none();

        let record = NewImportHistory {
            quantity_imported_products: imported_codes.len() as u64,
            created_at: Utc::now(),
            is_success,
            runtime_in_milliseconds,
        };
        self.history.save(&record).await?;
        crate::metrics::import::run_recorded(is_success);
        info!(
            is_success,
            imported = record.quantity_imported_products,
            "Import run recorded in {:.1} ms",
            runtime_in_milliseconds
        );

        Ok(ImportRunReport {
            created_at: record.created_at,
            is_success,
            quantity_imported_products: record.quantity_imported_products,
            runtime_in_milliseconds,
            imported_codes,
            failure,
        })
    }

    async fn check_cooldown(&self) -> Result<(), ScheduledImportError> {
        let Some(last) = self.history.find_last().await? else {
            info!("No previous import recorded");
            return Ok(());
        };

        let elapsed = Utc::now().signed_duration_since(last.created_at);
        let time_left = self.cooldown.checked_sub(&elapsed).unwrap_or(Duration::MAX);
        if time_left > Duration::zero() {
            crate::metrics::import::gated();
            return Err(ScheduledImportError::TooSoon {
                time_left_ms: time_left.num_milliseconds(),
            });
        }
        Ok(())
    }
}
