//! Metrics for the catalog sync pipeline
//!
//! Each phase owns a small submodule of recording helpers. Recording goes
//! through the `metrics` facade, so without an installed recorder every call
//! is a no-op; `init_metrics` installs the Prometheus exporter when a listen
//! address is configured.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Builds metric names as catalog_sync_{phase}_{name}[_total].
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("catalog_sync_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("catalog_sync_", $phase, "_", $name)
    };
}

/// Install the Prometheus exporter. Idempotent.
pub fn init_metrics(listen_addr: Option<SocketAddr>) {
    let Some(addr) = listen_addr else {
        info!("Metrics exporter disabled (no listen address configured)");
        return;
    };
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
        }
    });
}

pub mod import {
    pub fn run_recorded(is_success: bool) {
        let outcome = if is_success { "success" } else { "failure" };
        ::metrics::counter!(phase_metric!(counter, "import", "runs"), "outcome" => outcome).increment(1);
    }

    pub fn gated() {
        ::metrics::counter!(phase_metric!(counter, "import", "gated")).increment(1);
    }

    pub fn products_imported(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "import", "products_imported")).increment(count as u64);
    }
}

pub mod fetch {
    use crate::error::FetchStage;

    pub fn stage_failed(stage: FetchStage) {
        ::metrics::counter!(phase_metric!(counter, "fetch", "stage_failures"), "stage" => stage.as_str())
            .increment(1);
    }

    pub fn shard_downloaded(bytes: u64) {
        ::metrics::counter!(phase_metric!(counter, "fetch", "shards_downloaded")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "fetch", "shard_bytes")).record(bytes as f64);
    }

    pub fn shard_parsed(accepted: usize, skipped_known: usize) {
        ::metrics::histogram!(phase_metric!(histogram, "fetch", "shard_accepted")).record(accepted as f64);
        ::metrics::counter!(phase_metric!(counter, "fetch", "records_skipped_known")).increment(skipped_known as u64);
    }
}

pub mod use_case {
    pub fn duration(use_case: &'static str, runtime_in_ms: f64, is_success: bool) {
        let outcome = if is_success { "success" } else { "failure" };
        ::metrics::histogram!(
            phase_metric!(histogram, "use_case", "duration_ms"),
            "use_case" => use_case,
            "outcome" => outcome
        )
        .record(runtime_in_ms);
    }
}
