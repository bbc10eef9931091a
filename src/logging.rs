use std::fs;
use std::path::Path;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Human-readable events on stdout, JSON events in `log_dir`, one file per
/// day. `RUST_LOG` adds to the `catalog_sync=info` baseline.
pub fn init_logging(log_dir: &Path) {
    let _ = fs::create_dir_all(log_dir);

    let (json_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "catalog_sync.log"));

    let filter = match "catalog_sync=info".parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(json_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .try_init();

    // The writer flushes on drop, so the guard lives as long as the process.
    if installed.is_ok() {
        std::mem::forget(guard);
    }
}
