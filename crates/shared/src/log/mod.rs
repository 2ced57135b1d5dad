// Logging - tracing subscriber setup
//
// One ANSI console layer, plus a daily-rolling file layer when a log
// directory is configured. `RUST_LOG` overrides the configured level.

use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn initialize_logging(log_dir: Option<&str>, log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false);

    if let Some(dir) = log_dir {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let file_appender = rolling::daily(dir, "logond.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The writer guard must outlive the process to flush on exit.
        std::mem::forget(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
    }
}
