//! Tracing subscriber setup: console on stderr, optional JSON log file.

use std::path::Path;

use evlb_config::Logging;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::FILE_GUARD;

/// Install the global subscriber. `RUST_LOG` overrides `console_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(console_level: &str, json: bool, file_cfg: Option<&Logging>) {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level));
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = file_cfg.and_then(|l| {
        let path = Path::new(l.file.as_deref()?);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name()?;
        let appender = match l.rotation.as_deref() {
            Some("daily") => rolling::daily(dir, name),
            Some("hourly") => rolling::hourly(dir, name),
            _ => rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = l.level.as_deref().unwrap_or("info");
        Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(level)),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init();
}
