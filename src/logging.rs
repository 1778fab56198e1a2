//! Structured logging setup. A long-running daemon wants level-aware,
//! timestamped, multi-target output rather than the teacher's one-shot
//! benchmark-CLI formatter (`ColorizedFormatter`), so this builds a
//! layered `tracing-subscriber` registry: an `EnvFilter` derived from
//! `-v` repeats, a stderr layer, and an optional rolling file layer via
//! `tracing-appender`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Map `-v` repeat count to a default level, overridable via
/// `RUST_LOG`.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Returns the file appender's guard,
/// which must be held for the process lifetime to flush on drop.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("orchestrator.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            let subscriber = tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer);
            tracing::subscriber::set_global_default(subscriber).expect("global subscriber installed once");
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::registry().with(filter).with(stderr_layer);
            tracing::subscriber::set_global_default(subscriber).expect("global subscriber installed once");
            None
        }
    }
}
