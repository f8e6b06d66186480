use chrono::Local;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer flushing; drop it only at process exit.
pub struct LogGuard {
    pub path: Option<PathBuf>,
    _worker: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// With `print` set, events go to stderr. Otherwise a timestamped log file is
/// created under `log_dir` and written through a non-blocking appender. If the
/// file cannot be opened, logging falls back to stderr.
pub fn init_tracing(log_dir: Option<PathBuf>, print: bool) -> LogGuard {
    if print {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
        return LogGuard {
            path: None,
            _worker: None,
        };
    }

    let log_dir = log_dir.unwrap_or_else(|| PathBuf::from("."));
    let timestamp = Local::now().format("%Y-%m-%dT%H%M%S").to_string();
    let log_path = log_dir.join(format!("{}.log", timestamp));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path);

    match file {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init();
            LogGuard {
                path: Some(log_path),
                _worker: Some(guard),
            }
        }
        Err(_) => init_tracing(None, true),
    }
}
