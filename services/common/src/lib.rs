use std::{
    env, fs, io,
    net::SocketAddr,
    panic,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::{Duration, SystemTime},
};
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_LOG_DIR: &str = "/var/log/aquapin";

/// Keeps the non-blocking file writer alive; drop it only at process exit.
pub struct TracingGuards {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_tracing(service_name: &str) -> TracingGuards {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_root = PathBuf::from(env_or("LOG_DIR", DEFAULT_LOG_DIR.to_string())).join(service_name);
    let stdout_layer = fmt::layer().with_writer(io::stdout);

    // File output is best effort: read-only containers still get stdout.
    let file_writer = fs::create_dir_all(&log_root)
        .ok()
        .and_then(|_| {
            panic::catch_unwind(|| {
                tracing_appender::rolling::daily(&log_root, format!("{service_name}.log"))
            })
            .ok()
        })
        .map(tracing_appender::non_blocking);

    let file_guard = match file_writer {
        Some((writer, guard)) => {
            let subscriber = Registry::default()
                .with(filter)
                .with(stdout_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer));
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = Registry::default().with(filter).with(stdout_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    };

    if file_guard.is_some() {
        let retention_days = env_or("LOG_RETENTION_DAYS", 14u64);
        let cleanup_interval = env_or("LOG_CLEANUP_INTERVAL_MINUTES", 360u64);
        spawn_log_pruner(log_root, retention_days, cleanup_interval);
    } else {
        tracing::warn!(service = service_name, "file logging disabled, writing to stdout only");
    }

    TracingGuards {
        _file_guard: file_guard,
    }
}

/// Reads a typed environment value, falling back when unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| parse_trimmed(&value))
        .unwrap_or(default)
}

/// Reads an optional environment value; blank strings count as unset.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_trimmed<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse::<T>().ok()
}

fn spawn_log_pruner(log_root: PathBuf, retention_days: u64, interval_minutes: u64) {
    if retention_days == 0 || interval_minutes == 0 {
        return;
    }

    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let interval = Duration::from_secs(interval_minutes * 60);

    thread::spawn(move || loop {
        if let Some(cutoff) = SystemTime::now().checked_sub(retention) {
            prune_logs_older_than(&log_root, cutoff);
        }
        thread::sleep(interval);
    });
}

fn prune_logs_older_than(root: &Path, cutoff: SystemTime) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            prune_logs_older_than(&path, cutoff);
            continue;
        }
        let modified = fs::metadata(&path).and_then(|metadata| metadata.modified());
        if matches!(modified, Ok(modified) if modified < cutoff) {
            let _ = fs::remove_file(&path);
        }
    }
}

pub async fn bind_listener(port: u16) -> io::Result<TcpListener> {
    // Bind on all interfaces for container compatibility.
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    Ok(listener)
}

pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sigterm handler unavailable");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_values() {
        assert_eq!(parse_trimmed::<u16>(" 8000 "), Some(8000));
        assert_eq!(parse_trimmed::<f64>("150.5"), Some(150.5));
        assert_eq!(parse_trimmed::<u16>("eighty"), None);
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        let value = env_or("AQUAPIN_TEST_SURELY_UNSET_KEY", 42u32);
        assert_eq!(value, 42);
        assert!(env_opt("AQUAPIN_TEST_SURELY_UNSET_KEY").is_none());
    }
}
