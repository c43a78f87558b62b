use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::util::env_non_empty;

const LOG_FILTER_ENV: &str = "AGENTDESK_LOG";
const LOG_PATH_ENV: &str = "AGENTDESK_LOG_PATH";
const DEFAULT_FILTER: &str = "warn";

/// Installs the global tracing subscriber.
///
/// The filter comes from `AGENTDESK_LOG` (default `warn`). Output goes to the
/// file named by `AGENTDESK_LOG_PATH` when it can be opened, else to stderr.
/// Calling it twice is a no-op.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut open_warning = None;
    let log_file = resolve_log_path().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some((path, file)),
            Err(error) => {
                open_warning = Some(format!("cannot open log file {}: {error}", path.display()));
                None
            }
        }
    });

    let installed = match log_file {
        Some((path, file)) => {
            let result = tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .try_init();
            if result.is_ok() {
                tracing::debug!(path = %path.display(), "logging initialized");
            }
            result
        }
        None => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .try_init(),
    };

    if installed.is_ok() {
        if let Some(warning) = open_warning {
            tracing::warn!("{warning}");
        }
    }
}

fn resolve_log_path() -> Option<PathBuf> {
    env_non_empty(LOG_PATH_ENV).map(PathBuf::from)
}
