use crate::util::parse_bool_str;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_PATH: &str = "/tmp/mygpt-client.log";
const DEFAULT_LOG_FILTER: &str = "mygpt=info";
const DEBUG_PAYLOAD_ENV: &str = "MYGPT_DEBUG_PAYLOAD";
pub(crate) const LOG_PATH_ENV: &str = "MYGPT_LOG_PATH";

/// Installs the global subscriber. When the terminal UI owns stderr the log
/// goes to a file instead.
pub fn init_tracing(log_path: Option<PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // try_init fails only when a subscriber is already installed.
    match log_path.or_else(resolve_log_path) {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
    Ok(())
}

pub(crate) fn resolve_log_path() -> Option<PathBuf> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(PathBuf::from(DEFAULT_LOG_PATH))
            } else {
                None
            }
        })
}

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(target: "mygpt::api", url = request_url, "request payload:\n{formatted}");
}

pub fn emit_frame_dropped(payload: &str, reason: &str) {
    tracing::debug!(target: "mygpt::stream", reason, payload, "dropping malformed stream frame");
}
