//! Telemetry logic.
//! Support logging and metrics.

use metrics::Unit;
use tracing_subscriber::EnvFilter;

use crate::error::AuthError;

const DEFAULT_DIRECTIVE: &str = "info";

/// Install a formatted logger filtered by `RUST_LOG`, `info` by default.
///
/// Does nothing if a global subscriber already exists.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Describe every metric emitted by the crate to the installed recorder.
///
/// Called by [`crate::initialize`]. Hosts building a
/// [`crate::JwtAuth`] by hand call it once their recorder is installed.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "jwt_tokens_issued_total",
        Unit::Count,
        "Tokens signed, refreshed ones included."
    );
    metrics::describe_counter!(
        "jwt_tokens_refreshed_total",
        Unit::Count,
        "Tokens exchanged for a new one."
    );
    metrics::describe_counter!(
        "jwt_tokens_revoked_total",
        Unit::Count,
        "Tokens added to the blacklist, by refresh or invalidation."
    );
    metrics::describe_counter!(
        "jwt_authentication_failures_total",
        Unit::Count,
        "Refused tokens and credentials, labelled by reason."
    );
}

/// Count and log a refused authentication.
pub fn record_failure(err: &AuthError) {
    let reason = err.kind();
    metrics::counter!("jwt_authentication_failures_total", "reason" => reason)
        .increment(1);

    if err.status().is_server_error() {
        tracing::error!(error = %err, reason, "authentication could not be performed");
    } else {
        tracing::debug!(reason, "authentication refused");
    }
}
