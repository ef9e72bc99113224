//! Tracing subscriber setup for the Docent binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Result;

/// Configure the global tracing subscriber: `RUST_LOG`-driven filtering
/// with a stdout formatting layer (JSON when `DOCENT_JSON_LOGS=1`).
pub fn configure_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,docent=debug".into()),
    );

    let json_logs = std::env::var("DOCENT_JSON_LOGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| crate::Error::internal(format!("tracing init: {e}")))?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| crate::Error::internal(format!("tracing init: {e}")))?;
    }

    Ok(())
}
