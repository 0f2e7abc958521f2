use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Initialize logging from the `[logging]` section.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is an error.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .wrap_err_with(|| format!("Invalid log level: {}", config.level))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    if config.json {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_thread_ids(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON log subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.compact().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install console log subscriber")?;
    }

    tracing::debug!(
        "fnly logging initialized (level: {}, json: {})",
        config.level,
        config.json
    );
    Ok(())
}

/// Configure tracing for specific service components
pub fn configure_component_tracing(component: &str) -> tracing::Span {
    tracing::info_span!("component", name = component)
}

/// Fresh identifier for a request span.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        route = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span for one handler module invocation
pub fn create_invocation_span(file: &std::path::Path, mode: &str) -> tracing::Span {
    tracing::debug_span!(
        "invocation",
        handler.file = %file.display(),
        mode = mode,
        duration_ms = tracing::field::Empty,
    )
}
