//! Logging and tracing setup.
//!
//! All logs are written to **stderr**; stdout belongs to the plugin host.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full `EnvFilter` directives (e.g. `mongodbatlas_provider=debug`)
//! - `TF_LOG`: used when `RUST_LOG` is unset. Accepts Terraform's levels
//!   (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`, `OFF`); `JSON` maps to `trace`.
//!
//! ```bash
//! TF_LOG=DEBUG terraform apply
//! RUST_LOG=mongodbatlas_provider::poll=trace terraform apply
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pick the filter directive from `RUST_LOG`, then `TF_LOG`, then `default_level`.
///
/// Unrecognized `TF_LOG` values are ignored.
pub fn filter_directive(rust_log: Option<&str>, tf_log: Option<&str>, default_level: &str) -> String {
    if let Some(directive) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        return directive.to_string();
    }

    let tf_level = tf_log
        .map(|level| level.trim().to_ascii_lowercase())
        .and_then(|level| match level.as_str() {
            "json" => Some("trace".to_string()),
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(level),
            _ => None,
        });

    tf_level.unwrap_or_else(|| default_level.to_string())
}

fn env_filter(default_level: &str) -> EnvFilter {
    let rust_log = std::env::var("RUST_LOG").ok();
    let tf_log = std::env::var("TF_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), tf_log.as_deref(), default_level);

    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn try_init_with(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}

/// Initialize the default logging subscriber at `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with a custom level for when neither `RUST_LOG`
/// nor `TF_LOG` is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    assert!(
        try_init_with(default_level),
        "a global tracing subscriber is already set"
    );
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    try_init_with("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins() {
        assert_eq!(
            filter_directive(Some("mongodbatlas_provider=debug"), Some("TRACE"), "info"),
            "mongodbatlas_provider=debug"
        );
    }

    #[test]
    fn test_tf_log_levels() {
        assert_eq!(filter_directive(None, Some("DEBUG"), "info"), "debug");
        assert_eq!(filter_directive(None, Some(" warn "), "info"), "warn");
        assert_eq!(filter_directive(None, Some("JSON"), "info"), "trace");
        assert_eq!(filter_directive(None, Some("OFF"), "info"), "off");
    }

    #[test]
    fn test_fallback_to_default() {
        assert_eq!(filter_directive(None, None, "info"), "info");
        assert_eq!(filter_directive(Some(""), Some("verbose"), "warn"), "warn");
    }

    #[test]
    fn test_directives_parse() {
        for directive in ["info", "trace", "off", "warn,mongodbatlas_provider::poll=debug"] {
            assert!(EnvFilter::try_new(directive).is_ok(), "{}", directive);
        }
    }
}
