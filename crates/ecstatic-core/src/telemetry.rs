//! Tracing setup shared by the ECSTATIC binaries.
//!
//! Logs always go to stderr: stdout carries reports, and the `dd-predicate`
//! wrapper is judged by its exit status alone.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crate targets that follow the requested verbosity; everything else stays at `warn`.
const ECSTATIC_TARGETS: [&str; 3] = ["ecstatic", "ecstatic_core", "ecstatic_runner"];

/// Default filter when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let mut directives = vec![Level::WARN.as_str().to_lowercase()];
    directives.extend(
        ECSTATIC_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_lowercase())),
    );
    directives.join(",")
}

/// Install the global subscriber.
///
/// JSON output carries the enclosing `ecstatic.campaign` span so every line of
/// a campaign can be grouped by its index. A second call is a no-op.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr);
        (Some(layer), None)
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
