//! Tracing initialisation for the DevAssist binary.
//!
//! Log lines go to stderr so the briefing on stdout stays clean. The HTTP
//! stack underneath the connectors and remote backends is held at `warn`
//! unless `RUST_LOG` says otherwise; at `debug` it would drown out the
//! pipeline's own events.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose logs stay at `warn` under the default filter.
const QUIET_CRATES: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

/// Filter directives used when `RUST_LOG` is not set.
fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    for krate in QUIET_CRATES {
        directives.push_str(&format!(",{krate}=warn"));
    }
    directives
}

/// Initialise the global tracing subscriber.
///
/// * `json` — emit newline-delimited JSON log lines.
/// * `level` — default verbosity for DevAssist's own events when
///   `RUST_LOG` is not set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer.with_target(false)).try_init()
    };
    // A subscriber installed earlier (tests, embedding programs) wins.
    installed.ok();
}
