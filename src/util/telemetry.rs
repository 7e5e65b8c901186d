use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Builder for the process-wide tracing subscriber.
///
/// Log verbosity is controlled by `RUST_LOG`; the default filter keeps the
/// gateway's own spans at `info`. `register` is idempotent-unsafe by design
/// (call once at startup).
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: "service",
            version: "0.0.0",
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Installs the global subscriber and returns the registered identity.
    pub fn register(self) -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("info,{}=info", env!("CARGO_CRATE_NAME"))));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
        tracing::info!(service = self.name, version = self.version, "Telemetry registered");
        self
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
