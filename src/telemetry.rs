//! Logging and metrics bootstrap: a small builder over `tracing-subscriber`
//! and `metrics-exporter-prometheus`, without an OpenTelemetry span
//! exporter since this core has no collaborator to feed one.

use std::net::SocketAddr;

use is_terminal::IsTerminal as _;
use tracing_subscriber::{
    filter::{
        EnvFilter,
        LevelFilter,
    },
    fmt,
    layer::SubscriberExt as _,
    registry,
    util::SubscriberInitExt as _,
};

/// Builder returned by [`configure`]. Each setter takes `self` by value so
/// call sites can chain.
pub struct Config {
    force_stdout: bool,
    pretty_print: bool,
    filter_directives: String,
    metrics_addr: Option<SocketAddr>,
}

#[must_use]
pub fn configure() -> Config {
    Config {
        force_stdout: false,
        pretty_print: false,
        filter_directives: "info".to_string(),
        metrics_addr: None,
    }
}

impl Config {
    #[must_use]
    pub fn set_force_stdout(mut self, force_stdout: bool) -> Self {
        self.force_stdout = force_stdout;
        self
    }

    #[must_use]
    pub fn set_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    #[must_use]
    pub fn filter_directives(mut self, directives: &str) -> Self {
        self.filter_directives = directives.to_string();
        self
    }

    /// Enables the Prometheus exporter on `addr`. Skipping this call means
    /// `try_init` only sets up logging.
    #[must_use]
    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    /// Installs the global tracing subscriber and, if configured, starts
    /// the Prometheus exporter.
    ///
    /// # Errors
    /// Returns an error if the filter directives fail to parse, the
    /// subscriber is already installed, or the Prometheus exporter fails to
    /// bind its listener.
    pub fn try_init(self) -> eyre::Result<()> {
        let env_filter = init_env_filter(&self.filter_directives)?;
        let attached_to_tty = std::io::stdout().is_terminal();
        let use_pretty = self.force_stdout || (attached_to_tty && !self.pretty_print);
        let (json_log, stdout_log) = if use_pretty {
            (None, Some(fmt::layer()))
        } else {
            (Some(fmt::layer().json().flatten_event(true)), None)
        };

        registry()
            .with(stdout_log)
            .with(json_log)
            .with(env_filter)
            .try_init()
            .map_err(|e| eyre::eyre!("failed initializing telemetry stack: {e}"))?;

        if let Some(addr) = self.metrics_addr {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| eyre::eyre!("failed installing prometheus exporter: {e}"))?;
        }

        Ok(())
    }
}

fn init_env_filter(directives: &str) -> eyre::Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives)
        .map_err(|e| eyre::eyre!("failed parsing configured filter directives: {e}"))
}
