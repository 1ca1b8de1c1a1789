//! Bootstrap entrypoint: reads configuration, installs the error handler
//! and telemetry stack, then idles until a termination signal arrives.
//!
//! This core has no in-scope gRPC server or collaborator wiring — the binary
//! exists so a real deployment has something to run while it wires those
//! collaborators in, not to serve RPCs itself.

use std::process::ExitCode;

use clap::Parser;
use telemetry_client_core::{
    cli::Cli,
    config,
    metrics,
    telemetry,
    BUILD_INFO,
};
use tokio::signal::unix::{
    signal,
    SignalKind,
};
use tracing::{
    error,
    info,
};

// Following the BSD convention for failing to read config.
// See here: https://freedesktop.org/software/systemd/man/systemd.exec.html#Process%20Exit%20Codes
const EX_CONFIG: u8 = 78;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry_client_core::install_error_handler().expect("error hook must be the first hook installed");

    eprintln!(
        "{}",
        serde_json::to_string(&BUILD_INFO).expect("build info is serializable because it contains only unicode fields")
    );

    let cli = Cli::parse();
    let cfg = match config::get_with_overrides(&cli) {
        Err(e) => {
            eprintln!("failed to start: failed reading config:\n{e}");
            return ExitCode::from(EX_CONFIG);
        }
        Ok(cfg) => cfg,
    };

    let mut telemetry_conf = telemetry::configure()
        .set_force_stdout(cfg.force_stdout)
        .set_pretty_print(cfg.pretty_print)
        .filter_directives(&cfg.log);

    if !cfg.no_metrics {
        match cfg.metrics_http_listener_addr.parse() {
            Ok(addr) => telemetry_conf = telemetry_conf.metrics_addr(addr),
            Err(e) => {
                eprintln!("failed to start: invalid metrics_http_listener_addr: {e}");
                return ExitCode::from(EX_CONFIG);
            }
        }
    }

    if let Err(e) = telemetry_conf.try_init() {
        eprintln!("initializing failed:\n{e:?}");
        return ExitCode::FAILURE;
    }

    if !cfg.no_metrics {
        metrics::register_metrics();
    }

    info!(
        config = serde_json::to_string(&cfg).expect("serializing to a string cannot fail"),
        "ready"
    );

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(error) => {
            error!(%error, "failed installing SIGTERM listener");
            return ExitCode::FAILURE;
        }
    };
    sigterm.recv().await;
    info!("received SIGTERM; shutting down");
    ExitCode::SUCCESS
}
