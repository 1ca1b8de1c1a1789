//! Command-line overrides for [`crate::config::Config`], merged over the
//! environment by [`crate::config::get_with_overrides`].

use clap::Parser;
use serde::Serialize;

#[derive(Debug, Parser, Serialize)]
pub struct Cli {
    /// Maximum cumulative protobuf-serialized bytes any subscription's
    /// output queue may hold.
    #[arg(long = "queue-max-bytes")]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub queue_max_bytes: Option<usize>,

    /// Path to the JSON document the checkpoint client writes to.
    #[arg(long = "checkpoint-path")]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub checkpoint_path: Option<String>,

    /// Tracing filter directive string.
    #[arg(long = "log")]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub log: Option<String>,

    #[arg(long = "force-stdout")]
    pub force_stdout: bool,

    #[arg(long = "pretty-print")]
    pub pretty_print: bool,

    #[arg(long = "no-metrics")]
    pub no_metrics: bool,

    /// Address the Prometheus exporter listens on.
    #[arg(long = "metrics-http-listener-addr")]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub metrics_http_listener_addr: Option<String>,
}
