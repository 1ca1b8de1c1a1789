//! Process configuration: everything a deployment of this core needs to
//! size its output queue, pick its minimum sample cadence, and locate its
//! checkpoint file and bypass allow-lists, read from `TELEMETRY_CLIENT_`-
//! prefixed environment variables.

use figment::{
    providers::{
        Env,
        Serialized,
    },
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::cli::Cli;

pub fn get() -> Result<Config, figment::Error> {
    Config::from_environment("TELEMETRY_CLIENT_")
}

/// Same as [`get`], but lets command-line flags in `cli` override whatever
/// the environment set.
pub fn get_with_overrides(cli: &Cli) -> Result<Config, figment::Error> {
    Config::from_environment_with_overrides("TELEMETRY_CLIENT_", cli)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum cumulative protobuf-serialized bytes any one subscription's
    /// output queue may hold before `Enqueue` starts failing.
    pub queue_max_bytes: usize,

    /// Floor under every subscription's sample/heartbeat interval when a
    /// path reports no narrower minimum of its own.
    pub min_sample_interval_ms: u64,

    /// Path to the JSON document `JsonPatchClient` checkpoints to on every
    /// write.
    pub checkpoint_path: String,

    /// Comma-separated table names whose writes go through a ZMQ producer
    /// instead of a plain key/value write.
    pub zmq_tables: String,

    /// Comma-separated SKU prefixes allowed to bypass translation-library
    /// validation on `Set`.
    pub bypass_allowed_skus: String,

    /// Comma-separated table names allowed to bypass translation-library
    /// validation on `Set`.
    pub bypass_allowed_tables: String,

    /// Tracing filter directive string, e.g. `info` or
    /// `telemetry_client_core=debug`.
    pub log: String,

    /// Forces human-readable log output even when stdout is not a tty.
    pub force_stdout: bool,

    /// Forces pretty-printed (non-json) log output.
    pub pretty_print: bool,

    /// Disables the Prometheus metrics exporter entirely.
    pub no_metrics: bool,

    /// Address the Prometheus exporter listens on, e.g. `127.0.0.1:9000`.
    pub metrics_http_listener_addr: String,
}

impl Config {
    fn from_environment(envar_prefix: &str) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Env::prefixed("RUST_").split("_").only(&["log"]))
            .merge(Env::prefixed(envar_prefix))
            .extract()
    }

    fn from_environment_with_overrides(envar_prefix: &str, cli: &Cli) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Env::prefixed("RUST_").split("_").only(&["log"]))
            .merge(Env::prefixed(envar_prefix))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use once_cell::sync::Lazy;
    use regex::Regex;

    use super::Config;

    const EXAMPLE_ENV: &str = include_str!("../local.env.example");

    fn populate_environment_from_example(jail: &mut Jail, test_envar_prefix: &str) {
        static RE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[[:space:]]+").unwrap());
        static RE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[[:space:]]+$").unwrap());
        for line in EXAMPLE_ENV.lines() {
            if let Some((key, val)) = line.trim().split_once('=') {
                if RE_END.is_match(key) || RE_START.is_match(val) {
                    panic!("env vars must not contain spaces in assignment\n{line}");
                }
                let prefixed_key = format!("{test_envar_prefix}_{key}");
                jail.set_env(prefixed_key, val);
            }
        }
    }

    #[test]
    fn ensure_example_env_is_in_sync() {
        let test_envar_prefix = "TESTTEST";
        let full_envar_prefix = format!("{test_envar_prefix}_TELEMETRY_CLIENT_");
        Jail::expect_with(|jail| {
            populate_environment_from_example(jail, test_envar_prefix);
            Config::from_environment(full_envar_prefix.as_str()).unwrap();
            Ok(())
        });
    }

    #[test]
    #[should_panic]
    fn extra_env_vars_are_rejected() {
        let test_envar_prefix = "TESTTEST";
        let full_envar_prefix = format!("{test_envar_prefix}_TELEMETRY_CLIENT_");
        Jail::expect_with(|jail| {
            populate_environment_from_example(jail, test_envar_prefix);
            jail.set_env("TESTTEST_TELEMETRY_CLIENT_FOOBAR", "BAZ");
            Config::from_environment(full_envar_prefix.as_str()).unwrap();
            Ok(())
        });
    }
}
