//! # Telemetry client core
//!
//! The streaming telemetry data-client core of a network-switch management
//! agent: a `Client` trait with five concrete variants (a single-database
//! client, a mixed multi-database/config-writing client, a
//! translation-library-backed subscriber, an event-bus bridge, and a
//! non-database metrics sampler), a bounded output queue, a virtual-path
//! trie and translators, and a JSON-patch checkpoint client. The schema
//! translation library, the key/value driver, and the message-queue
//! transport this core depends on are modeled as traits and mocked for
//! tests; production implementations of those collaborators, and the gNMI
//! server that dispatches into this core's `Client`s, are out of scope.

pub mod backends;
pub mod build_info;
pub mod bypass;
pub mod cli;
pub mod client;
pub(crate) mod clock;
pub mod config;
pub mod db;
pub(crate) mod dispatcher;
pub mod dpu;
pub mod error;
pub mod event_bridge;
pub mod json_patch;
pub mod metrics;
pub mod nondb;
pub mod path;
pub mod queue;
pub mod sync_util;
pub mod telemetry;
pub mod transl;
pub(crate) mod trie;
pub mod value;
pub mod virtual_path;

use std::fmt::Write;

pub use build_info::BUILD_INFO;

/// Installs an eyre error handler to print display-formatted errors.
///
/// # Errors
/// Returns an error if the error handler could not be installed.
/// See [`eyre::set_hook`] for more information.
pub fn install_error_handler() -> Result<(), eyre::InstallError> {
    eyre::set_hook(Box::new(|_| Box::new(ErrorHandler)))?;
    Ok(())
}

struct ErrorHandler;

impl eyre::EyreHandler for ErrorHandler {
    fn debug(
        &self,
        mut error: &(dyn std::error::Error + 'static),
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        f.write_char('{')?;
        f.write_fmt(format_args!("\"0\": \"{error}\""))?;
        let mut level: u32 = 1;
        while let Some(source) = error.source() {
            f.write_fmt(format_args!(", \"{level}\": \"{source}\""))?;
            level += 1;
            error = source;
        }
        f.write_char('}')?;
        Ok(())
    }

    fn display(
        &self,
        mut error: &(dyn std::error::Error + 'static),
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        f.write_char('{')?;
        f.write_fmt(format_args!("\"0\": \"{error}\""))?;
        let mut level: u32 = 1;
        while let Some(source) = error.source() {
            f.write_fmt(format_args!(", \"{level}\": \"{source}\""))?;
            level += 1;
            error = source;
        }
        f.write_char('}')?;
        Ok(())
    }
}
