//! Build metadata printed at startup, built straight from compile-time
//! `env!` expansion of the standard Cargo package variables rather than a
//! generated build-info crate.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub pkg_version: &'static str,
    pub pkg_name: &'static str,
    pub target_arch: &'static str,
    pub build_profile: &'static str,
}

pub static BUILD_INFO: BuildInfo = BuildInfo {
    pkg_version: env!("CARGO_PKG_VERSION"),
    pkg_name: env!("CARGO_PKG_NAME"),
    target_arch: std::env::consts::ARCH,
    build_profile: if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    },
};
