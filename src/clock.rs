//! Wall-clock timestamp helper shared by components that stamp `Value`s
//! with nanoseconds since epoch.

use std::time::{
    SystemTime,
    UNIX_EPOCH,
};

#[must_use]
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
