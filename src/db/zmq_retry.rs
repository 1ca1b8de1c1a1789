//! Retries a ZMQ-backed write exactly once after a "connection break"
//! error; any other error, or a second failure, is returned as-is.

use std::future::Future;

use crate::error::ZmqError;

pub async fn retry_once<F, Fut, T>(mut thunk: F) -> Result<T, ZmqError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ZmqError>>,
{
    match thunk().await {
        Ok(value) => Ok(value),
        Err(e) if e.is_connection_break() => thunk().await,
        Err(e) => Err(e),
    }
}
