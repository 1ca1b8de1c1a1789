//! DPU address resolution: chasing `MID_PLANE_BRIDGE`/`DPUS`/
//! `DHCP_SERVER_IPV4_PORT` to a ZMQ endpoint.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    backends::KvStore,
    path::TablePath,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DpuAddressError {
    #[error("dpu id must not be empty")]
    EmptyId,
    #[error("port must not be empty")]
    EmptyPort,
    #[error("{field} missing at {table}|{key}")]
    MissingField {
        table: String,
        key: String,
        field: String,
    },
    #[error("{0}.ips has no entries")]
    NoIps(String),
}

async fn hget_required(
    kv: &dyn KvStore,
    table: &str,
    key: &str,
    field: &str,
) -> Result<String, DpuAddressError> {
    kv.hget(&TablePath::new("CONFIG_DB", table, key).with_field(field))
        .await
        .ok()
        .flatten()
        .ok_or_else(|| DpuAddressError::MissingField {
            table: table.to_string(),
            key: key.to_string(),
            field: field.to_string(),
        })
}

/// Resolves a DPU id to its first configured address by chasing
/// `MID_PLANE_BRIDGE|GLOBAL.bridge` → `DPUS|<id>.midplane_interface` →
/// `DHCP_SERVER_IPV4_PORT|<bridge>|<iface>.ips`, returning the first
/// comma-separated entry.
pub async fn resolve_dpu_address(kv: &dyn KvStore, dpu_id: &str) -> Result<String, DpuAddressError> {
    if dpu_id.is_empty() {
        return Err(DpuAddressError::EmptyId);
    }
    let bridge = hget_required(kv, "MID_PLANE_BRIDGE", "GLOBAL", "bridge").await?;
    let interface = hget_required(kv, "DPUS", dpu_id, "midplane_interface").await?;
    let ips = hget_required(
        kv,
        "DHCP_SERVER_IPV4_PORT",
        &format!("{bridge}|{interface}"),
        "ips",
    )
    .await?;
    ips.split(',')
        .next()
        .map(str::to_string)
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| DpuAddressError::NoIps(format!("DHCP_SERVER_IPV4_PORT|{bridge}|{interface}")))
}

/// `tcp://<address>:<port>` for `dpu_id`, or an error if `dpu_id`/`port`
/// is empty or the address chase fails.
pub async fn get_zmq_address(
    kv: &dyn KvStore,
    dpu_id: &str,
    port: &str,
) -> Result<String, DpuAddressError> {
    if port.is_empty() {
        return Err(DpuAddressError::EmptyPort);
    }
    let address = resolve_dpu_address(kv, dpu_id).await?;
    Ok(format!("tcp://{address}:{port}"))
}

/// Builds a fresh ZMQ producer/consumer handle keyed by `dpu_id`; shared
/// by call sites that recycle a producer on connection break.
#[derive(Clone, Default)]
pub struct ZmqEndpointRegistry {
    inner: Arc<tokio::sync::RwLock<std::collections::HashMap<String, String>>>,
}

impl ZmqEndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn endpoint_for(
        &self,
        kv: &dyn KvStore,
        dpu_id: &str,
        port: &str,
    ) -> Result<String, DpuAddressError> {
        if let Some(cached) = self.inner.read().await.get(dpu_id) {
            return Ok(cached.clone());
        }
        let endpoint = get_zmq_address(kv, dpu_id, port).await?;
        self.inner
            .write()
            .await
            .insert(dpu_id.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    pub async fn evict(&self, dpu_id: &str) {
        self.inner.write().await.remove(dpu_id);
    }
}
