//! Per-path memoized last-reported structured value, the baseline [`super::diff`] compares against for
//! `SuppressRedundant` re-sampling.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    backends::StructuredValue,
    value::Path,
};

#[derive(Default)]
pub struct SampleCache {
    inner: RwLock<HashMap<String, StructuredValue>>,
}

impl SampleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &Path) -> Option<StructuredValue> {
        self.inner.read().await.get(&key(path)).cloned()
    }

    pub async fn set(&self, path: &Path, value: StructuredValue) {
        self.inner.write().await.insert(key(path), value);
    }

    pub async fn remove(&self, path: &Path) {
        self.inner.write().await.remove(&key(path));
    }
}

fn key(path: &Path) -> String {
    path.display_elems()
}
