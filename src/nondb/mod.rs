//! Host metrics without a backing database. A background task
//! samples `/proc/stat` into a [`SampleRing`] every 100 ms; a [`Trie`]
//! resolves `OTHERS/platform/...` paths to the getter that answers them.

pub mod proc;
pub mod ring;

use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use serde_json::{
    json,
    Value,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::trie::Trie;
use ring::SampleRing;

pub const SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Offsets (in ring slots) for the utilization windows this module reports:
/// 100ms / 1s / 5s / 1min / 5min.
pub const UTILIZATION_OFFSETS: [(&str, usize); 5] = [
    ("100ms", 2),
    ("1s", 10),
    ("5s", 50),
    ("1min", 600),
    ("5min", 30_000),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Getter {
    Cpu,
    Meminfo,
    Diskstats,
    Loadavg,
    Vmstat,
    Stat,
    Uptime,
    Version,
}

/// Process-wide, initialized once at startup:
/// samples `/proc/stat` into `ring` on a fixed period and answers getter
/// lookups through `trie`.
pub struct NonDbSampler {
    proc_root: PathBuf,
    ring: Arc<RwLock<SampleRing>>,
    trie: Trie<Getter>,
    version_cache: tokio::sync::OnceCell<String>,
    version_file: PathBuf,
}

impl NonDbSampler {
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>, version_file: impl Into<PathBuf>) -> Self {
        let mut trie = Trie::new();
        trie.insert(&["OTHERS", "platform", "cpu"], Getter::Cpu);
        trie.insert(&["OTHERS", "platform", "meminfo"], Getter::Meminfo);
        trie.insert(&["OTHERS", "platform", "diskstats"], Getter::Diskstats);
        trie.insert(&["OTHERS", "platform", "loadavg"], Getter::Loadavg);
        trie.insert(&["OTHERS", "platform", "vmstat"], Getter::Vmstat);
        trie.insert(&["OTHERS", "platform", "stat"], Getter::Stat);
        trie.insert(&["OTHERS", "platform", "uptime"], Getter::Uptime);
        trie.insert(&["OTHERS", "platform", "version"], Getter::Version);
        Self {
            proc_root: proc_root.into(),
            ring: Arc::new(RwLock::new(SampleRing::new())),
            trie,
            version_cache: tokio::sync::OnceCell::new(),
            version_file: version_file.into(),
        }
    }

    #[must_use]
    pub fn has_getter(&self, keys: &[&str]) -> bool {
        self.trie.find(keys).is_some()
    }

    /// Runs the 100ms sampling loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(SAMPLE_PERIOD);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => self.sample_once().await,
            }
        }
    }

    async fn sample_once(&self) {
        let stat_path = self.proc_root.join("stat");
        let Ok(content) = tokio::fs::read_to_string(&stat_path).await else {
            return;
        };
        let Some(jiffies) = proc::parse_cpu_total_line(&content) else {
            return;
        };
        self.ring.write().await.push(jiffies);
    }

    /// Resolves `keys` and returns its current JSON value.
    pub async fn get(&self, keys: &[&str]) -> Result<Value, GetterError> {
        let getter = *self
            .trie
            .find(keys)
            .ok_or_else(|| GetterError::NoGetter(keys.iter().map(|s| (*s).to_string()).collect()))?;
        self.run_getter(getter).await
    }

    async fn run_getter(&self, getter: Getter) -> Result<Value, GetterError> {
        match getter {
            Getter::Cpu => Ok(self.cpu_utilization().await),
            Getter::Meminfo => self.read_proc("meminfo", proc::parse_meminfo).await,
            Getter::Diskstats => self.read_proc("diskstats", proc::parse_diskstats).await,
            Getter::Loadavg => self.read_proc("loadavg", proc::parse_loadavg).await,
            Getter::Vmstat => self.read_proc("vmstat", proc::parse_vmstat).await,
            Getter::Stat => self.read_proc("stat", proc::parse_stat).await,
            Getter::Uptime => self.read_proc("uptime", proc::parse_uptime).await,
            Getter::Version => self.version().await.map(|v| json!(v)),
        }
    }

    async fn read_proc(
        &self,
        file: &str,
        parse: impl Fn(&str) -> Value,
    ) -> Result<Value, GetterError> {
        let path = self.proc_root.join(file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| GetterError::Io(file.to_string(), e.to_string()))?;
        Ok(parse(&content))
    }

    async fn cpu_utilization(&self) -> Value {
        let ring = self.ring.read().await;
        let mut map = serde_json::Map::new();
        for (label, offset) in UTILIZATION_OFFSETS {
            let value = ring.utilization_over(offset);
            map.insert(label.to_string(), value.map_or(Value::Null, |v| json!(v)));
        }
        Value::Object(map)
    }

    /// Reads the version file once per process lifetime; subsequent calls
    /// hit the cache.
    async fn version(&self) -> Result<String, GetterError> {
        self.version_cache
            .get_or_try_init(|| async {
                tokio::fs::read_to_string(&self.version_file)
                    .await
                    .map(|s| s.trim().to_string())
                    .map_err(|e| GetterError::Io("version".to_string(), e.to_string()))
            })
            .await
            .cloned()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GetterError {
    #[error("no getter registered for path {0:?}")]
    NoGetter(Vec<String>),
    #[error("failed to read /proc/{0}: {1}")]
    Io(String, String),
    /// ON_CHANGE is rejected outright for every non-DB path.
    #[error("non-DB metrics support SAMPLE mode only, not ON_CHANGE")]
    OnChangeUnsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sampler_with_fixtures() -> (NonDbSampler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("meminfo"), "MemTotal: 1000 kB\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("loadavg"), "0.1 0.2 0.3 1/2 99\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("stat"), "cpu  10 0 5 80 5 0 0 0 0 0\n")
            .await
            .unwrap();
        let version_file = dir.path().join("version");
        tokio::fs::write(&version_file, "1.2.3\n").await.unwrap();
        (NonDbSampler::new(dir.path(), version_file), dir)
    }

    #[tokio::test]
    async fn unknown_path_has_no_getter() {
        let (sampler, _dir) = sampler_with_fixtures().await;
        assert!(matches!(
            sampler.get(&["OTHERS", "platform", "nonsense"]).await,
            Err(GetterError::NoGetter(_))
        ));
    }

    #[tokio::test]
    async fn meminfo_getter_reads_proc_file() {
        let (sampler, _dir) = sampler_with_fixtures().await;
        let value = sampler.get(&["OTHERS", "platform", "meminfo"]).await.unwrap();
        assert_eq!(value["MemTotal"], json!(1000));
    }

    #[tokio::test]
    async fn version_is_cached_after_first_read() {
        let (sampler, dir) = sampler_with_fixtures().await;
        let first = sampler.get(&["OTHERS", "platform", "version"]).await.unwrap();
        assert_eq!(first, json!("1.2.3"));
        tokio::fs::write(dir.path().join("version"), "9.9.9\n")
            .await
            .unwrap();
        let second = sampler.get(&["OTHERS", "platform", "version"]).await.unwrap();
        assert_eq!(second, json!("1.2.3"), "cached value must not change");
    }

    #[tokio::test]
    async fn sample_once_populates_ring() {
        let (sampler, _dir) = sampler_with_fixtures().await;
        sampler.sample_once().await;
        sampler.sample_once().await;
        let utilization = sampler.cpu_utilization().await;
        assert!(utilization["100ms"].is_number() || utilization["100ms"].is_null());
    }

    #[test]
    fn has_getter_matches_registered_paths() {
        let sampler = NonDbSampler::new("/proc", "/etc/sonic/sonic_version.yml");
        assert!(sampler.has_getter(&["OTHERS", "platform", "cpu"]));
        assert!(!sampler.has_getter(&["OTHERS", "platform", "unknown"]));
    }
}
