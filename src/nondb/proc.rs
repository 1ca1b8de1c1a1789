//! Parsers for the `/proc` pseudo-files the sampler exposes. Pure string-in, `Value`-out functions so they're
//! testable without a real `/proc`.

use serde_json::{
    json,
    Map,
    Value,
};

use super::ring::CpuJiffies;

/// The aggregate `cpu ` line of `/proc/stat`, used to feed the sampling
/// ring. Idle time is `idle + iowait`; total is the sum of every field
/// present on the line.
#[must_use]
pub fn parse_cpu_total_line(stat_content: &str) -> Option<CpuJiffies> {
    let line = stat_content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.is_empty() {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // fields[3] = idle, fields[4] = iowait (0-indexed after "user").
    let idle = fields.get(3).copied().unwrap_or(0) + fields.get(4).copied().unwrap_or(0);
    Some(CpuJiffies {
        total,
        idle,
    })
}

/// Every `cpu`-prefixed line (aggregate and per-core) as a JSON object
/// keyed by label.
#[must_use]
pub fn parse_stat(content: &str) -> Value {
    let mut map = Map::new();
    for line in content.lines() {
        let Some((label, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        if !label.starts_with("cpu") {
            continue;
        }
        let fields: Vec<Value> = rest
            .split_whitespace()
            .map(|f| f.parse::<u64>().map_or(Value::Null, Value::from))
            .collect();
        map.insert(label.to_string(), Value::Array(fields));
    }
    Value::Object(map)
}

/// `/proc/meminfo`: one `Key: value[ kB]` pair per line.
#[must_use]
pub fn parse_meminfo(content: &str) -> Value {
    let mut map = Map::new();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let rest = rest.trim();
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<i64>().ok());
        map.insert(
            key.trim().to_string(),
            value.map_or_else(|| json!(rest), Value::from),
        );
    }
    Value::Object(map)
}

/// `/proc/vmstat`: one `key value` pair per line.
#[must_use]
pub fn parse_vmstat(content: &str) -> Value {
    let mut map = Map::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        map.insert(
            key.to_string(),
            value.parse::<i64>().map_or(Value::Null, Value::from),
        );
    }
    Value::Object(map)
}

/// `/proc/loadavg`: `load1 load5 load15 running/total last_pid`.
#[must_use]
pub fn parse_loadavg(content: &str) -> Value {
    let fields: Vec<&str> = content.split_whitespace().collect();
    let running_total = fields.get(3).and_then(|s| s.split_once('/'));
    json!({
        "load1": fields.first().and_then(|s| s.parse::<f64>().ok()),
        "load5": fields.get(1).and_then(|s| s.parse::<f64>().ok()),
        "load15": fields.get(2).and_then(|s| s.parse::<f64>().ok()),
        "running": running_total.and_then(|(r, _)| r.parse::<u64>().ok()),
        "total_processes": running_total.and_then(|(_, t)| t.parse::<u64>().ok()),
        "last_pid": fields.get(4).and_then(|s| s.parse::<u64>().ok()),
    })
}

/// `/proc/uptime`: `uptime_seconds idle_seconds`.
#[must_use]
pub fn parse_uptime(content: &str) -> Value {
    let fields: Vec<&str> = content.split_whitespace().collect();
    json!({
        "uptime_seconds": fields.first().and_then(|s| s.parse::<f64>().ok()),
        "idle_seconds": fields.get(1).and_then(|s| s.parse::<f64>().ok()),
    })
}

/// `/proc/diskstats`: 14+ whitespace-separated fields per device line
/// (major, minor, device name, then per-kernel-version counters). Only
/// the stable leading counters are named; the rest are carried as a raw
/// array so newer kernels' extra fields aren't silently dropped.
#[must_use]
pub fn parse_diskstats(content: &str) -> Value {
    let devices: Vec<Value> = content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 14 {
                return None;
            }
            Some(json!({
                "device": fields[2],
                "reads_completed": fields[3].parse::<u64>().ok(),
                "sectors_read": fields[5].parse::<u64>().ok(),
                "writes_completed": fields[7].parse::<u64>().ok(),
                "sectors_written": fields[9].parse::<u64>().ok(),
                "raw": fields,
            }))
        })
        .collect();
    Value::Array(devices)
}
