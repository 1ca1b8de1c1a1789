//! `JsonPatchClient`: transactional add/replace/remove/get over a
//! persisted JSON checkpoint document.
//!
//! The document itself is a `serde_json::Value`; its own invariant (every
//! non-leaf is a mapping or an ordered array, leaves are strings, numbers,
//! booleans, or null) is exactly `serde_json::Value`'s invariant, so there
//! is no separate tree type to maintain.

mod pointer;

use std::path::{
    Path as FsPath,
    PathBuf,
};

use serde_json::{
    Map,
    Value as Json,
};
use tokio::sync::RwLock;

use crate::error::PatchError;

pub use pointer::unescape_token;

/// Splits a JSON-Pointer-style path string (`a/b/c`, tokens possibly
/// carrying `~0`/`~1` escapes) into decoded path tokens.
#[must_use]
pub fn split_pointer(pointer: &str) -> Vec<String> {
    pointer
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(unescape_token)
        .collect()
}

pub struct JsonPatchClient {
    checkpoint_path: PathBuf,
    document: RwLock<Json>,
}

impl JsonPatchClient {
    /// Loads the document from disk. Absence of the file or invalid JSON
    /// content is an error, not an empty-document default.
    pub async fn open(checkpoint_path: impl Into<PathBuf>) -> Result<Self, PatchError> {
        let checkpoint_path = checkpoint_path.into();
        let contents = tokio::fs::read_to_string(&checkpoint_path)
            .await
            .map_err(|e| PatchError::IoFailure(e.to_string()))?;
        let document: Json =
            serde_json::from_str(&contents).map_err(|e| PatchError::InvalidValue(e.to_string()))?;
        Ok(Self {
            checkpoint_path,
            document: RwLock::new(document),
        })
    }

    /// `Add`: the target must not already exist (map terminal) or
    /// must be appendable (`-` on an array); parent maps are created as
    /// needed, parent arrays are not. `value` must be valid JSON before any
    /// mutation is attempted.
    pub async fn add(&self, path: &[String], value: &str) -> Result<(), PatchError> {
        let value: Json =
            serde_json::from_str(value).map_err(|e| PatchError::InvalidValue(e.to_string()))?;
        if path.is_empty() {
            return Err(PatchError::AlreadyExists(Vec::new()));
        }
        let mut doc = self.document.write().await;
        add_at(&mut doc, path, value)?;
        self.persist(&doc).await
    }

    /// `Replace`: the target must already exist.
    pub async fn replace(&self, path: &[String], value: &str) -> Result<(), PatchError> {
        let value: Json =
            serde_json::from_str(value).map_err(|e| PatchError::InvalidValue(e.to_string()))?;
        if path.is_empty() {
            let mut doc = self.document.write().await;
            *doc = value;
            return self.persist(&doc).await;
        }
        let mut doc = self.document.write().await;
        replace_at(&mut doc, path, value)?;
        self.persist(&doc).await
    }

    /// `Remove`: the target must exist; a map entry is deleted or
    /// an array element is removed with subsequent elements shifted left.
    pub async fn remove(&self, path: &[String]) -> Result<(), PatchError> {
        if path.is_empty() {
            return Err(PatchError::NotFound(Vec::new()));
        }
        let mut doc = self.document.write().await;
        remove_at(&mut doc, path)?;
        self.persist(&doc).await
    }

    /// `Get`: returns the sub-tree at `path`, serialized to
    /// JSON; an empty path returns the whole document.
    pub async fn get(&self, path: &[String]) -> Result<Json, PatchError> {
        let doc = self.document.read().await;
        if path.is_empty() {
            return Ok(doc.clone());
        }
        get_at(&doc, path).cloned()
    }

    async fn persist(&self, document: &Json) -> Result<(), PatchError> {
        let serialized =
            serde_json::to_vec_pretty(document).map_err(|e| PatchError::InvalidValue(e.to_string()))?;
        write_atomically(&self.checkpoint_path, serialized)
            .await
            .map_err(|e| PatchError::IoFailure(e.to_string()))
    }
}

async fn write_atomically(target: &FsPath, contents: Vec<u8>) -> std::io::Result<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = target.parent().unwrap_or_else(|| FsPath::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &contents)?;
        tmp.persist(&target)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

fn parse_strict_index(token: &str, len: usize, context: &[String]) -> Result<usize, PatchError> {
    let idx: usize = token.parse().map_err(|_| PatchError::InvalidIndex {
        path: context.to_vec(),
        index: token.to_string(),
    })?;
    if idx >= len {
        return Err(PatchError::InvalidIndex {
            path: context.to_vec(),
            index: token.to_string(),
        });
    }
    Ok(idx)
}

/// Steps one level down for navigation *through* intermediate path
/// segments (never the terminal segment). Creates an empty map for a
/// missing key when `create_maps` is set; never auto-creates array
/// elements.
fn step_mut<'v>(
    node: &'v mut Json,
    token: &str,
    create_maps: bool,
    full_path: &[String],
) -> Result<&'v mut Json, PatchError> {
    match node {
        Json::Object(map) => {
            if !map.contains_key(token) {
                if create_maps {
                    map.insert(token.to_string(), Json::Object(Map::new()));
                } else {
                    return Err(PatchError::NotFound(full_path.to_vec()));
                }
            }
            Ok(map.get_mut(token).expect("just inserted or already present"))
        }
        Json::Array(arr) => {
            let idx = parse_strict_index(token, arr.len(), full_path)?;
            Ok(&mut arr[idx])
        }
        _ => Err(PatchError::InvalidIndex {
            path: full_path.to_vec(),
            index: token.to_string(),
        }),
    }
}

fn navigate_parent_mut<'v>(
    root: &'v mut Json,
    path: &[String],
    create_maps: bool,
) -> Result<&'v mut Json, PatchError> {
    let mut node = root;
    for token in &path[..path.len() - 1] {
        node = step_mut(node, token, create_maps, path)?;
    }
    Ok(node)
}

fn add_at(root: &mut Json, path: &[String], value: Json) -> Result<(), PatchError> {
    let parent = navigate_parent_mut(root, path, true)?;
    let last = path.last().expect("non-empty path");
    match parent {
        Json::Object(map) => {
            if map.contains_key(last) {
                return Err(PatchError::AlreadyExists(path.to_vec()));
            }
            map.insert(last.clone(), value);
            Ok(())
        }
        Json::Array(arr) => {
            if last == "-" {
                arr.push(value);
                return Ok(());
            }
            match last.parse::<usize>() {
                Ok(idx) if idx < arr.len() => Err(PatchError::AlreadyExists(path.to_vec())),
                _ => Err(PatchError::InvalidIndex {
                    path: path[..path.len() - 1].to_vec(),
                    index: last.clone(),
                }),
            }
        }
        _ => Err(PatchError::InvalidIndex {
            path: path[..path.len() - 1].to_vec(),
            index: last.clone(),
        }),
    }
}

fn replace_at(root: &mut Json, path: &[String], value: Json) -> Result<(), PatchError> {
    let parent = navigate_parent_mut(root, path, false)?;
    let last = path.last().expect("non-empty path");
    match parent {
        Json::Object(map) => {
            if !map.contains_key(last) {
                return Err(PatchError::NotFound(path.to_vec()));
            }
            map.insert(last.clone(), value);
            Ok(())
        }
        Json::Array(arr) => {
            let idx = parse_strict_index(last, arr.len(), path)?;
            arr[idx] = value;
            Ok(())
        }
        _ => Err(PatchError::NotFound(path.to_vec())),
    }
}

fn remove_at(root: &mut Json, path: &[String]) -> Result<(), PatchError> {
    let parent = navigate_parent_mut(root, path, false)?;
    let last = path.last().expect("non-empty path");
    match parent {
        Json::Object(map) => {
            map.remove(last)
                .map(|_| ())
                .ok_or_else(|| PatchError::NotFound(path.to_vec()))
        }
        Json::Array(arr) => {
            let idx = parse_strict_index(last, arr.len(), path)?;
            arr.remove(idx);
            Ok(())
        }
        _ => Err(PatchError::NotFound(path.to_vec())),
    }
}

fn get_at<'v>(root: &'v Json, path: &[String]) -> Result<&'v Json, PatchError> {
    let mut node = root;
    for token in path {
        node = match node {
            Json::Object(map) => map
                .get(token)
                .ok_or_else(|| PatchError::NotFound(path.to_vec()))?,
            Json::Array(arr) => {
                let idx = parse_strict_index(token, arr.len(), path)
                    .map_err(|_| PatchError::NotFound(path.to_vec()))?;
                &arr[idx]
            }
            _ => return Err(PatchError::NotFound(path.to_vec())),
        };
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| (*s).to_string()).collect()
    }

    async fn client_with(document: &str) -> (JsonPatchClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        tokio::fs::write(&path, document).await.unwrap();
        (JsonPatchClient::open(&path).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(
            JsonPatchClient::open(&path).await,
            Err(PatchError::IoFailure(_))
        ));
    }

    #[tokio::test]
    async fn open_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(
            JsonPatchClient::open(&path).await,
            Err(PatchError::InvalidValue(_))
        ));
    }

    // Add on an empty checkpoint, then get round-trips.
    #[tokio::test]
    async fn scenario_add_on_empty_checkpoint() {
        let (client, _dir) = client_with("{}").await;
        client
            .add(&p(&["DASH_QOS", "qos_03", "bw"]), "\"20001\"")
            .await
            .unwrap();
        let got = client.get(&p(&["DASH_QOS", "qos_03", "bw"])).await.unwrap();
        assert_eq!(got, serde_json::json!("20001"));
    }

    // Array-indexed Add failure modes.
    #[tokio::test]
    async fn scenario_add_then_array_indexed_access() {
        let (client, _dir) = client_with("{}").await;
        client
            .add(
                &p(&["DASH_VNET", "vnet002", "address_spaces"]),
                "[\"a\",\"b\"]",
            )
            .await
            .unwrap();

        assert_eq!(
            client
                .add(
                    &p(&["DASH_VNET", "vnet002", "address_spaces", "0"]),
                    "\"6.6.6.6\""
                )
                .await,
            Err(PatchError::AlreadyExists(p(&[
                "DASH_VNET",
                "vnet002",
                "address_spaces",
                "0"
            ])))
        );

        assert!(matches!(
            client
                .add(
                    &p(&["DASH_VNET", "vnet002", "address_spaces", "abc"]),
                    "\"x\""
                )
                .await,
            Err(PatchError::InvalidIndex { .. })
        ));

        assert!(matches!(
            client
                .add(
                    &p(&["DASH_VNET", "vnet002", "address_spaces", "100"]),
                    "\"x\""
                )
                .await,
            Err(PatchError::InvalidIndex { .. })
        ));
    }

    #[tokio::test]
    async fn append_dash_always_allowed() {
        let (client, _dir) = client_with("{\"arr\": [1, 2]}").await;
        client.add(&p(&["arr", "-"]), "3").await.unwrap();
        let got = client.get(&p(&["arr"])).await.unwrap();
        assert_eq!(got, serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn add_creates_intermediate_maps_but_not_arrays() {
        let (client, _dir) = client_with("{}").await;
        client
            .add(&p(&["A", "B", "C"]), "1")
            .await
            .expect("intermediate maps A and B should be created");

        let (client2, _dir2) = client_with("{\"A\": []}").await;
        assert!(matches!(
            client2.add(&p(&["A", "0", "C"]), "1").await,
            Err(PatchError::InvalidIndex { .. } | PatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn add_rejects_existing_map_key() {
        let (client, _dir) = client_with("{\"k\": 1}").await;
        assert_eq!(
            client.add(&p(&["k"]), "2").await,
            Err(PatchError::AlreadyExists(p(&["k"])))
        );
    }

    // Invariant: Add(p, v) then Get(p) == v.
    #[tokio::test]
    async fn invariant_add_then_get_round_trips() {
        let (client, _dir) = client_with("{}").await;
        client.add(&p(&["a", "b"]), "{\"x\":1}").await.unwrap();
        assert_eq!(
            client.get(&p(&["a", "b"])).await.unwrap(),
            serde_json::json!({"x": 1})
        );
    }

    // Invariant: Add then Remove restores the prior document.
    #[tokio::test]
    async fn invariant_add_then_remove_restores_prior_state() {
        let (client, _dir) = client_with("{\"existing\": true}").await;
        let before = client.get(&[]).await.unwrap();
        client.add(&p(&["new_key"]), "42").await.unwrap();
        client.remove(&p(&["new_key"])).await.unwrap();
        assert_eq!(client.get(&[]).await.unwrap(), before);
    }

    // Invariant: Replace(p, v1) then Replace(p, v2) leaves Get(p) == v2.
    #[tokio::test]
    async fn invariant_double_replace_keeps_latest() {
        let (client, _dir) = client_with("{\"k\": 1}").await;
        client.replace(&p(&["k"]), "2").await.unwrap();
        client.replace(&p(&["k"]), "3").await.unwrap();
        assert_eq!(client.get(&p(&["k"])).await.unwrap(), serde_json::json!(3));
    }

    #[tokio::test]
    async fn replace_requires_existing_target() {
        let (client, _dir) = client_with("{}").await;
        assert_eq!(
            client.replace(&p(&["missing"]), "1").await,
            Err(PatchError::NotFound(p(&["missing"])))
        );
    }

    #[tokio::test]
    async fn remove_shifts_array_left() {
        let (client, _dir) = client_with("{\"arr\": [1, 2, 3]}").await;
        client.remove(&p(&["arr", "0"])).await.unwrap();
        assert_eq!(
            client.get(&p(&["arr"])).await.unwrap(),
            serde_json::json!([2, 3])
        );
    }

    #[tokio::test]
    async fn persisted_document_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        tokio::fs::write(&path, "{}").await.unwrap();
        {
            let client = JsonPatchClient::open(&path).await.unwrap();
            client.add(&p(&["k"]), "\"v\"").await.unwrap();
        }
        let reopened = JsonPatchClient::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(&p(&["k"])).await.unwrap(),
            serde_json::json!("v")
        );
    }

    #[test]
    fn split_pointer_decodes_escapes() {
        assert_eq!(split_pointer("/a~1b/c~0d"), vec!["a/b", "c~d"]);
    }
}
