//! Concrete backing-store addressing and path-syntax parsing.

use std::collections::BTreeMap;

use crate::{
    error::PathParseError,
    value::{
        Path,
        PathElem,
    },
};

/// A JSON overlay's addressing, used when a table is also exposed through
/// the JSON checkpoint document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JsonOverlay {
    pub json_table_key: String,
    pub json_field: Option<String>,
}

/// The concrete backing-store address of one row/field in one database
/// instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TablePath {
    pub namespace: String,
    pub container: String,
    pub db_name: String,
    pub table: String,
    pub key: String,
    pub field: Option<String>,
    pub delimiter: String,
    pub json_overlay: Option<JsonOverlay>,
}

impl TablePath {
    #[must_use]
    pub fn new(db_name: impl Into<String>, table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            container: "database".to_string(),
            db_name: db_name.into(),
            table: table.into(),
            key: key.into(),
            field: None,
            delimiter: "|".to_string(),
            json_overlay: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_json_overlay(mut self, overlay: JsonOverlay) -> Self {
        self.json_overlay = Some(overlay);
        self
    }

    /// The `table|key` redis-style key this path addresses.
    #[must_use]
    pub fn redis_key(&self) -> String {
        format!("{}{}{}", self.table, self.delimiter, self.key)
    }

    /// Addresses a whole table row rather than a single field.
    #[must_use]
    pub fn is_whole_row(&self) -> bool {
        self.field.is_none()
    }
}

/// Parses `origin:target/P1/P2/...` with optional `[k=v,k=v]` keyed
/// attributes on any element.
pub fn parse_path_str(input: &str) -> Result<Path, PathParseError> {
    if input.is_empty() {
        return Err(PathParseError::Empty);
    }

    let (origin_target, rest) = match input.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (input, ""),
    };
    let (origin, target) = match origin_target.split_once(':') {
        Some((o, t)) => (Some(o.to_string()), Some(t.to_string())),
        None => (None, None),
    };

    let mut elem = Vec::new();
    if !rest.is_empty() {
        for segment in rest.split('/') {
            if segment.is_empty() {
                continue;
            }
            elem.push(parse_elem(segment)?);
        }
    }

    Ok(Path {
        origin,
        target,
        elem,
    })
}

fn parse_elem(segment: &str) -> Result<PathElem, PathParseError> {
    let Some(bracket_start) = segment.find('[') else {
        return Ok(PathElem::simple(segment));
    };
    if !segment.ends_with(']') {
        return Err(PathParseError::MalformedAttribute(segment.to_string()));
    }
    let name = &segment[..bracket_start];
    let attrs = &segment[bracket_start + 1..segment.len() - 1];
    let mut key = BTreeMap::new();
    for pair in attrs.split(',') {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| PathParseError::MalformedAttribute(segment.to_string()))?;
        key.insert(k.to_string(), v.to_string());
    }
    Ok(PathElem {
        name: name.to_string(),
        key,
    })
}

/// Enforces that every path in one RPC resolves to the same
/// `origin`/`target`, returning that shared pair.
pub fn require_uniform_origin_target<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> Result<(Option<String>, Option<String>), PathParseError> {
    let mut iter = paths.into_iter();
    let Some(first) = iter.next() else {
        return Ok((None, None));
    };
    let mut origin = first.origin.clone();
    let mut target = first.target.clone();
    for path in iter {
        match (&origin, &path.origin) {
            (Some(a), Some(b)) if a != b => {
                return Err(PathParseError::MixedOrigin(a.clone(), b.clone()));
            }
            (None, Some(b)) => origin = Some(b.clone()),
            _ => {}
        }
        match (&target, &path.target) {
            (Some(a), Some(b)) if a != b => {
                return Err(PathParseError::MixedTarget(a.clone(), b.clone()));
            }
            (None, Some(b)) => target = Some(b.clone()),
            _ => {}
        }
    }
    Ok((origin, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_target_and_elements() {
        let path = parse_path_str("sonic-db:COUNTERS_DB/COUNTERS/Ethernet0").unwrap();
        assert_eq!(path.origin.as_deref(), Some("sonic-db"));
        assert_eq!(path.target.as_deref(), Some("COUNTERS_DB"));
        assert_eq!(path.elem.len(), 2);
        assert_eq!(path.elem[0].name, "COUNTERS");
        assert_eq!(path.elem[1].name, "Ethernet0");
    }

    #[test]
    fn parses_keyed_attributes() {
        let path = parse_path_str("sonic-db:CONFIG_DB/VLAN_MEMBER[name=Vlan100,port=Ethernet0]").unwrap();
        let elem = &path.elem[0];
        assert_eq!(elem.name, "VLAN_MEMBER");
        assert_eq!(elem.key.get("name"), Some(&"Vlan100".to_string()));
        assert_eq!(elem.key.get("port"), Some(&"Ethernet0".to_string()));
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse_path_str(""), Err(PathParseError::Empty));
    }

    #[test]
    fn rejects_malformed_attribute() {
        assert!(parse_path_str("sonic-db:CONFIG_DB/VLAN[bad]").is_err());
    }

    #[test]
    fn uniform_origin_target_detects_mismatch() {
        let a = parse_path_str("sonic-db:COUNTERS_DB/COUNTERS/Ethernet0").unwrap();
        let b = parse_path_str("sonic-yang:COUNTERS_DB/COUNTERS/Ethernet0").unwrap();
        assert!(matches!(
            require_uniform_origin_target([&a, &b]),
            Err(PathParseError::MixedOrigin(_, _))
        ));
    }

    #[test]
    fn uniform_origin_target_allows_agreement() {
        let a = parse_path_str("sonic-db:COUNTERS_DB/COUNTERS/Ethernet0").unwrap();
        let b = parse_path_str("sonic-db:COUNTERS_DB/COUNTERS/Ethernet4").unwrap();
        let (origin, target) = require_uniform_origin_target([&a, &b]).unwrap();
        assert_eq!(origin.as_deref(), Some("sonic-db"));
        assert_eq!(target.as_deref(), Some("COUNTERS_DB"));
    }
}
