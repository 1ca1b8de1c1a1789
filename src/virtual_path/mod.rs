//! Resolves virtual subscription paths into concrete [`TablePath`]s. The
//! resolver itself is a thin [`Trie`] lookup; the per-path expansion logic
//! lives in [`translators`].

mod translators;

use std::collections::HashMap;

use crate::{
    error::ResolveError,
    path::TablePath,
    trie::Trie,
    value::{
        Path,
        PathElem,
    },
};

pub use translators::Translator;

/// The process-wide maps a translator consults: port→OID, alias↔internal
/// name, and the counter sub-maps keyed by submap name. Populated once from the configuration
/// database at startup and never mutated afterward.
#[derive(Clone, Debug, Default)]
pub struct ResolverContext {
    pub namespace: String,
    pub delimiter: String,
    pub port_to_oid: HashMap<String, String>,
    pub alias_to_name: HashMap<String, String>,
    pub name_to_alias: HashMap<String, String>,
    /// `submap_name -> ("<port>:<index>" -> oid)`, e.g. `COUNTERS_QUEUE_NAME_MAP`
    /// under key `"QUEUES"`.
    pub counter_submaps: HashMap<&'static str, HashMap<String, String>>,
}

impl ResolverContext {
    #[must_use]
    pub fn internal_name(&self, key: &str) -> String {
        self.alias_to_name.get(key).cloned().unwrap_or_else(|| key.to_string())
    }

    #[must_use]
    pub fn alias_or_name(&self, internal: &str) -> String {
        self.name_to_alias
            .get(internal)
            .cloned()
            .unwrap_or_else(|| internal.to_string())
    }
}

/// A process-wide trie mapping virtual path shapes to the translator that
/// knows how to expand them.
pub struct VirtualPathResolver {
    trie: Trie<Translator>,
    ctx: ResolverContext,
}

impl VirtualPathResolver {
    #[must_use]
    pub fn new(ctx: ResolverContext) -> Self {
        let mut trie = Trie::new();
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*"],
            Translator::CounterWholeRow,
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "Pfcwd"],
            Translator::CounterSubMap {
                submap_name: "PFCWD",
            },
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "Queues"],
            Translator::CounterSubMap {
                submap_name: "QUEUES",
            },
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "*"],
            Translator::CounterField,
        );
        Self {
            trie,
            ctx,
        }
    }

    /// Resolves `path` to one or more fully-qualified [`TablePath`]s with no
    /// remaining wildcard.
    pub fn resolve(&self, path: &Path) -> Result<Vec<TablePath>, ResolveError> {
        let elem: Vec<&PathElem> = path.elem.iter().collect();
        let keys: Vec<&str> = elem.iter().map(|e| e.name.as_str()).collect();
        let translator = self
            .trie
            .find(&keys)
            .ok_or_else(|| ResolveError::NoTranslator(elem.iter().map(|e| e.name.clone()).collect()))?;
        translator.resolve(&elem, &self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolverContext {
        let mut ctx = ResolverContext {
            namespace: String::new(),
            delimiter: "|".to_string(),
            ..Default::default()
        };
        ctx.port_to_oid.insert("Ethernet0".to_string(), "oid:0x1a".to_string());
        ctx.port_to_oid.insert("Ethernet4".to_string(), "oid:0x1b".to_string());
        ctx.alias_to_name.insert("Eth1/1".to_string(), "Ethernet0".to_string());
        ctx.name_to_alias.insert("Ethernet0".to_string(), "Eth1/1".to_string());
        ctx
    }

    fn path(elems: &[&str]) -> Path {
        Path::new(elems.iter().map(|e| PathElem::simple(*e)))
    }

    #[test]
    fn literal_port_resolves_single_row_with_alias_overlay() {
        let resolver = VirtualPathResolver::new(ctx());
        let resolved = resolver
            .resolve(&path(&["COUNTERS_DB", "COUNTERS", "Ethernet0"]))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].key, "oid:0x1a");
        assert_eq!(
            resolved[0].json_overlay.as_ref().unwrap().json_table_key,
            "Eth1/1"
        );
    }

    #[test]
    fn literal_alias_resolves_to_internal_name_oid() {
        let resolver = VirtualPathResolver::new(ctx());
        let resolved = resolver
            .resolve(&path(&["COUNTERS_DB", "COUNTERS", "Eth1/1"]))
            .unwrap();
        assert_eq!(resolved[0].key, "oid:0x1a");
    }

    #[test]
    fn wildcard_port_expands_to_every_known_port() {
        let resolver = VirtualPathResolver::new(ctx());
        let mut resolved = resolver
            .resolve(&path(&["COUNTERS_DB", "COUNTERS", "Ethernet*"]))
            .unwrap();
        resolved.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].key, "oid:0x1a");
        assert_eq!(resolved[1].key, "oid:0x1b");
    }

    #[test]
    fn unknown_port_is_a_descriptive_error() {
        let resolver = VirtualPathResolver::new(ctx());
        assert!(matches!(
            resolver.resolve(&path(&["COUNTERS_DB", "COUNTERS", "Ethernet99"])),
            Err(ResolveError::UnknownPort(_))
        ));
    }

    #[test]
    fn field_access_sets_table_path_field() {
        let resolver = VirtualPathResolver::new(ctx());
        let resolved = resolver
            .resolve(&path(&["COUNTERS_DB", "COUNTERS", "Ethernet0", "SAI_PORT_STAT_IF_IN_OCTETS"]))
            .unwrap();
        assert_eq!(
            resolved[0].field.as_deref(),
            Some("SAI_PORT_STAT_IF_IN_OCTETS")
        );
    }

    #[test]
    fn missing_submap_is_a_descriptive_error() {
        let resolver = VirtualPathResolver::new(ctx());
        assert!(matches!(
            resolver.resolve(&path(&["COUNTERS_DB", "COUNTERS", "Ethernet0", "Queues"])),
            Err(ResolveError::MissingCounterMap(_))
        ));
    }

    #[test]
    fn unknown_path_shape_has_no_translator() {
        let resolver = VirtualPathResolver::new(ctx());
        assert!(matches!(
            resolver.resolve(&path(&["CONFIG_DB", "VLAN"])),
            Err(ResolveError::NoTranslator(_))
        ));
    }
}
