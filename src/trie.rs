//! A prefix tree over string keys with wildcard children.
//!
//! Used both to resolve non-DB metric paths to getter functions
//! ([`crate::nondb`]) and virtual subscription paths to translators
//! ([`crate::virtual_path`]); both use-sites get their own `Trie<T>`
//! instantiation, each with its own concrete metadata type, rather than
//! sharing one `T = Box<dyn Any>`.

use std::collections::HashMap;

#[derive(Debug)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    /// Children registered under a key ending in `*`, indexed by the
    /// wildcard's literal prefix (without the trailing `*`).
    wildcards: HashMap<String, Node<T>>,
    value: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            wildcards: HashMap::new(),
            value: None,
        }
    }
}

/// A trie whose terminal nodes carry metadata of type `T`.
#[derive(Debug)]
pub struct Trie<T> {
    root: Node<T>,
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
        }
    }
}

impl<T> Trie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` at the path named by `keys`, creating intermediate
    /// nodes as needed. A key ending in `*` is indexed both literally and
    /// under its wildcard prefix, so a later literal lookup for the exact
    /// string `"Ethernet*"` still finds it.
    pub fn insert(&mut self, keys: &[&str], value: T) {
        let mut node = &mut self.root;
        for key in keys {
            if let Some(prefix) = key.strip_suffix('*') {
                node = node
                    .wildcards
                    .entry(prefix.to_string())
                    .or_default();
            } else {
                node = node.children.entry((*key).to_string()).or_default();
            }
        }
        node.value = Some(value);
    }

    /// Traverses `keys`, preferring a literal child at each level; if none
    /// exists, scans the level's wildcards for one whose prefix the query
    /// element starts with. Returns the terminal node's metadata, if any
    /// was inserted there.
    #[must_use]
    pub fn find(&self, keys: &[&str]) -> Option<&T> {
        let mut node = &self.root;
        for key in keys {
            node = match node.children.get(*key) {
                Some(child) => child,
                None => find_wildcard_child(node, key)?,
            };
        }
        node.value.as_ref()
    }
}

fn find_wildcard_child<'a, T>(node: &'a Node<T>, key: &str) -> Option<&'a Node<T>> {
    // "the first whose prefix (without `*`) matches the query element"
    // — iteration order over a HashMap isn't stable, but for
    // this trie's use-sites exactly one wildcard prefix is ever a match
    // candidate per level (e.g. a single `Ethernet*` child), so "first
    // match" and "only match" coincide in practice.
    node.wildcards
        .iter()
        .find(|(prefix, _)| key.starts_with(prefix.as_str()))
        .map(|(_, child)| child)
}
