//! Per-shape expansion logic for [`super::VirtualPathResolver`]. Each
//! variant is registered at one trie location; `resolve` dispatches on the
//! *actual* requested path (wildcard vs. literal key) rather than on which
//! trie node matched, since a wildcard trie node matches both shapes.

use crate::{
    error::ResolveError,
    path::{
        JsonOverlay,
        TablePath,
    },
    value::PathElem,
};

use super::ResolverContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Translator {
    /// `COUNTERS_DB/COUNTERS/Ethernet*` — one whole table row per port.
    CounterWholeRow,
    /// `COUNTERS_DB/COUNTERS/Ethernet*/{Pfcwd,Queues}` — one row per entry
    /// in the named counters sub-map for that port.
    CounterSubMap { submap_name: &'static str },
    /// `COUNTERS_DB/COUNTERS/Ethernet*/<field>` — a single field of the
    /// port's row.
    CounterField,
}

impl Translator {
    pub fn resolve(
        &self,
        elem: &[&PathElem],
        ctx: &ResolverContext,
    ) -> Result<Vec<TablePath>, ResolveError> {
        let port_elem = elem.get(2).ok_or_else(|| {
            ResolveError::NoTranslator(elem.iter().map(|e| e.name.clone()).collect())
        })?;

        match self {
            Translator::CounterWholeRow => resolve_whole_row(port_elem, ctx),
            Translator::CounterSubMap {
                submap_name,
            } => resolve_submap(port_elem, submap_name, ctx),
            Translator::CounterField => {
                let field_elem = elem.get(3).ok_or_else(|| {
                    ResolveError::NoTranslator(elem.iter().map(|e| e.name.clone()).collect())
                })?;
                resolve_field(port_elem, field_elem, ctx)
            }
        }
    }
}

/// Every internal port name matching `port_elem`: all known ports if
/// `port_elem` is itself the wildcard `Ethernet*`, otherwise the single
/// port named or aliased by `port_elem`.
fn matching_ports(port_elem: &PathElem, ctx: &ResolverContext) -> Result<Vec<String>, ResolveError> {
    if port_elem.is_wildcard() {
        let prefix = port_elem.wildcard_prefix();
        let mut ports: Vec<String> = ctx
            .port_to_oid
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        ports.sort();
        Ok(ports)
    } else {
        Ok(vec![ctx.internal_name(&port_elem.name)])
    }
}

fn resolve_whole_row(
    port_elem: &PathElem,
    ctx: &ResolverContext,
) -> Result<Vec<TablePath>, ResolveError> {
    matching_ports(port_elem, ctx)?
        .into_iter()
        .map(|port| port_table_path(&port, ctx, None))
        .collect()
}

fn resolve_field(
    port_elem: &PathElem,
    field_elem: &PathElem,
    ctx: &ResolverContext,
) -> Result<Vec<TablePath>, ResolveError> {
    matching_ports(port_elem, ctx)?
        .into_iter()
        .map(|port| port_table_path(&port, ctx, Some(field_elem.name.as_str())))
        .collect()
}

fn port_table_path(
    port: &str,
    ctx: &ResolverContext,
    field: Option<&str>,
) -> Result<TablePath, ResolveError> {
    let oid = ctx
        .port_to_oid
        .get(port)
        .ok_or_else(|| ResolveError::UnknownPort(port.to_string()))?;
    let alias = ctx.alias_or_name(port);
    let mut table_path = TablePath::new("COUNTERS_DB", "COUNTERS", oid.clone())
        .with_namespace(ctx.namespace.clone())
        .with_json_overlay(JsonOverlay {
            json_table_key: alias,
            json_field: field.map(str::to_string),
        });
    table_path.delimiter = ctx.delimiter.clone();
    if let Some(field) = field {
        table_path = table_path.with_field(field);
    }
    Ok(table_path)
}

fn resolve_submap(
    port_elem: &PathElem,
    submap_name: &str,
    ctx: &ResolverContext,
) -> Result<Vec<TablePath>, ResolveError> {
    let submap = ctx
        .counter_submaps
        .get(submap_name)
        .ok_or_else(|| ResolveError::MissingCounterMap(submap_name.to_string()))?;

    matching_ports(port_elem, ctx)?
        .into_iter()
        .map(|port| {
            let prefix = format!("{port}:");
            let mut oids: Vec<&String> = submap
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, oid)| oid)
                .collect();
            oids.sort();
            (port, oids)
        })
        .flat_map(|(port, oids)| {
            let alias = ctx.alias_or_name(&port);
            oids.into_iter().map(move |oid| {
                let mut table_path = TablePath::new("COUNTERS_DB", "COUNTERS", oid.clone())
                    .with_namespace(ctx.namespace.clone())
                    .with_json_overlay(JsonOverlay {
                        json_table_key: alias.clone(),
                        json_field: None,
                    });
                table_path.delimiter = ctx.delimiter.clone();
                Ok(table_path)
            })
        })
        .collect()
}
