//! The allow-list bypass decision for bulk patch application.

/// Configuration tables eligible for direct-apply bypass.
pub const ALLOW_LISTED_TABLES: &[&str] = &[
    "VNET",
    "VNET_ROUTE_TUNNEL",
    "VLAN_SUB_INTERFACE",
    "ACL_RULE",
    "BGP_PEER_RANGE",
];

/// Hardware SKU prefixes that enable bypass mode.
pub const ALLOW_LISTED_SKU_PREFIXES: &[&str] = &["Cisco-8102", "Cisco-8101", "Cisco-8223"];

#[must_use]
pub fn sku_is_allow_listed(sku: &str) -> bool {
    ALLOW_LISTED_SKU_PREFIXES.iter().any(|prefix| sku.starts_with(prefix))
}

#[must_use]
pub fn table_is_allow_listed(table: &str) -> bool {
    ALLOW_LISTED_TABLES.contains(&table)
}

/// Whether a bulk patch should be applied directly (bypassing the
/// translation library) rather than schema-validated.
#[must_use]
pub fn should_bypass<'a>(sku: &str, bypass_requested: bool, tables: impl IntoIterator<Item = &'a str>) -> bool {
    bypass_requested && sku_is_allow_listed(sku) && tables.into_iter().all(table_is_allow_listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypasses_only_when_every_condition_holds() {
        assert!(should_bypass("Cisco-8102-O32", true, ["VNET", "ACL_RULE"]));
    }

    #[test]
    fn rejects_when_sku_not_allow_listed() {
        assert!(!should_bypass("Generic-Switch", true, ["VNET"]));
    }

    #[test]
    fn rejects_when_flag_not_set() {
        assert!(!should_bypass("Cisco-8101-O8", false, ["VNET"]));
    }

    #[test]
    fn rejects_when_any_table_is_not_allow_listed() {
        assert!(!should_bypass("Cisco-8223-O32", true, ["VNET", "PORT"]));
    }

    #[test]
    fn empty_table_set_bypasses_trivially() {
        assert!(should_bypass("Cisco-8102-O32", true, []));
    }
}
