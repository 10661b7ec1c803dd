//! Node inventory: which VMs belong to the pool being scaled.
//!
//! Membership is decided from tags first (`poolName` and
//! `resourceNameSuffix`), falling back to the VM name when tags are
//! missing. Availability-set pools yield a map of node index → VM name;
//! scale-set pools only yield the scale set's capacity.

use std::collections::{BTreeMap, HashMap};

use nodescale_core::NameParser;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ScaleError, ScaleResult};
use crate::provider::{Pager, ScaleSet, VirtualMachine};

/// Tag carrying the agent pool name.
pub const POOL_NAME_TAG: &str = "poolName";

/// Tag carrying the (possibly truncated) cluster name suffix.
pub const NAME_SUFFIX_TAG: &str = "resourceNameSuffix";

/// Length of the suffix prefix used by the name-based fallback.
const SUFFIX_MATCH_LEN: usize = 5;

/// Nodes of one pool as discovered at the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeInventory {
    /// index → VM name, ascending by index.
    nodes: BTreeMap<u32, String>,
    /// Scale-set pools: capacity instead of individual nodes.
    capacity: Option<u32>,
    /// Windows pool slot found while scanning.
    pool_slot: Option<u32>,
    /// (index, kept VM, conflicting VM) for every index seen twice.
    duplicates: Vec<(u32, String, String)>,
}

impl NodeInventory {
    /// Inventory of an availability-set pool.
    pub fn from_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut inventory = Self::default();
        for (index, name) in nodes {
            inventory.insert(index, name.into());
        }
        inventory
    }

    /// Inventory of a scale-set pool.
    pub fn scale_set(capacity: u32) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Record a node. A second VM at an index already taken is kept
    /// aside in `duplicates` rather than replacing the first.
    pub fn insert(&mut self, index: u32, vm_name: String) {
        if let Some(existing) = self.nodes.get(&index) {
            warn!(index, kept = %existing, conflicting = %vm_name, "duplicate node index");
            self.duplicates.push((index, existing.clone(), vm_name));
            return;
        }
        self.nodes.insert(index, vm_name);
    }

    pub fn with_pool_slot(mut self, slot: u32) -> Self {
        self.pool_slot = Some(slot);
        self
    }

    pub fn is_scale_set(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn current_count(&self) -> u32 {
        self.capacity.unwrap_or(self.nodes.len() as u32)
    }

    /// Highest node index in use. `None` for scale sets and empty pools.
    pub fn highest_used_index(&self) -> Option<u32> {
        if self.is_scale_set() {
            return None;
        }
        self.nodes.keys().next_back().copied()
    }

    /// Indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        self.nodes.keys().copied().collect()
    }

    pub fn vm_name(&self, index: u32) -> Option<&str> {
        self.nodes.get(&index).map(String::as_str)
    }

    /// The `count` highest-indexed VMs, highest first.
    pub fn highest_indexed(&self, count: usize) -> Vec<String> {
        self.nodes.values().rev().take(count).cloned().collect()
    }

    pub fn pool_slot(&self) -> Option<u32> {
        self.pool_slot
    }

    pub fn duplicates(&self) -> &[(u32, String, String)] {
        &self.duplicates
    }
}

/// Decides whether a VM belongs to the target pool of this cluster.
#[derive(Debug, Clone, Copy)]
pub struct PoolMatcher<'a> {
    pool: &'a str,
    name_suffix: &'a str,
}

impl<'a> PoolMatcher<'a> {
    pub fn new(pool: &'a str, name_suffix: &'a str) -> Self {
        Self { pool, name_suffix }
    }

    pub fn matches(&self, vm_name: &str, tags: &HashMap<String, String>) -> bool {
        if let (Some(pool), Some(suffix)) = (tags.get(POOL_NAME_TAG), tags.get(NAME_SUFFIX_TAG)) {
            // Windows resources carry only a prefix of the suffix.
            if pool.eq_ignore_ascii_case(self.pool) && self.name_suffix.contains(suffix.as_str()) {
                return true;
            }
        }

        let short_suffix = self
            .name_suffix
            .get(..SUFFIX_MATCH_LEN)
            .unwrap_or(self.name_suffix);
        vm_name.contains(short_suffix) && vm_name.contains(self.pool)
    }
}

/// Walks provider listings and builds a `NodeInventory`.
pub struct InventoryScanner<'a> {
    parser: &'a NameParser,
    matcher: PoolMatcher<'a>,
    resource_group: &'a str,
}

impl<'a> InventoryScanner<'a> {
    pub fn new(parser: &'a NameParser, matcher: PoolMatcher<'a>, resource_group: &'a str) -> Self {
        Self {
            parser,
            matcher,
            resource_group,
        }
    }

    /// Scan VMs of an availability-set pool.
    ///
    /// Any VM that matches the pool but whose name cannot be parsed fails
    /// the whole scan.
    pub async fn scan_virtual_machines(
        &self,
        pager: &mut dyn Pager<VirtualMachine>,
    ) -> ScaleResult<NodeInventory> {
        let mut inventory = NodeInventory::default();
        let mut seen = 0usize;

        while let Some(page) = pager
            .next_page()
            .await
            .map_err(|source| self.listing_failure("virtual machines", source))?
        {
            seen += page.len();
            for vm in page {
                if !self.matcher.matches(&vm.name, &vm.tags) {
                    continue;
                }
                let identity = self.parser.parse(&vm.name, vm.image_publisher.as_deref())?;
                if let Some(slot) = identity.pool_slot {
                    match inventory.pool_slot {
                        Some(existing) if existing != slot => {
                            warn!(vm = %vm.name, slot, existing, "pool VMs span multiple pool slots");
                        }
                        Some(_) => {}
                        None => inventory.pool_slot = Some(slot),
                    }
                }
                debug!(vm = %vm.name, index = identity.index, "matched pool node");
                inventory.insert(identity.index, vm.name);
            }
        }

        if seen == 0 {
            return Err(ScaleError::EmptyResourceGroup {
                kind: "virtual machines",
                resource_group: self.resource_group.to_string(),
            });
        }

        info!(
            nodes = inventory.current_count(),
            highest_index = ?inventory.highest_used_index(),
            "pool inventory collected"
        );
        Ok(inventory)
    }

    /// Scan scale sets of a scale-set pool.
    ///
    /// Only capacity matters here. A Windows scale set name is parsed for
    /// its pool slot on a best-effort basis.
    pub async fn scan_scale_sets(
        &self,
        pager: &mut dyn Pager<ScaleSet>,
    ) -> ScaleResult<NodeInventory> {
        let mut capacity = 0u32;
        let mut pool_slot = None;
        let mut matched = 0usize;
        let mut seen = 0usize;

        while let Some(page) = pager
            .next_page()
            .await
            .map_err(|source| self.listing_failure("scale sets", source))?
        {
            seen += page.len();
            for vmss in page {
                if !self.matcher.matches(&vmss.name, &vmss.tags) {
                    continue;
                }
                if self.parser.is_windows_publisher(vmss.image_publisher.as_deref()) {
                    match self.parser.parse_windows(&vmss.name) {
                        Ok(identity) => pool_slot = identity.pool_slot,
                        Err(e) => warn!(vmss = %vmss.name, error = %e, "could not read pool slot"),
                    }
                }
                debug!(vmss = %vmss.name, capacity = vmss.capacity, "matched pool scale set");
                capacity += vmss.capacity;
                matched += 1;
            }
        }

        if seen == 0 {
            return Err(ScaleError::EmptyResourceGroup {
                kind: "scale sets",
                resource_group: self.resource_group.to_string(),
            });
        }
        if matched > 1 {
            warn!(matched, "more than one scale set matched the pool, summing capacity");
        }

        let mut inventory = NodeInventory::scale_set(capacity);
        inventory.pool_slot = pool_slot;
        info!(capacity, "pool scale set capacity collected");
        Ok(inventory)
    }

    fn listing_failure(&self, kind: &'static str, source: anyhow::Error) -> ScaleError {
        ScaleError::ListingFailure {
            kind,
            resource_group: self.resource_group.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticPager;

    const SUFFIX: &str = "1a2b3c4d";

    fn vm(name: &str) -> VirtualMachine {
        VirtualMachine {
            name: name.to_string(),
            tags: HashMap::new(),
            image_publisher: Some("Canonical".to_string()),
        }
    }

    fn tagged(name: &str, pool: &str, suffix: &str) -> VirtualMachine {
        let mut vm = vm(name);
        vm.tags.insert(POOL_NAME_TAG.to_string(), pool.to_string());
        vm.tags.insert(NAME_SUFFIX_TAG.to_string(), suffix.to_string());
        vm
    }

    fn scan(pages: Vec<Vec<VirtualMachine>>) -> ScaleResult<NodeInventory> {
        let parser = NameParser::new().unwrap();
        let scanner = InventoryScanner::new(&parser, PoolMatcher::new("agentpool1", SUFFIX), "rg");
        let mut pager = StaticPager::new(pages);
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(scanner.scan_virtual_machines(&mut pager))
    }

    #[test]
    fn tag_suffix_is_a_substring_match() {
        let matcher = PoolMatcher::new("agentpool1", "ab12e67890");
        let vm = tagged("whatever", "AgentPool1", "ab12e");
        assert!(matcher.matches(&vm.name, &vm.tags));

        let other_cluster = tagged("whatever", "agentpool1", "ffff0");
        assert!(!matcher.matches(&other_cluster.name, &other_cluster.tags));
    }

    #[test]
    fn name_fallback_without_tags() {
        let matcher = PoolMatcher::new("agentpool1", SUFFIX);
        let empty = HashMap::new();
        assert!(matcher.matches("k8s-agentpool1-1a2b3c4d-0", &empty));
        assert!(!matcher.matches("k8s-agentpool2-1a2b3c4d-0", &empty));
        assert!(!matcher.matches("k8s-agentpool1-99999999-0", &empty));
        assert!(!matcher.matches("k8s-master-1a2b3c4d-0", &empty));
    }

    #[test]
    fn short_suffix_does_not_panic() {
        let matcher = PoolMatcher::new("p", "abc");
        assert!(matcher.matches("abc-p", &HashMap::new()));
    }

    #[test]
    fn scan_collects_sorted_indices_across_pages() {
        let inventory = scan(vec![
            vec![
                vm("k8s-master-1a2b3c4d-0"),
                vm("k8s-agentpool1-1a2b3c4d-3"),
                vm("k8s-agentpool2-1a2b3c4d-1"),
            ],
            vec![vm("k8s-agentpool1-1a2b3c4d-0"), vm("k8s-agentpool1-1a2b3c4d-2")],
        ])
        .unwrap();

        assert_eq!(inventory.indices(), vec![0, 2, 3]);
        assert_eq!(inventory.current_count(), 3);
        assert_eq!(inventory.highest_used_index(), Some(3));
        assert_eq!(inventory.vm_name(2), Some("k8s-agentpool1-1a2b3c4d-2"));
    }

    #[test]
    fn scan_empty_resource_group() {
        let err = scan(vec![vec![]]).unwrap_err();
        assert!(matches!(err, ScaleError::EmptyResourceGroup { .. }));

        let err = scan(vec![]).unwrap_err();
        assert!(matches!(err, ScaleError::EmptyResourceGroup { .. }));
    }

    #[test]
    fn scan_with_no_pool_members_is_not_empty_group() {
        let inventory = scan(vec![vec![vm("k8s-master-1a2b3c4d-0")], vec![]]).unwrap();
        assert_eq!(inventory.current_count(), 0);
        assert_eq!(inventory.highest_used_index(), None);
    }

    #[test]
    fn unparseable_member_aborts_scan() {
        let err = scan(vec![vec![tagged("agentpool1-broken", "agentpool1", SUFFIX)]]).unwrap_err();
        assert!(matches!(err, ScaleError::UnparseableIdentity(_)));
    }

    #[test]
    fn listing_error_aborts_scan() {
        struct Failing;

        #[async_trait::async_trait]
        impl Pager<VirtualMachine> for Failing {
            async fn next_page(&mut self) -> anyhow::Result<Option<Vec<VirtualMachine>>> {
                anyhow::bail!("throttled")
            }
        }

        let parser = NameParser::new().unwrap();
        let scanner = InventoryScanner::new(&parser, PoolMatcher::new("agentpool1", SUFFIX), "rg");
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(scanner.scan_virtual_machines(&mut Failing))
            .unwrap_err();
        assert!(matches!(err, ScaleError::ListingFailure { .. }));
        assert!(err.to_string().contains("throttled"));
    }

    #[test]
    fn windows_scan_records_pool_slot() {
        let mut win = tagged("1a2bk8s02005", "agentpool1", "1a2b");
        win.image_publisher = Some("MicrosoftWindowsServer".to_string());
        let inventory = scan(vec![vec![win]]).unwrap();
        assert_eq!(inventory.pool_slot(), Some(2));
        assert_eq!(inventory.indices(), vec![5]);
    }

    #[test]
    fn duplicate_indices_are_flagged_not_fatal() {
        let mut inventory = NodeInventory::from_nodes([(1, "a"), (2, "b")]);
        inventory.insert(1, "c".to_string());
        assert_eq!(inventory.current_count(), 2);
        assert_eq!(inventory.vm_name(1), Some("a"));
        assert_eq!(inventory.duplicates(), &[(1, "a".to_string(), "c".to_string())]);
    }

    #[test]
    fn highest_indexed_takes_from_the_top() {
        let inventory = NodeInventory::from_nodes([(0, "a"), (2, "c"), (7, "h"), (3, "d")]);
        assert_eq!(inventory.highest_indexed(2), vec!["h".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn scale_set_scan_reports_capacity() {
        let parser = NameParser::new().unwrap();
        let scanner = InventoryScanner::new(&parser, PoolMatcher::new("agentpool1", SUFFIX), "rg");
        let mut pager = StaticPager::single(vec![
            ScaleSet {
                name: "k8s-agentpool1-1a2b3c4d-vmss".to_string(),
                tags: HashMap::new(),
                image_publisher: None,
                capacity: 4,
            },
            ScaleSet {
                name: "k8s-agentpool2-1a2b3c4d-vmss".to_string(),
                tags: HashMap::new(),
                image_publisher: None,
                capacity: 9,
            },
        ]);
        let inventory = scanner.scan_scale_sets(&mut pager).await.unwrap();
        assert!(inventory.is_scale_set());
        assert_eq!(inventory.current_count(), 4);
        assert_eq!(inventory.highest_used_index(), None);
    }
}
