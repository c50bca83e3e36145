//! Hierarchical occupancy tree.
//!
//! A sparse octree over the [`KeySpace`] whose nodes live in a flat arena and
//! refer to their children by index.  The root covers an aligned block of
//! `2^root_level` finest keys per axis; the block grows one level at a time
//! (reroot) until it contains every key that has been updated.
//!
//! # Node semantics
//!
//! | Node shape | Meaning |
//! |------------|---------|
//! | absent child slot | never observed (unknown) |
//! | childless, level 0 | a finest voxel |
//! | childless, level > 0 | collapsed leaf standing for its whole block |
//! | with children | inner node; log-odds is the max of its children |
//!
//! # Example
//!
//! ```rust
//! use voxmap_octree::OccupancyTree;
//! use voxmap_types::{Occupancy, Point3, TreeConfig};
//!
//! let mut tree = OccupancyTree::new(TreeConfig::with_resolution(0.1)).unwrap();
//! tree.update_node_at(Point3::new(1.0, 1.0, 1.0), true).unwrap();
//!
//! assert_eq!(tree.classify(Point3::new(1.0, 1.0, 1.0)).unwrap(), Occupancy::Occupied);
//! assert_eq!(tree.classify(Point3::new(5.0, 5.0, 5.0)).unwrap(), Occupancy::Unknown);
//! ```

use tracing::debug;
use voxmap_types::{MapError, Occupancy, Point3, TreeConfig, VoxelKey};

use crate::key_space::{KeySpace, child_index, child_origin, key_at_level};
use crate::sensor_model::{SensorModel, probability};

pub(crate) const NO_CHILD: u32 = u32::MAX;

// ────────────────────────────────────────────────────────────────────────────
// NodeId / OccupancyNode
// ────────────────────────────────────────────────────────────────────────────

/// Handle to a node in a tree's arena.  Only meaningful for the tree that
/// produced it, and only until the next mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// One tree node: a log-odds value plus eight optional children.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyNode {
    pub(crate) log_odds: f32,
    pub(crate) children: [u32; 8],
}

impl OccupancyNode {
    pub(crate) fn new(log_odds: f32) -> Self {
        Self {
            log_odds,
            children: [NO_CHILD; 8],
        }
    }

    pub fn log_odds(&self) -> f32 {
        self.log_odds
    }

    /// Occupancy probability in `(0, 1)`.
    pub fn probability(&self) -> f64 {
        probability(self.log_odds)
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy::from_log_odds(self.log_odds)
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy() == Occupancy::Occupied
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(|&c| c != NO_CHILD)
    }

    /// Child in slot `index` (0..8), if allocated.
    pub fn child(&self, index: usize) -> Option<NodeId> {
        match self.children.get(index) {
            Some(&c) if c != NO_CHILD => Some(NodeId(c)),
            _ => None,
        }
    }

    /// Bit `i` is set when child slot `i` is allocated.
    pub fn child_mask(&self) -> u8 {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != NO_CHILD)
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }
}

/// A childless node found by [`OccupancyTree::leaves`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf {
    /// First finest key of the leaf's block.
    pub key: VoxelKey,
    /// Level of the leaf (0 = finest voxel).
    pub level: u8,
    pub log_odds: f32,
}

impl Leaf {
    pub fn occupancy(&self) -> Occupancy {
        Occupancy::from_log_odds(self.log_odds)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OccupancyTree
// ────────────────────────────────────────────────────────────────────────────

/// Sparse probabilistic occupancy map.
///
/// Construct with [`OccupancyTree::new`], feed observations with
/// [`update_node`][Self::update_node] (or the helpers in [`crate::insert`]),
/// query with [`search`][Self::search] / [`classify`][Self::classify], and
/// compact with [`prune`][Self::prune].
#[derive(Debug, Clone)]
pub struct OccupancyTree {
    config: TreeConfig,
    space: KeySpace,
    model: SensorModel,
    pub(crate) nodes: Vec<OccupancyNode>,
    pub(crate) free: Vec<u32>,
    pub(crate) root: Option<u32>,
    pub(crate) root_level: u8,
    pub(crate) root_origin: VoxelKey,
}

impl OccupancyTree {
    /// Create an empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: TreeConfig) -> Result<Self, MapError> {
        let space = KeySpace::from_config(&config)?;
        let model = SensorModel::from_config(&config);
        Ok(Self {
            config,
            space,
            model,
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            root_level: 0,
            root_origin: VoxelKey::default(),
        })
    }

    /// Create an empty tree with default parameters at `resolution`.
    pub fn with_resolution(resolution: f64) -> Result<Self, MapError> {
        Self::new(TreeConfig::with_resolution(resolution))
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.space
    }

    pub fn sensor_model(&self) -> &SensorModel {
        &self.model
    }

    pub fn resolution(&self) -> f64 {
        self.space.resolution()
    }

    /// Level of the root node (0 when the tree holds a single voxel).
    pub fn root_level(&self) -> u8 {
        self.root_level
    }

    /// First finest key of the block covered by the root.
    pub fn root_origin(&self) -> VoxelKey {
        self.root_origin
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root.map(NodeId)
    }

    /// Look up a node by handle.
    pub fn node(&self, id: NodeId) -> Option<&OccupancyNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of live nodes (inner nodes included).
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Approximate heap plus inline footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.nodes.capacity() * std::mem::size_of::<OccupancyNode>()
            + self.free.capacity() * std::mem::size_of::<u32>()
    }

    /// Drop every node, keeping the configuration.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.root_level = 0;
        self.root_origin = VoxelKey::default();
    }

    /// True when `key` lies inside the block covered by the root.
    pub fn covers(&self, key: VoxelKey) -> bool {
        if self.root.is_none() {
            return false;
        }
        key_at_level(key, self.root_level) == self.root_origin
    }

    // ── Update ──────────────────────────────────────────────────────────────

    /// Apply one hit or miss observation to the finest voxel `key`.
    ///
    /// Grows the tree by rerooting when `key` lies outside the current root
    /// block, allocates missing nodes along the path with log-odds 0, splits a
    /// collapsed leaf met on the way, and refreshes inner values on the way
    /// back up.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::OutOfRange`] when `key` is outside the key space.
    pub fn update_node(&mut self, key: VoxelKey, is_hit: bool) -> Result<&OccupancyNode, MapError> {
        if !self.space.contains_key(key) {
            return Err(MapError::out_of_range(self.space.coord_of(key)));
        }
        let root = self.grow_to_cover(key);

        let mut path = Vec::with_capacity(usize::from(self.root_level) + 1);
        let mut idx = root;
        let mut fresh = false;
        for level in (0..self.root_level).rev() {
            if !fresh && !self.nodes[idx as usize].has_children() {
                self.split(idx);
            }
            path.push(idx);
            let slot = child_index(key, level);
            let child = self.nodes[idx as usize].children[slot];
            if child == NO_CHILD {
                let new = self.alloc(0.0);
                self.nodes[idx as usize].children[slot] = new;
                idx = new;
                fresh = true;
            } else {
                idx = child;
                fresh = false;
            }
        }

        let leaf = &mut self.nodes[idx as usize];
        leaf.log_odds = self.model.apply(leaf.log_odds, is_hit);

        for &inner in path.iter().rev() {
            self.refresh_inner(inner);
        }
        Ok(&self.nodes[idx as usize])
    }

    /// [`update_node`][Self::update_node] addressed by world coordinate.
    pub fn update_node_at(&mut self, point: Point3, is_hit: bool) -> Result<&OccupancyNode, MapError> {
        let key = self.space.key_of(point)?;
        self.update_node(key, is_hit)
    }

    // ── Search ──────────────────────────────────────────────────────────────

    /// Find the node holding the occupancy of the voxel at `point`.
    ///
    /// `Ok(None)` means the voxel was never observed.  A collapsed leaf on
    /// the path answers for every voxel beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::OutOfRange`] when `point` is outside the key space.
    pub fn search(&self, point: Point3) -> Result<Option<&OccupancyNode>, MapError> {
        let key = self.space.key_of(point)?;
        Ok(self.search_key(key))
    }

    /// [`search`][Self::search] addressed by key.
    pub fn search_key(&self, key: VoxelKey) -> Option<&OccupancyNode> {
        self.search_at_depth(key, self.space.max_depth())
    }

    /// Search stopping at `depth` (0 = the whole key space, `max_depth` =
    /// finest voxels).  Inner nodes report the max of their children.
    pub fn search_at_depth(&self, key: VoxelKey, depth: u8) -> Option<&OccupancyNode> {
        let root = self.root?;
        let target = self.space.max_depth().saturating_sub(depth);
        if target >= self.root_level {
            // The requested cell encloses the whole root block.
            return (key_at_level(key, target) == key_at_level(self.root_origin, target))
                .then(|| &self.nodes[root as usize]);
        }
        if !self.covers(key) {
            return None;
        }
        let mut node = &self.nodes[root as usize];
        for level in (target..self.root_level).rev() {
            if !node.has_children() {
                return Some(node);
            }
            let child = node.children[child_index(key, level)];
            if child == NO_CHILD {
                return None;
            }
            node = &self.nodes[child as usize];
        }
        Some(node)
    }

    /// Occupied / free / unknown at `point`.
    pub fn classify(&self, point: Point3) -> Result<Occupancy, MapError> {
        Ok(self
            .search(point)?
            .map_or(Occupancy::Unknown, OccupancyNode::occupancy))
    }

    pub fn classify_key(&self, key: VoxelKey) -> Occupancy {
        self.search_key(key)
            .map_or(Occupancy::Unknown, OccupancyNode::occupancy)
    }

    // ── Prune / expand ──────────────────────────────────────────────────────

    /// Collapse every inner node whose eight children are all childless,
    /// agree within `prune_epsilon` and share one classification.
    ///
    /// Returns the number of nodes collapsed.  Running it twice in a row
    /// collapses nothing the second time.
    pub fn prune(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let before = self.node_count();
        let collapsed = self.prune_recursive(root);
        debug!(
            collapsed,
            nodes_before = before,
            nodes_after = self.node_count(),
            "pruned occupancy tree"
        );
        collapsed
    }

    fn prune_recursive(&mut self, idx: u32) -> usize {
        let children = self.nodes[idx as usize].children;
        if children.iter().all(|&c| c == NO_CHILD) {
            return 0;
        }
        let mut collapsed = 0;
        for &c in children.iter().filter(|&&c| c != NO_CHILD) {
            collapsed += self.prune_recursive(c);
        }
        if let Some(value) = self.collapsible_value(&children) {
            for &c in &children {
                self.free.push(c);
            }
            let node = &mut self.nodes[idx as usize];
            node.children = [NO_CHILD; 8];
            node.log_odds = value;
            collapsed += 1;
        } else {
            self.refresh_inner(idx);
        }
        collapsed
    }

    fn collapsible_value(&self, children: &[u32; 8]) -> Option<f32> {
        if children.iter().any(|&c| c == NO_CHILD) {
            return None;
        }
        let first = &self.nodes[children[0] as usize];
        let eps = self.config.prune_epsilon as f32;
        let mergeable = children.iter().all(|&c| {
            let n = &self.nodes[c as usize];
            !n.has_children()
                && (n.log_odds - first.log_odds).abs() <= eps
                && n.occupancy() == first.occupancy()
        });
        mergeable.then_some(first.log_odds)
    }

    /// Split every collapsed leaf down to finest voxels.
    pub fn expand(&mut self) {
        if let Some(root) = self.root {
            self.expand_recursive(root, self.root_level);
        }
    }

    fn expand_recursive(&mut self, idx: u32, level: u8) {
        if level == 0 {
            return;
        }
        if !self.nodes[idx as usize].has_children() {
            self.split(idx);
        }
        let children = self.nodes[idx as usize].children;
        for &c in children.iter().filter(|&&c| c != NO_CHILD) {
            self.expand_recursive(c, level - 1);
        }
    }

    // ── Traversal ───────────────────────────────────────────────────────────

    /// Iterate over every childless node in pre-order, children in slot order.
    pub fn leaves(&self) -> Leaves<'_> {
        let stack = self
            .root
            .map(|r| vec![(r, self.root_level, self.root_origin)])
            .unwrap_or_default();
        Leaves { tree: self, stack }
    }

    /// Minimum and maximum corners of all known space.
    pub fn metric_bounds(&self) -> Option<(Point3, Point3)> {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        let mut any = false;
        for leaf in self.leaves() {
            any = true;
            let min = self.space.cell_min(leaf.key).as_array();
            let size = self.space.cell_size(leaf.level);
            for axis in 0..3 {
                lo[axis] = lo[axis].min(min[axis]);
                hi[axis] = hi[axis].max(min[axis] + size);
            }
        }
        any.then(|| (Point3::from_array(lo), Point3::from_array(hi)))
    }

    // ── Arena internals ─────────────────────────────────────────────────────

    pub(crate) fn alloc(&mut self, log_odds: f32) -> u32 {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = OccupancyNode::new(log_odds);
                idx
            }
            None => {
                self.nodes.push(OccupancyNode::new(log_odds));
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Give a collapsed leaf eight children carrying its value.
    fn split(&mut self, idx: u32) {
        let value = self.nodes[idx as usize].log_odds;
        for slot in 0..8 {
            let child = self.alloc(value);
            self.nodes[idx as usize].children[slot] = child;
        }
    }

    pub(crate) fn refresh_inner(&mut self, idx: u32) {
        let max = self.nodes[idx as usize]
            .children
            .iter()
            .filter(|&&c| c != NO_CHILD)
            .map(|&c| self.nodes[c as usize].log_odds)
            .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))));
        if let Some(max) = max {
            self.nodes[idx as usize].log_odds = max;
        }
    }

    /// Make sure a root exists and covers `key`; returns the root index.
    fn grow_to_cover(&mut self, key: VoxelKey) -> u32 {
        let mut root = match self.root {
            Some(r) => r,
            None => {
                let r = self.alloc(0.0);
                self.root = Some(r);
                self.root_level = 0;
                self.root_origin = key;
                r
            }
        };
        while !self.covers(key) {
            root = self.reroot(root);
        }
        root
    }

    /// Add one level above the current root.  The old root becomes the child
    /// selected by bit `root_level` of its origin; no existing node moves.
    fn reroot(&mut self, old: u32) -> u32 {
        let level = self.root_level;
        let slot = child_index(self.root_origin, level);
        let value = self.nodes[old as usize].log_odds;

        let new_root = self.alloc(value);
        self.nodes[new_root as usize].children[slot] = old;
        self.root = Some(new_root);
        self.root_level = level + 1;
        self.root_origin = key_at_level(self.root_origin, level + 1);
        debug!(level = self.root_level, "rerooted occupancy tree");
        new_root
    }
}

/// Pre-order iterator over the leaves of an [`OccupancyTree`].
pub struct Leaves<'a> {
    tree: &'a OccupancyTree,
    stack: Vec<(u32, u8, VoxelKey)>,
}

impl Iterator for Leaves<'_> {
    type Item = Leaf;

    fn next(&mut self) -> Option<Leaf> {
        while let Some((idx, level, origin)) = self.stack.pop() {
            let node = &self.tree.nodes[idx as usize];
            if !node.has_children() {
                return Some(Leaf {
                    key: origin,
                    level,
                    log_odds: node.log_odds,
                });
            }
            for slot in (0..8).rev() {
                let c = node.children[slot];
                if c != NO_CHILD {
                    self.stack
                        .push((c, level - 1, child_origin(origin, slot, level - 1)));
                }
            }
        }
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(resolution: f64) -> OccupancyTree {
        OccupancyTree::with_resolution(resolution).unwrap()
    }

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    // ── basic update / search ────────────────────────────────────────────────

    #[test]
    fn empty_tree_knows_nothing() {
        let t = tree(0.1);
        assert!(t.is_empty());
        assert_eq!(t.node_count(), 0);
        assert!(t.search(p(0.0, 0.0, 0.0)).unwrap().is_none());
        assert_eq!(t.classify(p(1.0, 2.0, 3.0)).unwrap(), Occupancy::Unknown);
        assert!(t.metric_bounds().is_none());
    }

    #[test]
    fn single_hit_is_occupied() {
        let mut t = tree(0.1);
        let node = t.update_node_at(p(1.0, 1.0, 1.0), true).unwrap();
        assert!(node.is_occupied());
        assert_eq!(t.classify(p(1.0, 1.0, 1.0)).unwrap(), Occupancy::Occupied);
        assert_eq!(t.classify(p(5.0, 5.0, 5.0)).unwrap(), Occupancy::Unknown);
    }

    #[test]
    fn single_miss_is_free() {
        let mut t = tree(0.1);
        t.update_node_at(p(-2.0, 0.3, 0.0), false).unwrap();
        assert_eq!(t.classify(p(-2.0, 0.3, 0.0)).unwrap(), Occupancy::Free);
    }

    #[test]
    fn neighbour_of_observed_voxel_is_unknown() {
        let mut t = tree(0.1);
        t.update_node_at(p(0.05, 0.05, 0.05), true).unwrap();
        assert_eq!(t.classify(p(0.15, 0.05, 0.05)).unwrap(), Occupancy::Unknown);
    }

    #[test]
    fn out_of_range_update_is_rejected() {
        let mut t = tree(0.1);
        let err = t.update_node_at(p(1.0e6, 0.0, 0.0), true).unwrap_err();
        assert!(matches!(err, MapError::OutOfRange { .. }));
        assert!(t.is_empty());
        assert!(t.search(p(0.0, -1.0e6, 0.0)).is_err());
    }

    #[test]
    fn raw_key_outside_space_is_rejected() {
        let mut t = tree(0.1);
        let err = t.update_node(VoxelKey::new(1 << 16, 0, 0), true).unwrap_err();
        assert!(matches!(err, MapError::OutOfRange { .. }));
    }

    #[test]
    fn hit_and_miss_counts_follow_log_odds_sum() {
        let cfg = TreeConfig {
            prob_hit: 0.7,
            prob_miss: 0.4,
            ..TreeConfig::with_resolution(0.1)
        };
        let model = SensorModel::from_config(&cfg);
        for (hits, misses) in [(1, 0), (1, 1), (1, 2), (1, 3), (2, 4), (3, 7), (0, 1)] {
            let mut t = OccupancyTree::new(cfg.clone()).unwrap();
            let key = t.key_space().key_of(p(0.3, 0.3, 0.3)).unwrap();
            let mut expected = 0.0f32;
            for _ in 0..hits {
                t.update_node(key, true).unwrap();
                expected = model.apply(expected, true);
            }
            for _ in 0..misses {
                t.update_node(key, false).unwrap();
                expected = model.apply(expected, false);
            }
            let node = t.search_key(key).unwrap();
            assert_eq!(node.log_odds(), expected);
            assert_eq!(
                node.is_occupied(),
                expected > 0.0,
                "hits={hits} misses={misses}"
            );
        }
    }

    #[test]
    fn values_stay_within_clamp() {
        let mut t = tree(0.1);
        for _ in 0..200 {
            t.update_node_at(p(0.0, 0.0, 0.0), true).unwrap();
        }
        let l = t.search(p(0.0, 0.0, 0.0)).unwrap().unwrap().log_odds();
        assert_eq!(l, 3.5);
    }

    // ── reroot ───────────────────────────────────────────────────────────────

    #[test]
    fn first_update_creates_single_voxel_root() {
        let mut t = tree(0.1);
        t.update_node_at(p(0.0, 0.0, 0.0), true).unwrap();
        assert_eq!(t.root_level(), 0);
        assert_eq!(t.node_count(), 1);
    }

    #[test]
    fn reroot_preserves_existing_values() {
        let mut t = tree(0.1);
        let a = p(0.05, 0.05, 0.05);
        t.update_node_at(a, true).unwrap();
        t.update_node_at(a, true).unwrap();
        let before = t.search(a).unwrap().unwrap().log_odds();

        // Far point forces several reroots.
        t.update_node_at(p(-40.0, 12.0, 3.3), false).unwrap();
        assert!(t.root_level() > 5);
        assert_eq!(t.search(a).unwrap().unwrap().log_odds(), before);
        assert_eq!(t.classify(p(-40.0, 12.0, 3.3)).unwrap(), Occupancy::Free);
    }

    #[test]
    fn root_block_stays_aligned() {
        let mut t = tree(0.1);
        t.update_node_at(p(3.0, -7.0, 1.0), true).unwrap();
        t.update_node_at(p(-9.0, 2.0, 0.5), true).unwrap();
        let level = t.root_level();
        let origin = t.root_origin();
        assert_eq!(key_at_level(origin, level), origin);
        let k1 = t.key_space().key_of(p(3.0, -7.0, 1.0)).unwrap();
        let k2 = t.key_space().key_of(p(-9.0, 2.0, 0.5)).unwrap();
        assert!(t.covers(k1) && t.covers(k2));
    }

    #[test]
    fn tree_grows_up_to_full_key_space() {
        let cfg = TreeConfig {
            max_extent: 1.6,
            ..TreeConfig::with_resolution(0.1)
        };
        let mut t = OccupancyTree::new(cfg).unwrap();
        assert_eq!(t.key_space().max_depth(), 4);
        t.update_node_at(p(-0.75, -0.75, -0.75), true).unwrap();
        t.update_node_at(p(0.79, 0.79, 0.79), true).unwrap();
        assert_eq!(t.root_level(), 4);
        assert_eq!(t.root_origin(), VoxelKey::new(0, 0, 0));
        assert!(t.update_node_at(p(0.8, 0.0, 0.0), true).is_err());
    }

    #[test]
    fn inner_nodes_hold_max_of_children() {
        let mut t = tree(0.1);
        t.update_node_at(p(0.05, 0.05, 0.05), false).unwrap();
        t.update_node_at(p(0.15, 0.05, 0.05), true).unwrap();
        let root = t.node(t.root_id().unwrap()).unwrap();
        let hit = t.search(p(0.15, 0.05, 0.05)).unwrap().unwrap().log_odds();
        assert_eq!(root.log_odds(), hit);
    }

    #[test]
    fn coarse_search_reports_enclosing_node() {
        let mut t = tree(0.1);
        t.update_node_at(p(0.05, 0.05, 0.05), true).unwrap();
        t.update_node_at(p(0.15, 0.05, 0.05), false).unwrap();
        let key = t.key_space().key_of(p(0.05, 0.05, 0.05)).unwrap();
        let depth = t.key_space().max_depth();
        let coarse = t.search_at_depth(key, depth - 1).unwrap();
        assert!(coarse.has_children());
        assert!(coarse.is_occupied());
        // Whole key space at depth 0.
        assert!(t.search_at_depth(key, 0).is_some());
    }

    // ── prune / expand ───────────────────────────────────────────────────────

    fn fill_block(t: &mut OccupancyTree, is_hit: bool) {
        // Eight voxels of one level-1 block at resolution 1.0 around (0.5..1.5).
        for x in [0.5, 1.5] {
            for y in [0.5, 1.5] {
                for z in [0.5, 1.5] {
                    t.update_node_at(p(x, y, z), is_hit).unwrap();
                }
            }
        }
    }

    #[test]
    fn prune_collapses_identical_siblings() {
        let mut t = tree(1.0);
        fill_block(&mut t, true);
        let before = t.node_count();
        let collapsed = t.prune();
        assert!(collapsed >= 1);
        assert_eq!(t.node_count(), before - 8);
        for x in [0.5, 1.5] {
            assert_eq!(t.classify(p(x, 1.5, 0.5)).unwrap(), Occupancy::Occupied);
        }
        // Voxels outside the block remain unknown.
        assert_eq!(t.classify(p(2.5, 0.5, 0.5)).unwrap(), Occupancy::Unknown);
    }

    #[test]
    fn prune_is_idempotent() {
        let mut t = tree(1.0);
        fill_block(&mut t, false);
        t.prune();
        let nodes = t.node_count();
        assert_eq!(t.prune(), 0);
        assert_eq!(t.node_count(), nodes);
    }

    #[test]
    fn prune_keeps_mixed_blocks() {
        let mut t = tree(1.0);
        fill_block(&mut t, true);
        t.update_node_at(p(0.5, 0.5, 0.5), false).unwrap();
        t.update_node_at(p(0.5, 0.5, 0.5), false).unwrap();
        t.update_node_at(p(0.5, 0.5, 0.5), false).unwrap();
        let before = t.node_count();
        assert_eq!(t.prune(), 0);
        assert_eq!(t.node_count(), before);
    }

    #[test]
    fn prune_with_epsilon_merges_close_values() {
        let cfg = TreeConfig {
            prune_epsilon: 1.0,
            ..TreeConfig::with_resolution(1.0)
        };
        let mut t = OccupancyTree::new(cfg).unwrap();
        fill_block(&mut t, true);
        t.update_node_at(p(1.5, 1.5, 1.5), true).unwrap();
        assert!(t.prune() >= 1);
        assert_eq!(t.classify(p(1.5, 1.5, 1.5)).unwrap(), Occupancy::Occupied);
    }

    #[test]
    fn prune_never_merges_across_classification() {
        let cfg = TreeConfig {
            prune_epsilon: 10.0,
            ..TreeConfig::with_resolution(1.0)
        };
        let mut t = OccupancyTree::new(cfg).unwrap();
        fill_block(&mut t, true);
        for _ in 0..4 {
            t.update_node_at(p(0.5, 1.5, 0.5), false).unwrap();
        }
        t.prune();
        assert_eq!(t.classify(p(0.5, 1.5, 0.5)).unwrap(), Occupancy::Free);
        assert_eq!(t.classify(p(1.5, 1.5, 0.5)).unwrap(), Occupancy::Occupied);
    }

    #[test]
    fn update_inside_collapsed_leaf_splits_it() {
        let mut t = tree(1.0);
        fill_block(&mut t, true);
        t.prune();
        for _ in 0..5 {
            t.update_node_at(p(0.5, 0.5, 0.5), false).unwrap();
        }
        assert_eq!(t.classify(p(0.5, 0.5, 0.5)).unwrap(), Occupancy::Free);
        assert_eq!(t.classify(p(1.5, 0.5, 0.5)).unwrap(), Occupancy::Occupied);
        assert_eq!(t.classify(p(1.5, 1.5, 1.5)).unwrap(), Occupancy::Occupied);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut t = tree(1.0);
        fill_block(&mut t, true);
        t.prune();
        let arena = t.nodes.len();
        t.update_node_at(p(0.5, 0.5, 0.5), false).unwrap();
        assert_eq!(t.nodes.len(), arena);
    }

    #[test]
    fn expand_restores_finest_leaves() {
        let mut t = tree(1.0);
        fill_block(&mut t, true);
        let leaves_before = t.leaf_count();
        t.prune();
        assert!(t.leaf_count() < leaves_before);
        t.expand();
        assert_eq!(t.leaf_count(), leaves_before);
        assert!(t.leaves().all(|l| l.level == 0));
    }

    // ── traversal ────────────────────────────────────────────────────────────

    #[test]
    fn leaves_report_keys_and_values() {
        let mut t = tree(0.1);
        let points = [p(0.0, 0.0, 0.0), p(1.0, -1.0, 0.5), p(-3.0, 2.0, 0.0)];
        for &pt in &points {
            t.update_node_at(pt, true).unwrap();
        }
        let leaves: Vec<Leaf> = t.leaves().collect();
        assert_eq!(leaves.len(), points.len());
        for &pt in &points {
            let key = t.key_space().key_of(pt).unwrap();
            assert!(leaves.iter().any(|l| l.key == key && l.level == 0));
        }
        assert!(leaves.iter().all(|l| l.occupancy() == Occupancy::Occupied));
    }

    #[test]
    fn metric_bounds_enclose_known_space() {
        let mut t = tree(0.5);
        t.update_node_at(p(0.1, 0.1, 0.1), true).unwrap();
        t.update_node_at(p(-0.9, 1.2, 0.1), false).unwrap();
        let (lo, hi) = t.metric_bounds().unwrap();
        assert_eq!(lo, p(-1.0, 0.0, 0.0));
        assert_eq!(hi, p(0.5, 1.5, 0.5));
    }

    #[test]
    fn clear_resets_tree() {
        let mut t = tree(0.1);
        t.update_node_at(p(1.0, 1.0, 1.0), true).unwrap();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.classify(p(1.0, 1.0, 1.0)).unwrap(), Occupancy::Unknown);
        assert!(t.memory_usage() >= std::mem::size_of::<OccupancyTree>());
    }

    #[test]
    fn child_mask_matches_children() {
        let mut t = tree(1.0);
        t.update_node_at(p(0.5, 0.5, 0.5), true).unwrap();
        t.update_node_at(p(1.5, 0.5, 0.5), true).unwrap();
        let root = t.node(t.root_id().unwrap()).unwrap();
        assert_eq!(root.child_mask().count_ones(), 2);
        assert!(root.child(8).is_none());
    }
}
