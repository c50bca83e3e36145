//! Structural tree assembly for decoders.
//!
//! [`TreeBuilder`] lets a deserializer recreate a tree node by node without
//! touching the arena directly.  Every call is checked, so malformed input
//! surfaces as [`MapError::CorruptFormat`] instead of a broken tree.

use voxmap_types::{MapError, TreeConfig, VoxelKey};

use crate::key_space::key_at_level;
use crate::tree::{NO_CHILD, NodeId, OccupancyTree};

/// Incrementally assembles an [`OccupancyTree`] from its pre-order structure.
#[derive(Debug)]
pub struct TreeBuilder {
    tree: OccupancyTree,
    levels: Vec<u8>,
}

fn corrupt(msg: impl Into<String>) -> MapError {
    MapError::CorruptFormat(msg.into())
}

impl TreeBuilder {
    /// Start an empty tree with `config`.
    pub fn new(config: TreeConfig) -> Result<Self, MapError> {
        Ok(Self {
            tree: OccupancyTree::new(config)?,
            levels: Vec::new(),
        })
    }

    /// Create the root node covering the block at `origin` of size
    /// `2^level`.  Its log-odds is recomputed by [`finish`][Self::finish]
    /// when it ends up with children.
    pub fn root(&mut self, level: u8, origin: VoxelKey, log_odds: f32) -> Result<NodeId, MapError> {
        if self.tree.root.is_some() {
            return Err(corrupt("tree already has a root"));
        }
        let space = self.tree.key_space();
        if level > space.max_depth() {
            return Err(corrupt(format!(
                "root level {level} exceeds max depth {}",
                space.max_depth()
            )));
        }
        if !space.contains_key(origin) || key_at_level(origin, level) != origin {
            return Err(corrupt(format!(
                "root origin {origin:?} is not aligned to level {level}"
            )));
        }
        self.check_value(log_odds)?;
        let idx = self.tree.alloc(log_odds);
        self.levels.push(level);
        self.tree.root = Some(idx);
        self.tree.root_level = level;
        self.tree.root_origin = origin;
        Ok(NodeId(idx))
    }

    /// Attach a new child in slot `slot` of `parent`.
    pub fn child(&mut self, parent: NodeId, slot: usize, log_odds: f32) -> Result<NodeId, MapError> {
        let parent_level = *self
            .levels
            .get(parent.0 as usize)
            .ok_or_else(|| corrupt("unknown parent node"))?;
        if parent_level == 0 {
            return Err(corrupt("finest-level node cannot have children"));
        }
        if slot >= 8 {
            return Err(corrupt(format!("child slot {slot} out of range")));
        }
        if self.tree.nodes[parent.0 as usize].children[slot] != NO_CHILD {
            return Err(corrupt(format!("child slot {slot} assigned twice")));
        }
        self.check_value(log_odds)?;
        let idx = self.tree.alloc(log_odds);
        self.levels.push(parent_level - 1);
        self.tree.nodes[parent.0 as usize].children[slot] = idx;
        Ok(NodeId(idx))
    }

    /// Recompute inner values bottom-up and hand the tree over.
    pub fn finish(mut self) -> OccupancyTree {
        // Children always come after their parent in the arena.
        for idx in (0..self.tree.nodes.len()).rev() {
            if self.tree.nodes[idx].has_children() {
                self.tree.refresh_inner(idx as u32);
            }
        }
        self.tree
    }

    fn check_value(&self, log_odds: f32) -> Result<(), MapError> {
        if self.tree.sensor_model().in_bounds(log_odds) {
            Ok(())
        } else {
            Err(corrupt(format!(
                "log-odds {log_odds} outside the clamping bounds"
            )))
        }
    }
}
