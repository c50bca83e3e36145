//! Voxel key space.
//!
//! Maps continuous world coordinates to discrete [`VoxelKey`]s at the tree's
//! finest resolution and back.  Per axis, key `k` covers the half-open
//! interval `[(k - o) * res, (k - o + 1) * res)` with `o = 2^(max_depth - 1)`,
//! so the world origin sits on the corner shared by the eight central voxels.
//!
//! ```rust
//! use voxmap_octree::key_space::KeySpace;
//! use voxmap_types::Point3;
//!
//! let space = KeySpace::new(0.1, 16).unwrap();
//! let key = space.key_of(Point3::new(1.0, 1.0, 1.0)).unwrap();
//! assert_eq!(space.key_of(space.coord_of(key)).unwrap(), key);
//! ```

use voxmap_types::{MAX_TREE_DEPTH, MapError, Point3, TreeConfig, VoxelKey};

/// Resolution and depth of a tree's discrete coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySpace {
    resolution: f64,
    max_depth: u8,
    offset: u32,
}

impl KeySpace {
    /// Create a key space.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidConfig`] for a non-positive resolution or a
    /// depth outside `1..=30`.
    pub fn new(resolution: f64, max_depth: u8) -> Result<Self, MapError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "resolution must be positive and finite, got {resolution}"
            )));
        }
        if max_depth == 0 || max_depth > MAX_TREE_DEPTH {
            return Err(MapError::InvalidConfig(format!(
                "max_depth must lie in 1..={MAX_TREE_DEPTH}, got {max_depth}"
            )));
        }
        Ok(Self {
            resolution,
            max_depth,
            offset: 1 << (max_depth - 1),
        })
    }

    /// Validate `config` and build the matching key space.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidConfig`] when `config` fails validation.
    pub fn from_config(config: &TreeConfig) -> Result<Self, MapError> {
        let depth = config.validate()?;
        Self::new(config.resolution, depth)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Number of finest-level keys per axis (`2^max_depth`).
    pub fn keys_per_axis(&self) -> u64 {
        1u64 << self.max_depth
    }

    /// Edge length of a cell at `level` (0 = finest).
    pub fn cell_size(&self, level: u8) -> f64 {
        self.resolution * (1u64 << level) as f64
    }

    /// True when every component of `key` lies inside the key space.
    pub fn contains_key(&self, key: VoxelKey) -> bool {
        let limit = self.keys_per_axis();
        key.as_array().iter().all(|&k| u64::from(k) < limit)
    }

    /// Discretise a single axis value; `None` outside the representable range.
    ///
    /// The result always satisfies `axis_lower(k) <= c < axis_lower(k + 1)`.
    pub fn axis_key(&self, c: f64) -> Option<u32> {
        let mut cell = (c / self.resolution).floor();
        if !cell.is_finite() {
            return None;
        }
        // The quotient can round across a face; the faces themselves decide.
        if cell * self.resolution > c {
            cell -= 1.0;
        } else if (cell + 1.0) * self.resolution <= c {
            cell += 1.0;
        }
        let half = f64::from(self.offset);
        if cell < -half || cell >= half {
            return None;
        }
        Some((cell as i64 + i64::from(self.offset)) as u32)
    }

    /// Centre of the finest cell `k` along one axis.
    pub fn axis_center(&self, k: u32) -> f64 {
        (f64::from(k) - f64::from(self.offset) + 0.5) * self.resolution
    }

    /// Lower face of the finest cell `k` along one axis.
    pub fn axis_lower(&self, k: u32) -> f64 {
        (f64::from(k) - f64::from(self.offset)) * self.resolution
    }

    /// Key of the finest voxel containing `point`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::OutOfRange`] when the point is not finite or lies
    /// outside the volume covered by `max_depth` levels.
    pub fn key_of(&self, point: Point3) -> Result<VoxelKey, MapError> {
        if !point.is_finite() {
            return Err(MapError::out_of_range(point));
        }
        match (
            self.axis_key(point.x),
            self.axis_key(point.y),
            self.axis_key(point.z),
        ) {
            (Some(x), Some(y), Some(z)) => Ok(VoxelKey::new(x, y, z)),
            _ => Err(MapError::out_of_range(point)),
        }
    }

    /// Centre of the finest voxel addressed by `key`.
    pub fn coord_of(&self, key: VoxelKey) -> Point3 {
        Point3::new(
            self.axis_center(key.x),
            self.axis_center(key.y),
            self.axis_center(key.z),
        )
    }

    /// Minimum corner of the finest cell addressed by `key`.
    pub fn cell_min(&self, key: VoxelKey) -> Point3 {
        Point3::new(
            self.axis_lower(key.x),
            self.axis_lower(key.y),
            self.axis_lower(key.z),
        )
    }

    /// Centre of the cell at `level` that contains `key`.
    pub fn cell_center(&self, key: VoxelKey, level: u8) -> Point3 {
        let base = key_at_level(key, level);
        let half = self.cell_size(level) * 0.5;
        let min = self.cell_min(base);
        Point3::new(min.x + half, min.y + half, min.z + half)
    }
}

/// Clear the lowest `level` bits of every axis, giving the first finest key
/// of the enclosing cell at that level.
pub fn key_at_level(key: VoxelKey, level: u8) -> VoxelKey {
    if level == 0 {
        return key;
    }
    let mask = if level >= 32 { 0 } else { u32::MAX << level };
    VoxelKey::new(key.x & mask, key.y & mask, key.z & mask)
}

/// Index (0..8) of the child that contains `key` below a node whose children
/// sit at `level`.
pub fn child_index(key: VoxelKey, level: u8) -> usize {
    let bit = |k: u32| ((k >> level) & 1) as usize;
    bit(key.x) | (bit(key.y) << 1) | (bit(key.z) << 2)
}

/// First key of child `index` of a node whose first key is `origin`, with
/// children at `level`.
pub fn child_origin(origin: VoxelKey, index: usize, level: u8) -> VoxelKey {
    let offset = |axis: usize| (((index >> axis) & 1) as u32) << level;
    VoxelKey::new(
        origin.x | offset(0),
        origin.y | offset(1),
        origin.z | offset(2),
    )
}
