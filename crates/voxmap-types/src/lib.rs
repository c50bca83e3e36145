use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest tree the key space supports; keeps every key inside a `u32`.
pub const MAX_TREE_DEPTH: u8 = 30;

/// A point in 3-D world space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Discrete address of a voxel at the finest tree resolution.
///
/// Keys are unsigned: the key space shifts world coordinates by half the
/// representable range so that the world origin sits in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VoxelKey {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl VoxelKey {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [u32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// Tri-state classification of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    /// Occupancy probability above 0.5.
    Occupied,
    /// Occupancy probability below 0.5.
    Free,
    /// Never observed, or observed at exactly 0.5.
    Unknown,
}

impl Occupancy {
    /// Classify a log-odds value against the 0.5 probability threshold.
    pub fn from_log_odds(log_odds: f32) -> Self {
        if log_odds > 0.0 {
            Occupancy::Occupied
        } else if log_odds < 0.0 {
            Occupancy::Free
        } else {
            Occupancy::Unknown
        }
    }
}

impl std::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Occupancy::Occupied => write!(f, "occupied"),
            Occupancy::Free => write!(f, "free"),
            Occupancy::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single sensor return, optionally paired with the sensor position it was
/// taken from.  Without an origin only the endpoint is updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Point3,
    #[serde(default)]
    pub origin: Option<Point3>,
}

impl Observation {
    pub fn hit(point: Point3) -> Self {
        Self { point, origin: None }
    }

    pub fn ray(origin: Point3, point: Point3) -> Self {
        Self {
            point,
            origin: Some(origin),
        }
    }
}

/// Construction parameters for an occupancy tree.
///
/// `clamp_min` and `clamp_max` are log-odds bounds; the probabilities are in
/// `(0, 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Edge length of a finest-level voxel.
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Probability that a cell is occupied given a hit.
    #[serde(default = "default_prob_hit")]
    pub prob_hit: f64,

    /// Probability that a cell is occupied given a pass-through.
    #[serde(default = "default_prob_miss")]
    pub prob_miss: f64,

    #[serde(default = "default_clamp_min")]
    pub clamp_min: f64,

    #[serde(default = "default_clamp_max")]
    pub clamp_max: f64,

    /// Edge length of the largest volume the tree may grow to cover.
    #[serde(default = "default_max_extent")]
    pub max_extent: f64,

    /// Sibling leaves whose log-odds differ by at most this much are merged
    /// by pruning.
    #[serde(default)]
    pub prune_epsilon: f64,
}

fn default_resolution() -> f64 {
    0.1
}
fn default_prob_hit() -> f64 {
    0.7
}
fn default_prob_miss() -> f64 {
    0.4
}
fn default_clamp_min() -> f64 {
    -2.0
}
fn default_clamp_max() -> f64 {
    3.5
}
fn default_max_extent() -> f64 {
    6553.6
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            prob_hit: default_prob_hit(),
            prob_miss: default_prob_miss(),
            clamp_min: default_clamp_min(),
            clamp_max: default_clamp_max(),
            max_extent: default_max_extent(),
            prune_epsilon: 0.0,
        }
    }
}

impl TreeConfig {
    /// Default parameters at the given resolution.
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    /// Check every parameter and return the derived tree depth.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<u8, MapError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "resolution must be positive and finite, got {}",
                self.resolution
            )));
        }
        for (name, p) in [("prob_hit", self.prob_hit), ("prob_miss", self.prob_miss)] {
            if !(p > 0.0 && p < 1.0) {
                return Err(MapError::InvalidConfig(format!(
                    "{name} must lie in (0, 1), got {p}"
                )));
            }
        }
        if !(self.clamp_min.is_finite() && self.clamp_max.is_finite()) {
            return Err(MapError::InvalidConfig("clamp bounds must be finite".to_string()));
        }
        if self.clamp_min >= self.clamp_max {
            return Err(MapError::InvalidConfig(format!(
                "clamp_min ({}) must be below clamp_max ({})",
                self.clamp_min, self.clamp_max
            )));
        }
        if !(self.prune_epsilon.is_finite() && self.prune_epsilon >= 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "prune_epsilon must be non-negative, got {}",
                self.prune_epsilon
            )));
        }
        self.max_depth()
    }

    /// `ceil(log2(max_extent / resolution))`, at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidConfig`] when the extent is not finite or
    /// the depth would exceed [`MAX_TREE_DEPTH`].
    pub fn max_depth(&self) -> Result<u8, MapError> {
        let ratio = self.max_extent / self.resolution;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "max_extent must be positive and finite, got {}",
                self.max_extent
            )));
        }
        // Absorb rounding noise when the ratio is a power of two.
        let depth = (ratio.log2() - 1e-9).ceil().max(1.0);
        if depth > f64::from(MAX_TREE_DEPTH) {
            return Err(MapError::InvalidConfig(format!(
                "max_extent / resolution needs depth {depth}, limit is {MAX_TREE_DEPTH}"
            )));
        }
        Ok(depth as u8)
    }
}

/// Error taxonomy shared by the tree, the insertion engine and the codec.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("Coordinate ({x}, {y}, {z}) is outside the representable volume")]
    OutOfRange { x: f64, y: f64, z: f64 },

    #[error("Invalid tree configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt map data: {0}")]
    CorruptFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapError {
    pub fn out_of_range(p: Point3) -> Self {
        MapError::OutOfRange {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}
