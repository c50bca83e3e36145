//! Ray traversal through the voxel key space.
//!
//! Uses the 3-D DDA of Amanatides & Woo: per axis we track the ray distance
//! to the next voxel face (`t_max`) and always step along the axis whose face
//! is nearest.  Face distances are recomputed from the integer key on every
//! step instead of accumulated, so rounding never builds up along the ray.
//! Every voxel the ray passes through is visited once, in order.
//!
//! A segment's end voxel is the last voxel it overlaps with positive
//! length, so an endpoint lying exactly on a face belongs to the voxel the
//! ray arrives from.

use voxmap_types::{MapError, Point3, VoxelKey};

use crate::key_space::KeySpace;
use crate::tree::OccupancyTree;

/// Voxels crossed by a sensor ray.
#[derive(Debug, Clone, PartialEq)]
pub struct RayKeys {
    /// Voxels strictly before the end voxel, origin first.
    pub free: Vec<VoxelKey>,
    /// Voxel holding the end of the ray.
    pub end: VoxelKey,
}

/// Incremental voxel walker along a normalised direction.
#[derive(Debug, Clone)]
pub(crate) struct Dda<'a> {
    space: &'a KeySpace,
    origin: [f64; 3],
    dir: [f64; 3],
    current: [i64; 3],
    step: [i64; 3],
    t_max: [f64; 3],
}

impl<'a> Dda<'a> {
    /// `dir` must be normalised; `origin` must be inside the key space.
    pub(crate) fn new(space: &'a KeySpace, origin: Point3, dir: [f64; 3]) -> Result<Self, MapError> {
        let start = space.key_of(origin)?;
        let mut dda = Self {
            space,
            origin: origin.as_array(),
            dir,
            current: start.as_array().map(i64::from),
            step: dir.map(|d| if d > 0.0 { 1 } else if d < 0.0 { -1 } else { 0 }),
            t_max: [f64::INFINITY; 3],
        };
        for axis in 0..3 {
            dda.t_max[axis] = dda.face_distance(axis);
        }
        Ok(dda)
    }

    /// Ray distance to the face the walker crosses next along `axis`.
    fn face_distance(&self, axis: usize) -> f64 {
        let k = self.current[axis];
        let face = match self.step[axis] {
            1 => k + 1,
            -1 => k,
            _ => return f64::INFINITY,
        };
        // `face` lies in 0..=2^30, so it fits the key type.
        (self.space.axis_lower(face as u32) - self.origin[axis]) / self.dir[axis]
    }

    pub(crate) fn key(&self) -> VoxelKey {
        VoxelKey::new(
            self.current[0] as u32,
            self.current[1] as u32,
            self.current[2] as u32,
        )
    }

    /// Ray distance at which the walker leaves the current voxel.
    pub(crate) fn exit_distance(&self) -> f64 {
        self.t_max[self.nearest_axis()]
    }

    fn nearest_axis(&self) -> usize {
        if self.t_max[0] < self.t_max[1] {
            if self.t_max[0] < self.t_max[2] { 0 } else { 2 }
        } else if self.t_max[1] < self.t_max[2] {
            1
        } else {
            2
        }
    }

    /// Move into the next voxel.  `false` when that voxel would leave the
    /// key space (the walker is left unchanged).
    pub(crate) fn advance(&mut self) -> bool {
        let axis = self.nearest_axis();
        let next = self.current[axis] + self.step[axis];
        if next < 0 || next as u64 >= self.space.keys_per_axis() {
            return false;
        }
        self.current[axis] = next;
        self.t_max[axis] = self.face_distance(axis);
        true
    }
}

fn normalised(from: Point3, to: Point3) -> Option<([f64; 3], f64)> {
    let d = [to.x - from.x, to.y - from.y, to.z - from.z];
    let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
    if len > 0.0 && len.is_finite() {
        Some(([d[0] / len, d[1] / len, d[2] / len], len))
    } else {
        None
    }
}

/// Key of the voxel a segment `origin -> end` finishes in.
///
/// Same as `key_of(end)`, except that an end coordinate lying exactly on a
/// lower face, reached while travelling upwards on that axis, belongs to the
/// voxel below: the segment never enters the voxel above with positive length.
fn arrival_key(space: &KeySpace, origin: Point3, end: Point3) -> Result<VoxelKey, MapError> {
    let mut key = space.key_of(end)?.as_array();
    let (o, e) = (origin.as_array(), end.as_array());
    for axis in 0..3 {
        if e[axis] > o[axis] && key[axis] > 0 && space.axis_lower(key[axis]) == e[axis] {
            key[axis] -= 1;
        }
    }
    Ok(VoxelKey::from_array(key))
}

/// Trace the segment `origin -> end` through the key space.
///
/// The walk stops on the end voxel, so `free` never contains it.
///
/// # Errors
///
/// Returns [`MapError::OutOfRange`] when either endpoint lies outside the
/// representable volume.
pub fn trace_ray(space: &KeySpace, origin: Point3, end: Point3) -> Result<RayKeys, MapError> {
    let start_key = space.key_of(origin)?;
    let end_key = arrival_key(space, origin, end)?;
    let Some((dir, length)) = normalised(origin, end) else {
        return Ok(RayKeys {
            free: Vec::new(),
            end: start_key,
        });
    };

    // Face crossings are bounded by the key distance; the slack absorbs
    // rounding on faces the segment only grazes.
    let budget = start_key
        .as_array()
        .iter()
        .zip(end_key.as_array())
        .map(|(a, b)| a.abs_diff(b) as usize)
        .sum::<usize>()
        + 3;

    let mut dda = Dda::new(space, origin, dir)?;
    let mut free = Vec::with_capacity(budget);
    while dda.key() != end_key && dda.exit_distance() < length && free.len() < budget {
        let here = dda.key();
        if !dda.advance() {
            return Err(MapError::out_of_range(end));
        }
        free.push(here);
    }
    Ok(RayKeys { free, end: end_key })
}

/// Keys of every voxel crossed between `origin` and `end`, end voxel
/// excluded, in order from the origin.
pub fn compute_ray_keys(space: &KeySpace, origin: Point3, end: Point3) -> Result<Vec<VoxelKey>, MapError> {
    Ok(trace_ray(space, origin, end)?.free)
}

/// Walk from `origin` along `direction` to the first occupied voxel and
/// return its centre.
///
/// Returns `Ok(None)` when the walk reaches unknown space (unless
/// `ignore_unknown`), passes `max_range`, leaves the representable volume,
/// or `direction` is zero.
///
/// # Errors
///
/// Returns [`MapError::OutOfRange`] when `origin` is outside the volume.
pub fn cast_ray(
    tree: &OccupancyTree,
    origin: Point3,
    direction: Point3,
    ignore_unknown: bool,
    max_range: Option<f64>,
) -> Result<Option<Point3>, MapError> {
    let space = tree.key_space();
    let Some((dir, _)) = normalised(Point3::origin(), direction) else {
        space.key_of(origin)?;
        return Ok(None);
    };
    let mut dda = Dda::new(space, origin, dir)?;
    let mut travelled = 0.0;
    loop {
        if let Some(range) = max_range
            && travelled > range
        {
            return Ok(None);
        }
        match tree.search_key(dda.key()) {
            Some(node) if node.is_occupied() => return Ok(Some(space.coord_of(dda.key()))),
            None if !ignore_unknown => return Ok(None),
            _ => {}
        }
        travelled = dda.exit_distance();
        if !dda.advance() {
            return Ok(None);
        }
    }
}
