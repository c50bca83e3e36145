//! Point and ray insertion.
//!
//! Turns [`Observation`]s into hit/miss updates on an [`OccupancyTree`].
//! Without a sensor origin a point is a single hit; with one, the voxels
//! between origin and point are carved free and the end voxel is marked hit.

use std::collections::HashSet;

use tracing::debug;
use voxmap_types::{MapError, Observation, Point3, VoxelKey};

use crate::ray::trace_ray;
use crate::tree::OccupancyTree;

/// Counts of the updates applied by [`insert_scan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub hits: usize,
    pub misses: usize,
}

/// Insert one point, optionally carving the ray from `origin`.
///
/// # Errors
///
/// Returns [`MapError::OutOfRange`] when the point (or origin) is outside the
/// representable volume.  With an origin the ray is traced before any update,
/// so a failing ray leaves the tree untouched.
pub fn insert_point(tree: &mut OccupancyTree, point: Point3, origin: Option<Point3>) -> Result<(), MapError> {
    let Some(origin) = origin else {
        tree.update_node_at(point, true)?;
        return Ok(());
    };
    let ray = trace_ray(tree.key_space(), origin, point)?;
    for &key in &ray.free {
        tree.update_node(key, false)?;
    }
    tree.update_node(ray.end, true)?;
    Ok(())
}

/// Insert a single [`Observation`].
///
/// # Errors
///
/// Same as [`insert_point`].
pub fn insert_observation(tree: &mut OccupancyTree, observation: &Observation) -> Result<(), MapError> {
    insert_point(tree, observation.point, observation.origin)
}

/// Insert every point in order, all sharing `origin`.
///
/// Returns the number of points applied.
///
/// # Errors
///
/// Stops at the first point [`insert_point`] rejects and returns its error;
/// updates from earlier points stay in the tree.
pub fn insert_point_cloud<I>(tree: &mut OccupancyTree, points: I, origin: Option<Point3>) -> Result<usize, MapError>
where
    I: IntoIterator<Item = Point3>,
{
    let mut applied = 0;
    for point in points {
        insert_point(tree, point, origin)?;
        applied += 1;
    }
    debug!(applied, carved = origin.is_some(), "inserted point cloud");
    Ok(applied)
}

/// Insert a full sensor scan taken from `origin`, updating each voxel once.
///
/// Voxels holding an endpoint get one hit and no misses, however many rays
/// cross them; every other crossed voxel gets one miss.  Points farther than
/// `max_range` are cut at that range and only carve free space.  All rays
/// are traced before the tree is touched, so an out-of-range point aborts
/// the scan without partial updates.
pub fn insert_scan(
    tree: &mut OccupancyTree,
    points: &[Point3],
    origin: Point3,
    max_range: Option<f64>,
) -> Result<ScanSummary, MapError> {
    let mut free: HashSet<VoxelKey> = HashSet::new();
    let mut occupied: HashSet<VoxelKey> = HashSet::new();

    for &point in points {
        let distance = origin.distance(&point);
        match max_range {
            Some(range) if range > 0.0 && distance > range => {
                let s = range / distance;
                let cut = Point3::new(
                    origin.x + (point.x - origin.x) * s,
                    origin.y + (point.y - origin.y) * s,
                    origin.z + (point.z - origin.z) * s,
                );
                let ray = trace_ray(tree.key_space(), origin, cut)?;
                free.extend(ray.free);
                free.insert(ray.end);
            }
            _ => {
                let ray = trace_ray(tree.key_space(), origin, point)?;
                free.extend(ray.free);
                occupied.insert(ray.end);
            }
        }
    }
    free.retain(|k| !occupied.contains(k));

    for &key in &free {
        tree.update_node(key, false)?;
    }
    for &key in &occupied {
        tree.update_node(key, true)?;
    }
    let summary = ScanSummary {
        hits: occupied.len(),
        misses: free.len(),
    };
    debug!(points = points.len(), hits = summary.hits, misses = summary.misses, "inserted scan");
    Ok(summary)
}
