//! `voxmap-octree` – probabilistic occupancy octree.
//!
//! Stores what a range sensor has seen as a sparse octree of log-odds
//! occupancy values, answering "is this voxel occupied, free, or never
//! observed?" at any resolution level.
//!
//! # Modules
//!
//! - [`key_space`] – [`KeySpace`][key_space::KeySpace]: maps world
//!   coordinates to discrete voxel keys and back.
//! - [`sensor_model`] – [`SensorModel`][sensor_model::SensorModel]: clamped
//!   log-odds hit/miss update rule.
//! - [`tree`] – [`OccupancyTree`][tree::OccupancyTree]: the octree itself,
//!   with update, search, prune, expand and leaf iteration.
//! - [`ray`] – voxel traversal along sensor rays ([`trace_ray`][ray::trace_ray],
//!   [`cast_ray`][ray::cast_ray]).
//! - [`insert`] – feeding points, point clouds and scans into a tree.
//! - [`builder`] – [`TreeBuilder`][builder::TreeBuilder]: checked structural
//!   assembly used by decoders.

pub mod builder;
pub mod insert;
pub mod key_space;
pub mod ray;
pub mod sensor_model;
pub mod tree;

pub use builder::TreeBuilder;
pub use insert::{ScanSummary, insert_observation, insert_point, insert_point_cloud, insert_scan};
pub use key_space::KeySpace;
pub use ray::{RayKeys, cast_ray, compute_ray_keys, trace_ray};
pub use sensor_model::{SensorModel, logit, probability};
pub use tree::{Leaf, NodeId, OccupancyNode, OccupancyTree};
