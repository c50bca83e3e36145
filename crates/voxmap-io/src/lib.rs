//! `voxmap-io` – getting maps and point clouds on and off disk.
//!
//! - [`codec`] – compact binary encoding of an
//!   [`OccupancyTree`][voxmap_octree::OccupancyTree] (`.vxom` files).
//! - [`points`] – reader and writer for raw little-endian `f32` point clouds
//!   (`.bin` files of `x y z` triples).

pub mod codec;
pub mod points;

pub use codec::{read_binary, read_file, write_binary, write_file};
pub use points::{PointReader, read_points, write_points};
