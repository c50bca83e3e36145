//! Binary map codec.
//!
//! Serialises an [`OccupancyTree`] into a self-describing byte blob and
//! rebuilds it.  Decoding always produces a fresh tree; on any error nothing
//! but the returned [`MapError`] escapes.
//!
//! # Layout
//!
//! All numbers are little-endian.
//!
//! ```text
//! [Header]
//!   magic           4 bytes   "VXOM"
//!   version         u16       1
//!   resolution      f64
//!   prob_hit        f64
//!   prob_miss       f64
//!   clamp_min       f64       (log-odds)
//!   clamp_max       f64       (log-odds)
//!   prune_epsilon   f64
//!   max_depth       u8
//!   has_root        u8        0 | 1
//!   root_level      u8        } only when has_root = 1
//!   root_origin     3 x u32   }
//!
//! [Body: pre-order, children in slot order]
//!   flags           u8        bit 0 = has children
//!   child_mask      u8        } inner node: bit i = slot i present,
//!                             } followed by the present children
//!   log_odds        f32       } leaf node
//! ```
//!
//! Inner node values are not stored; they are recomputed as the max of their
//! children on read.  Leaf values are written as the exact `f32` the tree
//! holds, so a round trip reproduces every node bit for bit.
//!
//! ```rust
//! use voxmap_io::codec::{read_binary, write_binary};
//! use voxmap_octree::OccupancyTree;
//! use voxmap_types::{Occupancy, Point3};
//!
//! let mut tree = OccupancyTree::with_resolution(0.1).unwrap();
//! tree.update_node_at(Point3::new(1.0, 1.0, 1.0), true).unwrap();
//!
//! let bytes = write_binary(&tree);
//! let back = read_binary(&bytes).unwrap();
//! assert_eq!(back.classify(Point3::new(1.0, 1.0, 1.0)).unwrap(), Occupancy::Occupied);
//! ```

use std::fs;
use std::path::Path;

use tracing::debug;
use voxmap_octree::{NodeId, OccupancyTree, SensorModel, TreeBuilder};
use voxmap_types::{MapError, TreeConfig, VoxelKey};

pub const MAGIC: [u8; 4] = *b"VXOM";
pub const VERSION: u16 = 1;

const FLAG_HAS_CHILDREN: u8 = 0x01;

// ────────────────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────────────────

/// Encode `tree` into a fresh buffer.
pub fn write_binary(tree: &OccupancyTree) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + tree.node_count() * 5);
    let cfg = tree.config();

    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    for v in [
        cfg.resolution,
        cfg.prob_hit,
        cfg.prob_miss,
        cfg.clamp_min,
        cfg.clamp_max,
        cfg.prune_epsilon,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.push(tree.key_space().max_depth());

    match tree.root_id() {
        None => out.push(0),
        Some(root) => {
            out.push(1);
            out.push(tree.root_level());
            for k in tree.root_origin().as_array() {
                out.extend_from_slice(&k.to_le_bytes());
            }
            write_node(tree, root, &mut out);
        }
    }

    debug!(
        bytes = out.len(),
        nodes = tree.node_count(),
        "encoded occupancy tree"
    );
    out
}

fn write_node(tree: &OccupancyTree, id: NodeId, out: &mut Vec<u8>) {
    let Some(node) = tree.node(id) else {
        return;
    };
    if node.has_children() {
        out.push(FLAG_HAS_CHILDREN);
        out.push(node.child_mask());
        for slot in 0..8 {
            if let Some(child) = node.child(slot) {
                write_node(tree, child, out);
            }
        }
    } else {
        out.push(0);
        out.extend_from_slice(&node.log_odds().to_le_bytes());
    }
}

/// Encode `tree` and write it to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`MapError::Io`] when the file cannot be written.
pub fn write_file(tree: &OccupancyTree, path: impl AsRef<Path>) -> Result<(), MapError> {
    fs::write(path, write_binary(tree))?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Decoding
// ────────────────────────────────────────────────────────────────────────────

fn corrupt(msg: impl Into<String>) -> MapError {
    MapError::CorruptFormat(msg.into())
}

/// Bounds-checked cursor over the input.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MapError> {
        let end = self.pos + N;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| {
            corrupt(format!(
                "truncated input: needed {N} bytes at offset {}, only {} available",
                self.pos,
                self.data.len().saturating_sub(self.pos)
            ))
        })?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, MapError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MapError> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, MapError> {
        self.take().map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, MapError> {
        self.take().map(f32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, MapError> {
        self.take().map(f64::from_le_bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Decode a tree produced by [`write_binary`].
///
/// # Errors
///
/// Returns [`MapError::CorruptFormat`] for a wrong magic or version,
/// truncated or trailing data, an invalid embedded configuration, or a body
/// that does not describe a well-formed tree.
pub fn read_binary(bytes: &[u8]) -> Result<OccupancyTree, MapError> {
    let mut r = ByteReader::new(bytes);

    let magic: [u8; 4] = r.take()?;
    if magic != MAGIC {
        return Err(corrupt(format!(
            "bad magic {magic:02x?}, expected {MAGIC:02x?}"
        )));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }

    let resolution = r.f64()?;
    let prob_hit = r.f64()?;
    let prob_miss = r.f64()?;
    let clamp_min = r.f64()?;
    let clamp_max = r.f64()?;
    let prune_epsilon = r.f64()?;
    let max_depth = r.u8()?;
    let config = TreeConfig {
        resolution,
        prob_hit,
        prob_miss,
        clamp_min,
        clamp_max,
        // Exactly reproduces `max_depth` for any resolution.
        max_extent: resolution * (1u64 << max_depth.min(63)) as f64,
        prune_epsilon,
    };
    let depth = config
        .validate()
        .map_err(|e| corrupt(format!("invalid embedded config: {e}")))?;
    if depth != max_depth {
        return Err(corrupt(format!("invalid max depth {max_depth}")));
    }

    // Inner nodes hold this until their children are known.
    let placeholder = SensorModel::from_config(&config).clamp_min();
    let mut builder = TreeBuilder::new(config)?;
    match r.u8()? {
        0 => {}
        1 => {
            let level = r.u8()?;
            let origin = VoxelKey::new(r.u32()?, r.u32()?, r.u32()?);
            let flags = read_flags(&mut r)?;
            if flags & FLAG_HAS_CHILDREN != 0 {
                let root = builder.root(level, origin, placeholder)?;
                read_children(&mut r, &mut builder, root, placeholder)?;
            } else {
                let value = r.f32()?;
                builder.root(level, origin, value)?;
            }
        }
        other => return Err(corrupt(format!("bad root flag {other}"))),
    }

    if r.remaining() != 0 {
        return Err(corrupt(format!("{} trailing bytes", r.remaining())));
    }
    let tree = builder.finish();
    debug!(
        bytes = bytes.len(),
        nodes = tree.node_count(),
        "decoded occupancy tree"
    );
    Ok(tree)
}

fn read_flags(r: &mut ByteReader<'_>) -> Result<u8, MapError> {
    let flags = r.u8()?;
    if flags & !FLAG_HAS_CHILDREN != 0 {
        return Err(corrupt(format!("unknown node flags {flags:#04x}")));
    }
    Ok(flags)
}

fn read_children(
    r: &mut ByteReader<'_>,
    builder: &mut TreeBuilder,
    parent: NodeId,
    placeholder: f32,
) -> Result<(), MapError> {
    let mask = r.u8()?;
    if mask == 0 {
        return Err(corrupt("inner node with empty child mask"));
    }
    for slot in (0..8).filter(|i| mask & (1 << i) != 0) {
        let flags = read_flags(r)?;
        if flags & FLAG_HAS_CHILDREN != 0 {
            let child = builder.child(parent, slot, placeholder)?;
            read_children(r, builder, child, placeholder)?;
        } else {
            let value = r.f32()?;
            builder.child(parent, slot, value)?;
        }
    }
    Ok(())
}

/// Read and decode the map file at `path`.
///
/// # Errors
///
/// Returns [`MapError::Io`] when the file cannot be read, otherwise as
/// [`read_binary`].
pub fn read_file(path: impl AsRef<Path>) -> Result<OccupancyTree, MapError> {
    let bytes = fs::read(path)?;
    read_binary(&bytes)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
