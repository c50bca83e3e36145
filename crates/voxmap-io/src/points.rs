//! Raw point-cloud files.
//!
//! A point cloud is a flat sequence of little-endian `f32` triples
//! `x y z x y z ...` with no header.  [`PointReader`] streams one
//! [`Point3`] per triple; a trailing partial triple is dropped with a
//! warning.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use tracing::warn;
use voxmap_types::{MapError, Point3};

const RECORD_LEN: usize = 12;

/// Streaming reader yielding one point per 12-byte record.
pub struct PointReader<R> {
    inner: R,
    done: bool,
    records: usize,
}

impl<R: Read> PointReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            done: false,
            records: 0,
        }
    }

    /// Number of points yielded so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Fill `buf` as far as the input allows; returns the bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for PointReader<R> {
    type Item = Result<Point3, MapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; RECORD_LEN];
        match self.fill(&mut buf) {
            Ok(RECORD_LEN) => {
                self.records += 1;
                let f = |i: usize| f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
                Some(Ok(Point3::new(
                    f64::from(f(0)),
                    f64::from(f(4)),
                    f64::from(f(8)),
                )))
            }
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(partial) => {
                self.done = true;
                warn!(
                    bytes = partial,
                    after = self.records,
                    "ignoring partial point record at end of input"
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(MapError::Io(e)))
            }
        }
    }
}

/// Read every point from the file at `path`.
///
/// # Errors
///
/// Returns [`MapError::Io`] when the file cannot be opened or read.
pub fn read_points(path: impl AsRef<Path>) -> Result<Vec<Point3>, MapError> {
    let file = File::open(path)?;
    PointReader::new(BufReader::new(file)).collect()
}

/// Write `points` as little-endian `f32` triples, replacing any existing
/// file.  Coordinates are narrowed to `f32`.
///
/// # Errors
///
/// Returns [`MapError::Io`] when the file cannot be created or written.
pub fn write_points(path: impl AsRef<Path>, points: &[Point3]) -> Result<(), MapError> {
    let mut out = BufWriter::new(File::create(path)?);
    for p in points {
        for c in [p.x, p.y, p.z] {
            out.write_all(&(c as f32).to_le_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}
