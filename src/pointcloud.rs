use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use ndarray::ArrayView2;

use crate::common::Intrinsics;
use crate::error::Result;

/// One point in millimeters; same layout as the SDK's `TY_VECT_3F`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Points with zero or non-finite depth carry no measurement.
    pub fn is_valid(&self) -> bool {
        self.z > 0.0 && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Back-project pixel `(x, y)` with depth `z` through the pinhole model.
pub fn depth_to_world(intr: &Intrinsics, x: f32, y: f32, z: f32) -> Point3 {
    Point3 {
        x: (x - intr.cx()) * z / intr.fx(),
        y: (y - intr.cy()) * z / intr.fy(),
        z,
    }
}

/// Organized point cloud: one point per depth pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    pub points: Vec<Point3>,
}

impl PointCloud {
    pub fn new(width: u32, height: u32, points: Vec<Point3>) -> Self {
        Self {
            width,
            height,
            points,
        }
    }

    pub fn valid_points(&self) -> impl Iterator<Item = &Point3> {
        self.points.iter().filter(|p| p.is_valid())
    }

    /// Writes one `x y z` line per valid point.
    pub fn write_xyz<W: Write>(&self, mut out: W) -> Result<()> {
        for p in self.valid_points() {
            writeln!(out, "{:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn save_xyz(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_xyz(BufWriter::new(file))
    }

    /// ASCII PLY with only the valid points.
    pub fn write_ply<W: Write>(&self, mut out: W) -> Result<()> {
        let count = self.valid_points().count();
        writeln!(out, "ply")?;
        writeln!(out, "format ascii 1.0")?;
        writeln!(out, "element vertex {}", count)?;
        writeln!(out, "property float x")?;
        writeln!(out, "property float y")?;
        writeln!(out, "property float z")?;
        writeln!(out, "end_header")?;
        self.write_xyz(out)
    }

    pub fn save_ply(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_ply(BufWriter::new(file))
    }
}

/// Convert a depth map to points.
///
/// `intr` may describe a sensor of a different resolution than `depth`;
/// pixel coordinates are rescaled by `intr_width / depth_width` first, the
/// way a 640x480 depth map relates to a 1280x960 calibration.
pub fn depth_to_points(depth: ArrayView2<'_, u16>, intr: &Intrinsics, intr_width: u32) -> PointCloud {
    let (rows, cols) = depth.dim();
    let scale = if cols == 0 {
        1.0
    } else {
        intr_width as f32 / cols as f32
    };
    let inv_fx = 1.0 / intr.fx();
    let inv_fy = 1.0 / intr.fy();

    let mut points = vec![Point3::default(); rows * cols];
    for ((r, c), &v) in depth.indexed_iter() {
        if v == 0 {
            continue;
        }
        let z = v as f32;
        points[r * cols + c] = Point3 {
            x: (c as f32 * scale - intr.cx()) * z * inv_fx,
            y: (r as f32 * scale - intr.cy()) * z * inv_fy,
            z,
        };
    }
    PointCloud::new(cols as u32, rows as u32, points)
}
