use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::pointcloud::PointCloud;

/// Where the tools show their images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerKind {
    /// PNG files in the output directory
    #[default]
    Directory,
    /// Spawned rerun viewer (needs the `rerun` feature)
    Rerun,
    /// Discard everything
    None,
}

/// Named windows, in the spirit of `imshow`.
///
/// Every call replaces what the window showed before.
pub trait Viewer: Send {
    fn show_rgb(&mut self, name: &str, image: &RgbImage) -> Result<()>;
    fn show_gray(&mut self, name: &str, image: &GrayImage) -> Result<()>;
    fn show_points(&mut self, name: &str, cloud: &PointCloud) -> Result<()>;

    /// Whether the user closed window `name`.
    fn is_stopped(&self, _name: &str) -> bool {
        false
    }

    /// Called once per dispatched frame, before anything is shown.
    fn next_frame(&mut self) {}
}

/// Writes each window as `<name>.png` (points as `<name>.ply`) into a
/// directory. Creating `<name>.stop` there closes the window.
#[derive(Debug)]
pub struct DirectoryViewer {
    dir: PathBuf,
    every: u64,
    frame: u64,
}

impl DirectoryViewer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("showing windows as files in {}", dir.display());
        Ok(Self {
            dir,
            every: 1,
            frame: 0,
        })
    }

    /// Only write on every `every`-th frame.
    pub fn with_every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn due(&self) -> bool {
        self.frame % self.every == 0
    }

    fn path(&self, name: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, ext))
    }
}

impl Viewer for DirectoryViewer {
    fn show_rgb(&mut self, name: &str, image: &RgbImage) -> Result<()> {
        if self.due() {
            image.save(self.path(name, "png"))?;
        }
        Ok(())
    }

    fn show_gray(&mut self, name: &str, image: &GrayImage) -> Result<()> {
        if self.due() {
            image.save(self.path(name, "png"))?;
        }
        Ok(())
    }

    fn show_points(&mut self, name: &str, cloud: &PointCloud) -> Result<()> {
        if self.due() {
            cloud.save_ply(self.path(name, "ply"))?;
        }
        Ok(())
    }

    fn is_stopped(&self, name: &str) -> bool {
        self.path(name, "stop").exists()
    }

    fn next_frame(&mut self) {
        self.frame += 1;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullViewer;

impl Viewer for NullViewer {
    fn show_rgb(&mut self, _: &str, _: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn show_gray(&mut self, _: &str, _: &GrayImage) -> Result<()> {
        Ok(())
    }

    fn show_points(&mut self, _: &str, _: &PointCloud) -> Result<()> {
        Ok(())
    }
}

/// What a [`MemoryViewer`] window currently shows.
#[derive(Debug, Clone)]
pub enum Shown {
    Rgb(RgbImage),
    Gray(GrayImage),
    Points(PointCloud),
}

/// Windows kept in memory, shared with whoever holds a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryViewer {
    windows: Arc<Mutex<HashMap<String, Shown>>>,
    updates: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Shown> {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// How many times window `name` was updated.
    pub fn updates(&self, name: &str) -> usize {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn put(&self, name: &str, shown: Shown) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), shown);
        *self
            .updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default() += 1;
    }
}

impl Viewer for MemoryViewer {
    fn show_rgb(&mut self, name: &str, image: &RgbImage) -> Result<()> {
        self.put(name, Shown::Rgb(image.clone()));
        Ok(())
    }

    fn show_gray(&mut self, name: &str, image: &GrayImage) -> Result<()> {
        self.put(name, Shown::Gray(image.clone()));
        Ok(())
    }

    fn show_points(&mut self, name: &str, cloud: &PointCloud) -> Result<()> {
        debug!("{}: {} points", name, cloud.valid_points().count());
        self.put(name, Shown::Points(cloud.clone()));
        Ok(())
    }
}

#[cfg(feature = "rerun")]
pub use self::rerun_viewer::RerunViewer;

#[cfg(feature = "rerun")]
mod rerun_viewer {
    use image::{GrayImage, RgbImage};
    use rerun as rr;

    use super::Viewer;
    use crate::error::{Result, TyError};
    use crate::pointcloud::PointCloud;

    /// Streams every window to a spawned rerun viewer, one entity per name.
    pub struct RerunViewer {
        rec: rr::RecordingStream,
        frame_index: i64,
    }

    impl RerunViewer {
        pub fn spawn(app_id: &str) -> Result<Self> {
            let rec = rr::RecordingStreamBuilder::new(app_id)
                .spawn()
                .map_err(rerun_err)?;
            Ok(Self { rec, frame_index: 0 })
        }
    }

    impl Viewer for RerunViewer {
        fn show_rgb(&mut self, name: &str, image: &RgbImage) -> Result<()> {
            let (w, h) = image.dimensions();
            self.rec
                .log(name, &rr::Image::from_rgb24(image.as_raw().clone(), [w, h]))
                .map_err(rerun_err)
        }

        fn show_gray(&mut self, name: &str, image: &GrayImage) -> Result<()> {
            let (w, h) = image.dimensions();
            self.rec
                .log(name, &rr::Image::from_l8(image.as_raw().clone(), [w, h]))
                .map_err(rerun_err)
        }

        fn show_points(&mut self, name: &str, cloud: &PointCloud) -> Result<()> {
            let positions = cloud.valid_points().map(|p| [p.x, p.y, p.z]);
            self.rec
                .log(name, &rr::Points3D::new(positions))
                .map_err(rerun_err)
        }

        fn next_frame(&mut self) {
            self.rec.set_time_sequence("frame", self.frame_index);
            self.frame_index += 1;
        }
    }

    fn rerun_err(err: impl std::fmt::Display) -> TyError {
        TyError::Viewer(format!("rerun error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::Point3;

    #[test]
    fn directory_viewer_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = DirectoryViewer::new(dir.path()).unwrap();
        viewer.show_rgb("ColorDepth", &RgbImage::new(4, 3)).unwrap();
        viewer.show_gray("LeftIR", &GrayImage::new(4, 3)).unwrap();
        viewer
            .show_points("Point3D", &PointCloud::new(1, 1, vec![Point3::new(1.0, 2.0, 3.0)]))
            .unwrap();
        assert!(dir.path().join("ColorDepth.png").exists());
        assert!(dir.path().join("LeftIR.png").exists());
        assert!(dir.path().join("Point3D.ply").exists());

        assert!(!viewer.is_stopped("Point3D"));
        fs::write(dir.path().join("Point3D.stop"), b"").unwrap();
        assert!(viewer.is_stopped("Point3D"));
    }

    #[test]
    fn throttled_viewer_skips_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = DirectoryViewer::new(dir.path()).unwrap().with_every(2);
        viewer.next_frame();
        viewer.show_rgb("color", &RgbImage::new(2, 2)).unwrap();
        assert!(!dir.path().join("color.png").exists());
        viewer.next_frame();
        viewer.show_rgb("color", &RgbImage::new(2, 2)).unwrap();
        assert!(dir.path().join("color.png").exists());
    }

    #[test]
    fn memory_viewer_is_shared_between_clones() {
        let viewer = MemoryViewer::new();
        let mut writer = viewer.clone();
        writer.show_gray("ir", &GrayImage::new(2, 2)).unwrap();
        writer.show_gray("ir", &GrayImage::new(2, 2)).unwrap();
        assert!(matches!(viewer.get("ir"), Some(Shown::Gray(_))));
        assert_eq!(viewer.updates("ir"), 2);
        assert_eq!(viewer.names(), vec!["ir".to_string()]);
    }
}
