use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_BUFFER_COUNT;
use crate::common::ImageMode;
use crate::device::DeviceSelector;
use crate::error::{Result, TyError};
use crate::render::DepthRender;
use crate::sim::SimConfig;
use crate::visualization::ViewerKind;

/// Settings shared by all tools. Every field has a default, so a config
/// file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceSelector,
    /// Requested depth resolution
    pub image_mode: ImageMode,
    pub trigger_mode: bool,
    pub buffer_count: usize,
    /// Polling fetch timeout; unset waits forever.
    pub fetch_timeout_ms: Option<u64>,
    pub depth_render: DepthRender,
    pub output_dir: PathBuf,
    pub viewer: ViewerKind,
    /// Write viewer output on every n-th frame only.
    pub viewer_every: u64,
    /// Background frames the color analysis learns before judging.
    pub background_frames: usize,
    /// Subtract each row's green floor from color before analysis.
    pub remove_green_floor: bool,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub sim: SimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceSelector::First,
            image_mode: ImageMode::VGA,
            trigger_mode: false,
            buffer_count: DEFAULT_BUFFER_COUNT,
            fetch_timeout_ms: None,
            depth_render: DepthRender::default(),
            output_dir: PathBuf::from("tycam-out"),
            viewer: ViewerKind::Directory,
            viewer_every: 1,
            background_frames: 0,
            remove_green_floor: false,
            max_frames: None,
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    /// Read a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(TyError::InvalidConfiguration("buffer_count must be at least 1".into()));
        }
        if self.viewer_every == 0 {
            return Err(TyError::InvalidConfiguration("viewer_every must be at least 1".into()));
        }
        if self.image_mode.width == 0 || self.image_mode.height == 0 {
            return Err(TyError::InvalidConfiguration(format!(
                "image_mode {} has no pixels",
                self.image_mode
            )));
        }
        let render = &self.depth_render;
        if render.max_mm != 0 && render.max_mm <= render.min_mm {
            return Err(TyError::InvalidConfiguration(format!(
                "depth range {}..{} mm is empty",
                render.min_mm, render.max_mm
            )));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "device": { "ip": "10.0.0.7" }, "buffer_count": 3, "sim": { "with_rgb": false } }"#,
        )
        .unwrap();
        assert_eq!(config.device, DeviceSelector::Ip("10.0.0.7".into()));
        assert_eq!(config.buffer_count, 3);
        assert!(!config.sim.with_rgb);
        assert_eq!(config.image_mode, ImageMode::VGA);
        assert_eq!(config.sim.devices.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tycam.json");
        std::fs::write(&path, r#"{ "buffer_count": 0 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(TyError::InvalidConfiguration(_))));

        std::fs::write(&path, r#"{ "depth_render": { "min_mm": 900, "max_mm": 500 } }"#).unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path), Err(TyError::Json(_))));
    }

    #[test]
    fn defaults_serialize_round_trip() {
        let text = serde_json::to_string(&Config::default()).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }
}
