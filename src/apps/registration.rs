//! Projects the point cloud into the color camera and overlays the result.

use std::fs;
use std::path::PathBuf;

use image::{ImageBuffer, Luma, RgbImage};
use tracing::{debug, info};

use super::{AppEnv, apply_image_mode, dispatcher, open_session, prepare_and_start, require_rgb};
use crate::common::ComponentId;
use crate::dispatch::{Control, FrameSink, SinkContext};
use crate::error::{Result, TyError};
use crate::frame::{Frame, IrSide};
use crate::input::Key;
use crate::render::{DepthRender, blend_half};
use crate::visualization::Viewer;

/// Depth as seen from the color camera, with the color image it belongs to.
#[derive(Debug, Clone)]
pub struct Registered {
    pub width: u32,
    pub height: u32,
    /// Depth in mm per color pixel, 0 where no point landed
    pub depth: Vec<u16>,
    pub color: RgbImage,
}

impl Registered {
    pub fn depth_image(&self) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
        ImageBuffer::from_raw(self.width, self.height, self.depth.clone())
            .ok_or_else(|| TyError::InvalidFrame("registered depth has the wrong size".into()))
    }
}

pub struct RegistrationSink {
    viewer: Box<dyn Viewer>,
    render: DepthRender,
    output_dir: PathBuf,
}

impl RegistrationSink {
    pub fn new(viewer: Box<dyn Viewer>, render: DepthRender, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            viewer,
            render,
            output_dir: output_dir.into(),
        }
    }

    fn save(&self, registered: &Registered) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let depth = self.output_dir.join("depth.png");
        let color = self.output_dir.join("color.png");
        registered.depth_image()?.save(&depth)?;
        registered.color.save(&color)?;
        info!("saved {} and {}", depth.display(), color.display());
        Ok(())
    }
}

/// Register the frame's points to its color image.
pub fn register(ctx: &SinkContext<'_>, frame: &Frame) -> Result<Option<Registered>> {
    let (Some(points), Some(color)) = (frame.points(), frame.color()) else {
        return Ok(None);
    };
    let color = color.to_rgb();
    let (width, height) = color.dimensions();
    let depth = ctx
        .session
        .register_world_to_color(&points.points(), (width, height))?;
    Ok(Some(Registered {
        width,
        height,
        depth,
        color,
    }))
}

impl FrameSink for RegistrationSink {
    fn on_frame(&mut self, ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control> {
        self.viewer.next_frame();

        if let Some(depth) = frame.depth() {
            self.viewer.show_rgb("ColorDepth", &self.render.render(&depth))?;
        }
        if let Some(left) = frame.ir(IrSide::Left) {
            self.viewer.show_gray("LeftIR", &left.to_image())?;
        }
        if let Some(right) = frame.ir(IrSide::Right) {
            self.viewer.show_gray("RightIR", &right.to_image())?;
        }

        if let Some(registered) = register(ctx, frame)? {
            let projected = self
                .render
                .compute(&registered.depth, registered.width, registered.height);
            self.viewer.show_rgb("color", &registered.color)?;
            self.viewer
                .show_rgb("projected depth", &blend_half(&projected, &registered.color)?)?;
            if ctx.key == Some(Key::Save) {
                self.save(&registered)?;
            }
        }
        Ok(Control::Continue)
    }
}

pub fn run(env: AppEnv) -> Result<u64> {
    let AppEnv {
        config,
        backend,
        viewer,
        keys,
        stop,
    } = env;
    let session = open_session(backend, &config)?;

    debug!("=== Configure components, open point3d cam and RGB cam");
    require_rgb(&session, "registration")?;
    session.enable(ComponentId::POINT3D)?;
    apply_image_mode(&session, config.image_mode)?;
    prepare_and_start(&session, &config)?;

    let sink = RegistrationSink::new(viewer, config.depth_render, &config.output_dir);
    let mut dispatcher = dispatcher(keys, &config);
    dispatcher.add_sink(sink);
    let frames = dispatcher.run_callback(session, stop)?;
    info!("main done! {} frames", frames);
    Ok(frames)
}
