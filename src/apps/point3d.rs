//! Point cloud viewer, live in polling mode or from a saved stereo dump.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use super::{AppEnv, apply_image_mode, dispatcher, open_session, prepare_and_start};
use crate::common::{ComponentId, Intrinsics};
use crate::dispatch::{Control, FrameSink, SinkContext, StopSignal};
use crate::dump::{DumpLayout, export_ir_jpegs, load_dump, sidecar};
use crate::error::Result;
use crate::frame::Frame;
use crate::pointcloud::{PointCloud, depth_to_points};
use crate::visualization::Viewer;

/// Window whose closing ends the tool.
pub const POINT3D_WINDOW: &str = "Point3D";

pub struct Point3dSink {
    viewer: Box<dyn Viewer>,
}

impl Point3dSink {
    pub fn new(viewer: Box<dyn Viewer>) -> Self {
        Self { viewer }
    }
}

impl FrameSink for Point3dSink {
    fn on_frame(&mut self, _ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control> {
        self.viewer.next_frame();
        if let Some(color) = frame.color() {
            self.viewer.show_rgb("color", &color.to_rgb())?;
        }
        if let Some(points) = frame.points() {
            self.viewer.show_points(POINT3D_WINDOW, &points.to_cloud())?;
        }
        if self.viewer.is_stopped(POINT3D_WINDOW) {
            return Ok(Control::Quit);
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

    debug!("=== Configure components, open point3d cam");
    let mut components = ComponentId::POINT3D;
    if session.has(ComponentId::RGB) {
        components |= ComponentId::RGB;
    }
    session.enable(components)?;

    if session.has(ComponentId::RGB) {
        match session.intrinsics(ComponentId::RGB) {
            Ok(intr) => info!("RGB intrinsics: {:?}", intr),
            Err(e) => error!("failed to read RGB intrinsics: {}", e),
        }
    }

    apply_image_mode(&session, config.image_mode)?;
    prepare_and_start(&session, &config)?;

    let mut dispatcher = dispatcher(keys, &config);
    dispatcher.add_sink(Point3dSink::new(viewer));
    let frames = dispatcher.run_polling(&session, &stop, config.fetch_timeout())?;
    session.close()?;
    info!("main done! {} frames", frames);
    Ok(frames)
}

/// What to do with a loaded dump besides showing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOptions {
    /// Write both IR planes as `<file>-irl.jpg` / `<file>-irr.jpg`.
    pub export_ir: bool,
    /// Write valid points as `<file>-p3d.txt`.
    pub export_points: bool,
}

/// Compute the point cloud of a stereo dump and show it until the window
/// is closed or `stop` is raised.
pub fn run_offline(
    file: &Path,
    options: OfflineOptions,
    viewer: &mut dyn Viewer,
    stop: &StopSignal,
) -> Result<PointCloud> {
    debug!("=== Load dump {}", file.display());
    let dump = load_dump(file, DumpLayout::stereo())?;

    if options.export_ir {
        let (left, right) = export_ir_jpegs(&dump, file)?;
        info!("wrote {} and {}", left.display(), right.display());
    }

    let intr = Intrinsics::REFERENCE_1280X960;
    let cloud = dump.depth()?.with_array(|depth| depth_to_points(depth, &intr, 1280));

    if options.export_points {
        let path = sidecar(file, "-p3d.txt");
        cloud.save_xyz(&path)?;
        info!("wrote {}", path.display());
    }

    viewer.next_frame();
    viewer.show_points(POINT3D_WINDOW, &cloud)?;
    while !stop.is_stopped() && !viewer.is_stopped(POINT3D_WINDOW) {
        thread::sleep(Duration::from_millis(100));
    }
    Ok(cloud)
}
