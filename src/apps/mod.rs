//! The sample tools, one module per subcommand.

pub mod callback;
pub mod list;
pub mod point3d;
pub mod registration;
pub mod rgb_analysis;

use tracing::{debug, error, warn};

use crate::backend::CameraBackend;
use crate::common::{ComponentId, ImageMode};
use crate::config::Config;
use crate::device::{Library, Session};
use crate::dispatch::{Dispatcher, StopSignal};
use crate::error::{Result, TyError};
use crate::input::KeySource;
use crate::visualization::{DirectoryViewer, NullViewer, Viewer, ViewerKind};

/// Everything a capture tool needs to run.
pub struct AppEnv {
    pub config: Config,
    pub backend: Box<dyn CameraBackend>,
    pub viewer: Box<dyn Viewer>,
    pub keys: Box<dyn KeySource>,
    pub stop: StopSignal,
}

/// Build the viewer selected in `config`.
pub fn make_viewer(config: &Config) -> Result<Box<dyn Viewer>> {
    match config.viewer {
        ViewerKind::Directory => Ok(Box::new(
            DirectoryViewer::new(config.output_dir.join("windows"))?.with_every(config.viewer_every),
        )),
        ViewerKind::None => Ok(Box::new(NullViewer)),
        #[cfg(feature = "rerun")]
        ViewerKind::Rerun => Ok(Box::new(crate::visualization::RerunViewer::spawn("tycam")?)),
        #[cfg(not(feature = "rerun"))]
        ViewerKind::Rerun => Err(TyError::InvalidConfiguration(
            "the rerun viewer needs the `rerun` feature".into(),
        )),
    }
}

/// Init the library and open the configured device.
pub fn open_session(backend: Box<dyn CameraBackend>, config: &Config) -> Result<Session> {
    config.validate()?;
    Library::init(backend)?.open(&config.device)
}

/// Request `mode` for depth. A refused mode keeps the device default.
fn apply_image_mode(session: &Session, mode: ImageMode) -> Result<()> {
    debug!("=== Configure components, set depth cam resolution to {}", mode);
    if !session.set_image_mode(ComponentId::DEPTH, mode)? {
        warn!("image mode {} not permitted, keeping the device default", mode);
    }
    Ok(())
}

/// Allocate buffers large enough for a depth image at `mode`, set the
/// trigger mode and start capture.
fn prepare_and_start(session: &Session, config: &Config) -> Result<()> {
    let min_size = config.image_mode.pixels() * 2;
    session.prepare_buffers(config.buffer_count, min_size)?;
    session.set_trigger_mode(config.trigger_mode)?;
    debug!("=== Start capture");
    session.start()
}

fn dispatcher(keys: Box<dyn KeySource>, config: &Config) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(keys);
    dispatcher
        .set_frame_limit(config.max_frames)
        .set_soft_trigger(config.trigger_mode);
    dispatcher
}

/// Enable RGB, or fail with an error log when the device has none.
fn require_rgb(session: &Session, purpose: &str) -> Result<()> {
    if !session.has(ComponentId::RGB) {
        error!("device has no RGB camera, cannot do {}", purpose);
        return Err(TyError::MissingComponent(ComponentId::RGB));
    }
    session.enable(ComponentId::RGB)
}
