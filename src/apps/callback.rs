//! Depth, both IR images and (when present) color, delivered on a capture
//! thread. `s` saves the raw depth and color of the next complete frame.

use tracing::{debug, info};

use super::{AppEnv, apply_image_mode, dispatcher, open_session, prepare_and_start};
use crate::common::ComponentId;
use crate::dispatch::{Control, FrameSink, SinkContext};
use crate::dump::DumpWriter;
use crate::error::Result;
use crate::frame::{Frame, IrSide};
use crate::input::Key;
use crate::render::{DepthRender, annotate_center_depth, swap_rb};
use crate::visualization::Viewer;

pub struct CallbackSink {
    viewer: Box<dyn Viewer>,
    render: DepthRender,
    dumps: DumpWriter,
    save_pending: bool,
}

impl CallbackSink {
    pub fn new(viewer: Box<dyn Viewer>, render: DepthRender, dumps: DumpWriter) -> Self {
        Self {
            viewer,
            render,
            dumps,
            save_pending: false,
        }
    }

    /// Dump depth then BGR color, once depth and both IR images are in the frame.
    fn save(&mut self, frame: &Frame) -> Result<bool> {
        let (Some(depth), Some(_), Some(_)) = (frame.depth(), frame.ir(IrSide::Left), frame.ir(IrSide::Right))
        else {
            return Ok(false);
        };
        let color = frame.color().map(|c| {
            let mut rgb = c.to_rgb();
            swap_rb(&mut rgb);
            rgb
        });
        let mut planes = vec![depth.bytes()];
        if let Some(bgr) = &color {
            planes.push(bgr.as_raw().as_slice());
        }
        self.dumps.write(&planes)?;
        Ok(true)
    }
}

impl FrameSink for CallbackSink {
    fn on_frame(&mut self, ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control> {
        self.viewer.next_frame();
        if ctx.key == Some(Key::Save) {
            self.save_pending = true;
        }

        if let Some(depth) = frame.depth() {
            let mut colored = self.render.render(&depth);
            let center = annotate_center_depth(&mut colored, &depth);
            info!("center depth: {} mm", center);
            self.viewer.show_rgb("ColorDepth", &colored)?;
        }
        if let Some(left) = frame.ir(IrSide::Left) {
            self.viewer.show_gray("LeftIR", &left.to_image())?;
        }
        if let Some(right) = frame.ir(IrSide::Right) {
            self.viewer.show_gray("RightIR", &right.to_image())?;
        }
        if let Some(color) = frame.color() {
            self.viewer.show_rgb("bgr", &color.to_rgb())?;
        }

        if self.save_pending && self.save(frame)? {
            self.save_pending = false;
        }
        Ok(Control::Continue)
    }
}

/// Capture until quit, Ctrl-C or the frame limit. Returns the number of
/// frames dispatched.
pub fn run(env: AppEnv) -> Result<u64> {
    let AppEnv {
        config,
        backend,
        viewer,
        keys,
        stop,
    } = env;
    let session = open_session(backend, &config)?;

    debug!("=== Configure components, open depth cam");
    let mut components = ComponentId::DEPTH | ComponentId::IR_LEFT | ComponentId::IR_RIGHT;
    if session.has(ComponentId::RGB) {
        debug!("     - has RGB camera, open RGB cam");
        components |= ComponentId::RGB;
    }
    session.enable(components)?;
    apply_image_mode(&session, config.image_mode)?;
    prepare_and_start(&session, &config)?;

    let sink = CallbackSink::new(viewer, config.depth_render, DumpWriter::new(&config.output_dir)?);
    let mut dispatcher = dispatcher(keys, &config);
    dispatcher.add_sink(sink);
    let frames = dispatcher.run_callback(session, stop)?;
    info!("main done! {} frames", frames);
    Ok(frames)
}
