//! Color statistics: channel histogram and background change verdicts.

use tracing::{debug, info};

use super::{AppEnv, apply_image_mode, dispatcher, open_session, prepare_and_start};
use crate::common::ComponentId;
use crate::detector::BackgroundDetector;
use crate::dispatch::{Control, FrameSink, SinkContext};
use crate::error::Result;
use crate::frame::Frame;
use crate::histogram::{ChannelHistogram, remove_green_floor, render_histogram};
use crate::render::DepthRender;
use crate::visualization::Viewer;

pub const HISTOGRAM_WINDOW: &str = "calcHist Demo";

pub struct RgbAnalysisSink {
    viewer: Box<dyn Viewer>,
    render: DepthRender,
    detector: BackgroundDetector,
    fix_color: bool,
}

impl RgbAnalysisSink {
    pub fn new(viewer: Box<dyn Viewer>, render: DepthRender, detector: BackgroundDetector) -> Self {
        Self {
            viewer,
            render,
            detector,
            fix_color: false,
        }
    }

    /// Remove the per-row green floor from every color frame first.
    pub fn with_green_floor_removal(mut self, enabled: bool) -> Self {
        self.fix_color = enabled;
        self
    }
}

impl FrameSink for RgbAnalysisSink {
    fn on_frame(&mut self, _ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control> {
        self.viewer.next_frame();

        if let Some(depth) = frame.depth() {
            self.viewer.show_rgb("ColorDepth", &self.render.render(&depth))?;
        }

        if let Some(color) = frame.color() {
            let mut rgb = color.to_rgb();
            if self.fix_color {
                remove_green_floor(&mut rgb);
            }
            if self.detector.needs_background() {
                let ready = self.detector.input_background(&rgb)?;
                debug!("background frame collected, ready: {}", ready);
            } else {
                let ret = self.detector.judge(&rgb)?;
                info!("color ret: {}", ret);
            }
            self.viewer.show_rgb("color", &rgb)?;
            let hist = ChannelHistogram::compute(&rgb);
            self.viewer.show_rgb(HISTOGRAM_WINDOW, &render_histogram(&hist))?;
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

    debug!("=== Configure components, open depth cam and RGB cam");
    if !session.enable_if_present(ComponentId::RGB)? {
        info!("no RGB camera, showing depth only");
    }
    session.enable(ComponentId::DEPTH)?;
    apply_image_mode(&session, config.image_mode)?;
    prepare_and_start(&session, &config)?;

    let detector = BackgroundDetector::new(config.background_frames);
    let mut dispatcher = dispatcher(keys, &config);
    dispatcher.add_sink(
        RgbAnalysisSink::new(viewer, config.depth_render, detector)
            .with_green_floor_removal(config.remove_green_floor),
    );
    let frames = dispatcher.run_polling(&session, &stop, config.fetch_timeout())?;
    session.close()?;
    info!("main done! {} frames", frames);
    Ok(frames)
}
