//! Session lifecycle and frame dispatch through the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tycam::common::Feature;
use tycam::dispatch::{Control, Dispatcher, FrameSink, SinkContext, StopSignal};
use tycam::{
    CameraBackend, ComponentId, DeviceHandle, DeviceInfo, DeviceSelector, Frame, FrameBuffer, ImageMode, ImageView,
    Intrinsics, IrSide, Library, PixelFormat, Point3, RawFrame, Session, SimBackend, SimConfig, TyError, TyStatus,
    Version,
};

fn open(config: SimConfig) -> Session {
    Library::init(Box::new(SimBackend::new(config)))
        .unwrap()
        .open(&DeviceSelector::First)
        .unwrap()
}

fn fast() -> SimConfig {
    SimConfig {
        frame_interval_ms: 0,
        ..SimConfig::default()
    }
}

#[test]
fn opens_by_ip_and_reports_components() {
    let lib = Library::init(Box::new(SimBackend::new(fast()))).unwrap();
    let session = lib.open(&DeviceSelector::Ip("192.168.1.200".into())).unwrap();
    assert_eq!(session.info().map(|i| i.id.as_str()), Some("sim-0"));
    for c in [
        ComponentId::DEPTH,
        ComponentId::IR_LEFT,
        ComponentId::IR_RIGHT,
        ComponentId::RGB,
        ComponentId::POINT3D,
    ] {
        assert!(session.has(c), "missing {}", c);
    }
}

#[test]
fn unknown_ip_fails_to_open() {
    let lib = Library::init(Box::new(SimBackend::new(fast()))).unwrap();
    assert!(lib.open(&DeviceSelector::Ip("10.9.9.9".into())).is_err());
}

#[test]
fn frame_holds_every_enabled_image() {
    let session = open(fast());
    session
        .enable(ComponentId::DEPTH | ComponentId::IR_LEFT | ComponentId::IR_RIGHT | ComponentId::RGB)
        .unwrap();
    assert!(session.set_image_mode(ComponentId::DEPTH, ImageMode::VGA).unwrap());
    session.prepare_buffers(2, 640 * 480 * 2).unwrap();
    session.start().unwrap();
    assert!(session.is_capturing());

    let frame = session.fetch(None).unwrap().unwrap();
    assert_eq!(frame.len(), 4);
    let depth = frame.depth().unwrap();
    assert_eq!((depth.width, depth.height), (640, 480));
    assert_eq!(frame.ir(IrSide::Left).unwrap().bytes().len(), 640 * 480);
    let color = frame.color().unwrap();
    assert_eq!(color.format, PixelFormat::Yuv422);
    assert_eq!(color.to_rgb().dimensions(), (640, 480));
    assert!(frame.images().all(|v| !matches!(v, ImageView::Other(_))));
    frame.release().unwrap();

    session.close().unwrap();
}

#[test]
fn refused_image_mode_keeps_the_default() {
    let session = open(SimConfig {
        image_mode_permitted: false,
        ..fast()
    });
    session.enable(ComponentId::DEPTH).unwrap();
    assert!(!session.set_image_mode(ComponentId::DEPTH, ImageMode::QVGA).unwrap());
    assert_eq!(session.image_size(ComponentId::DEPTH).unwrap(), (640, 480));
}

#[test]
fn unsupported_image_mode_is_an_error() {
    let session = open(fast());
    let err = session
        .set_image_mode(ComponentId::DEPTH, ImageMode::new(123, 45))
        .unwrap_err();
    assert_eq!(err.status(), Some(TyStatus::InvalidParameter));
}

#[test]
fn starting_without_buffers_fails() {
    let session = open(fast());
    session.enable(ComponentId::DEPTH).unwrap();
    let err = session.start().unwrap_err();
    assert_eq!(err.status(), Some(TyStatus::NoBuffer));
}

#[test]
fn trigger_mode_times_out_without_a_trigger() {
    let session = open(fast());
    session.enable(ComponentId::DEPTH).unwrap();
    session.set_trigger_mode(true).unwrap();
    session.prepare_buffers(2, 0).unwrap();
    session.start().unwrap();
    assert!(session.fetch(Some(Duration::from_millis(10))).unwrap().is_none());
    session.send_soft_trigger().unwrap();
    assert!(session.fetch(Some(Duration::from_millis(10))).unwrap().is_some());
}

#[test]
fn fetch_after_stop_is_idle() {
    let session = open(fast());
    session.enable(ComponentId::DEPTH).unwrap();
    session.prepare_buffers(2, 0).unwrap();
    session.start().unwrap();
    session.stop().unwrap();
    let err = session.fetch(None).err().unwrap();
    assert!(matches!(err, TyError::Sdk { status: TyStatus::Idle, .. }));
}

struct CenterDepths(Arc<Mutex<Vec<u16>>>);

impl FrameSink for CenterDepths {
    fn on_frame(&mut self, _: &SinkContext<'_>, frame: &Frame) -> tycam::Result<Control> {
        if let Some(depth) = frame.depth() {
            self.0.lock().unwrap().push(depth.center());
        }
        Ok(Control::Continue)
    }
}

#[test]
fn dispatcher_reuses_two_buffers_for_many_frames() {
    let session = open(fast());
    session.enable(ComponentId::DEPTH).unwrap();
    session.prepare_buffers(2, 0).unwrap();
    session.start().unwrap();

    let centers = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::default();
    dispatcher
        .add_sink(CenterDepths(centers.clone()))
        .set_frame_limit(Some(20));
    let frames = dispatcher.run_polling(&session, &StopSignal::new(), None).unwrap();
    assert_eq!(frames, 20);
    assert_eq!(dispatcher.frames(), 20);

    let centers = centers.lock().unwrap();
    assert_eq!(centers.len(), 20);
    assert!(centers.iter().all(|&d| d > 0 && d < 10_000));
}

#[test]
fn session_moves_to_the_capture_thread() {
    let session = open(fast());
    session.enable(ComponentId::DEPTH | ComponentId::IR_LEFT).unwrap();
    session.prepare_buffers(2, 0).unwrap();
    session.start().unwrap();

    let centers = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::default();
    dispatcher
        .add_sink(CenterDepths(centers.clone()))
        .set_frame_limit(Some(5));
    assert_eq!(dispatcher.run_callback(session, StopSignal::new()).unwrap(), 5);
    assert_eq!(centers.lock().unwrap().len(), 5);
}

/// Delivers its first `bad_frames` frames with a depth image that claims to
/// run past the end of the buffer.
struct Corrupting {
    inner: SimBackend,
    bad_frames: usize,
}

impl CameraBackend for Corrupting {
    fn name(&self) -> &'static str {
        "corrupting"
    }
    fn init(&mut self) -> tycam::Result<()> {
        self.inner.init()
    }
    fn deinit(&mut self) -> tycam::Result<()> {
        self.inner.deinit()
    }
    fn lib_version(&self) -> tycam::Result<Version> {
        self.inner.lib_version()
    }
    fn device_list(&mut self) -> tycam::Result<Vec<DeviceInfo>> {
        self.inner.device_list()
    }
    fn open_by_id(&mut self, id: &str) -> tycam::Result<DeviceHandle> {
        self.inner.open_by_id(id)
    }
    fn open_by_ip(&mut self, ip: &str) -> tycam::Result<DeviceHandle> {
        self.inner.open_by_ip(ip)
    }
    fn close(&mut self, handle: DeviceHandle) -> tycam::Result<()> {
        self.inner.close(handle)
    }
    fn component_ids(&self, handle: DeviceHandle) -> tycam::Result<ComponentId> {
        self.inner.component_ids(handle)
    }
    fn enabled_components(&self, handle: DeviceHandle) -> tycam::Result<ComponentId> {
        self.inner.enabled_components(handle)
    }
    fn enable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> tycam::Result<()> {
        self.inner.enable_components(handle, components)
    }
    fn disable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> tycam::Result<()> {
        self.inner.disable_components(handle, components)
    }
    fn get_int(&self, handle: DeviceHandle, component: ComponentId, feature: Feature) -> tycam::Result<i32> {
        self.inner.get_int(handle, component, feature)
    }
    fn set_bool(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: bool,
    ) -> tycam::Result<()> {
        self.inner.set_bool(handle, component, feature, value)
    }
    fn set_enum(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: i32,
    ) -> tycam::Result<()> {
        self.inner.set_enum(handle, component, feature, value)
    }
    fn intrinsics(&self, handle: DeviceHandle, component: ComponentId) -> tycam::Result<Intrinsics> {
        self.inner.intrinsics(handle, component)
    }
    fn frame_buffer_size(&self, handle: DeviceHandle) -> tycam::Result<usize> {
        self.inner.frame_buffer_size(handle)
    }
    fn enqueue_buffer(&mut self, handle: DeviceHandle, buffer: FrameBuffer) -> tycam::Result<()> {
        self.inner.enqueue_buffer(handle, buffer)
    }
    fn clear_buffer_queue(&mut self, handle: DeviceHandle) -> tycam::Result<Vec<FrameBuffer>> {
        self.inner.clear_buffer_queue(handle)
    }
    fn start_capture(&mut self, handle: DeviceHandle) -> tycam::Result<()> {
        self.inner.start_capture(handle)
    }
    fn stop_capture(&mut self, handle: DeviceHandle) -> tycam::Result<()> {
        self.inner.stop_capture(handle)
    }
    fn send_soft_trigger(&mut self, handle: DeviceHandle) -> tycam::Result<()> {
        self.inner.send_soft_trigger(handle)
    }
    fn fetch_frame(&mut self, handle: DeviceHandle, timeout: Option<Duration>) -> tycam::Result<RawFrame> {
        let mut raw = self.inner.fetch_frame(handle, timeout)?;
        if self.bad_frames > 0 {
            self.bad_frames -= 1;
            raw.images[0].size = usize::MAX / 2;
        }
        Ok(raw)
    }
    fn register_world_to_color(
        &mut self,
        handle: DeviceHandle,
        points: &[Point3],
        color_size: (u32, u32),
    ) -> tycam::Result<Vec<u16>> {
        self.inner.register_world_to_color(handle, points, color_size)
    }
}

fn open_corrupting(bad_frames: usize) -> Session {
    let backend = Corrupting {
        inner: SimBackend::new(fast()),
        bad_frames,
    };
    let session = Library::init(Box::new(backend))
        .unwrap()
        .open(&DeviceSelector::First)
        .unwrap();
    session.enable(ComponentId::DEPTH).unwrap();
    session.prepare_buffers(2, 0).unwrap();
    session.start().unwrap();
    session
}

#[test]
fn malformed_frames_give_their_buffer_back() {
    let session = open_corrupting(2);
    for _ in 0..2 {
        let err = session.fetch(None).err().unwrap();
        assert!(matches!(err, TyError::InvalidFrame(_)));
    }

    // both slots are queued again, so two frames can be held at once
    let a = session.fetch(None).unwrap().unwrap();
    let b = session.fetch(None).unwrap().unwrap();
    assert_ne!(a.slot(), b.slot());
    assert!(a.depth().unwrap().center() > 0);
}

#[test]
fn polling_keeps_dispatching_after_dropped_frames() {
    let session = open_corrupting(3);
    let centers = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::default();
    dispatcher
        .add_sink(CenterDepths(centers.clone()))
        .set_frame_limit(Some(4));
    let frames = dispatcher.run_polling(&session, &StopSignal::new(), None).unwrap();
    assert_eq!(frames, 4);
    assert_eq!(centers.lock().unwrap().len(), 4);
}
