use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{CameraBackend, DeviceHandle};
use crate::buffer::BufferPool;
use crate::common::{ComponentId, DeviceInfo, Feature, ImageMode, Intrinsics, Version};
use crate::error::{Result, TyError, TyStatus};
use crate::frame::{self, Frame};
use crate::pointcloud::Point3;

/// Which device to open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelector {
    /// First enumerated device
    #[default]
    First,
    Id(String),
    Ip(String),
}

/// Initialized SDK, ready to enumerate and open devices.
pub struct Library {
    backend: Box<dyn CameraBackend>,
    version: Version,
}

impl Library {
    pub fn init(mut backend: Box<dyn CameraBackend>) -> Result<Self> {
        debug!("=== Init lib ({})", backend.name());
        backend.init()?;
        let version = backend.lib_version()?;
        debug!("     - lib version: {}", version);
        Ok(Self { backend, version })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn devices(&mut self) -> Result<Vec<DeviceInfo>> {
        debug!("=== Get device info");
        let devices = self.backend.device_list()?;
        debug!("     - device number {}", devices.len());
        Ok(devices)
    }

    /// Open one device; the session takes over the library.
    pub fn open(mut self, selector: &DeviceSelector) -> Result<Session> {
        let (handle, info) = match selector {
            DeviceSelector::Ip(ip) => {
                debug!("=== Open device {}", ip);
                let handle = self.backend.open_by_ip(ip)?;
                let info = self
                    .backend
                    .device_list()
                    .ok()
                    .and_then(|list| list.into_iter().find(|d| d.ip.as_deref() == Some(ip.as_str())));
                (handle, info)
            }
            DeviceSelector::Id(id) => {
                let devices = self.devices()?;
                let info = devices
                    .into_iter()
                    .find(|d| &d.id == id)
                    .ok_or_else(|| TyError::DeviceNotFound(id.clone()))?;
                debug!("=== Open device: {}", id);
                (self.backend.open_by_id(id)?, Some(info))
            }
            DeviceSelector::First => {
                let info = self.devices()?.into_iter().next().ok_or_else(|| {
                    debug!("=== No device got");
                    TyError::NoDevice
                })?;
                debug!("=== Open device: {}", info.id);
                (self.backend.open_by_id(&info.id)?, Some(info))
            }
        };

        let components = self.backend.component_ids(handle)?;
        debug!("     - components: {}", components);
        Ok(Session {
            inner: Mutex::new(Inner {
                backend: self.backend,
                capturing: false,
                closed: false,
            }),
            handle,
            info,
            components,
        })
    }
}

struct Inner {
    backend: Box<dyn CameraBackend>,
    capturing: bool,
    closed: bool,
}

/// An open device.
///
/// All calls go through an internal lock, so a [`FrameGuard`] can be held
/// while other session calls (such as registration) are made. Dropping the
/// session stops capture, closes the device and shuts the library down.
pub struct Session {
    inner: Mutex<Inner>,
    handle: DeviceHandle,
    info: Option<DeviceInfo>,
    components: ComponentId,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Every component the device offers.
    pub fn components(&self) -> ComponentId {
        self.components
    }

    pub fn has(&self, component: ComponentId) -> bool {
        self.components.contains(component)
    }

    pub fn enabled(&self) -> Result<ComponentId> {
        self.lock().backend.enabled_components(self.handle)
    }

    pub fn enable(&self, components: ComponentId) -> Result<()> {
        if let Some(missing) = components.iter().find(|c| !self.has(*c)) {
            return Err(TyError::MissingComponent(missing));
        }
        debug!("=== Configure components, enable {}", components);
        self.lock().backend.enable_components(self.handle, components)
    }

    /// Enable `component` only if the device has it.
    pub fn enable_if_present(&self, component: ComponentId) -> Result<bool> {
        if !self.has(component) {
            return Ok(false);
        }
        debug!("=== Has {} camera, enable it", component);
        self.lock().backend.enable_components(self.handle, component)?;
        Ok(true)
    }

    pub fn disable(&self, components: ComponentId) -> Result<()> {
        self.lock().backend.disable_components(self.handle, components)
    }

    /// Request a resolution. Returns `false` when the device refuses the
    /// change as not permitted, which is not an error.
    pub fn set_image_mode(&self, component: ComponentId, mode: ImageMode) -> Result<bool> {
        debug!("=== Configure feature, set resolution to {}", mode);
        match self
            .lock()
            .backend
            .set_enum(self.handle, component, Feature::IMAGE_MODE, mode.as_raw())
        {
            Ok(()) => Ok(true),
            Err(e) if e.status() == Some(TyStatus::NotPermitted) => {
                debug!("     - image mode is not permitted on {}, keeping the default", component);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_trigger_mode(&self, enabled: bool) -> Result<()> {
        debug!("=== {} trigger mode", if enabled { "Enable" } else { "Disable" });
        self.lock()
            .backend
            .set_bool(self.handle, ComponentId::DEVICE, Feature::TRIGGER_MODE, enabled)
    }

    pub fn send_soft_trigger(&self) -> Result<()> {
        self.lock().backend.send_soft_trigger(self.handle)
    }

    pub fn image_size(&self, component: ComponentId) -> Result<(u32, u32)> {
        let inner = self.lock();
        let w = inner.backend.get_int(self.handle, component, Feature::WIDTH)?;
        let h = inner.backend.get_int(self.handle, component, Feature::HEIGHT)?;
        Ok((w.max(0) as u32, h.max(0) as u32))
    }

    pub fn intrinsics(&self, component: ComponentId) -> Result<Intrinsics> {
        self.lock().backend.intrinsics(self.handle, component)
    }

    /// Allocate `count` buffers sized for the enabled components and
    /// enqueue them. Fails when the device reports less than `min_size`.
    pub fn prepare_buffers(&self, count: usize, min_size: usize) -> Result<usize> {
        debug!("=== Prepare image buffer");
        let mut inner = self.lock();
        let size = inner.backend.frame_buffer_size(self.handle)?;
        debug!("     - Get size of framebuffer, {}", size);
        if size < min_size.max(1) {
            return Err(TyError::BufferTooSmall {
                required: min_size.max(1),
                actual: size,
            });
        }
        debug!("     - Allocate & enqueue {} buffers", count);
        let pool = BufferPool::allocate(size, count)?;
        pool.enqueue_all(inner.backend.as_mut(), self.handle)?;
        Ok(size)
    }

    pub fn start(&self) -> Result<()> {
        debug!("=== Start capture");
        let mut inner = self.lock();
        inner.backend.start_capture(self.handle)?;
        inner.capturing = true;
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.capturing {
            return Ok(());
        }
        debug!("=== Stop capture");
        inner.capturing = false;
        inner.backend.stop_capture(self.handle)
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    /// Wait for the next frame. `None` waits indefinitely; a timeout yields
    /// `Ok(None)`.
    pub fn fetch(&self, timeout: Option<Duration>) -> Result<Option<FrameGuard<'_>>> {
        let raw = match self.lock().backend.fetch_frame(self.handle, timeout) {
            Ok(raw) => raw,
            Err(e) if e.status() == Some(TyStatus::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };
        if let Err(e) = frame::validate(raw.buffer.len(), &raw.images) {
            warn!("discarding malformed frame in slot {}", raw.buffer.slot());
            if let Err(requeue) = self.lock().backend.enqueue_buffer(self.handle, raw.buffer) {
                warn!("failed to re-enqueue a discarded buffer: {}", requeue);
            }
            return Err(e);
        }
        let frame = Frame::new(raw)?;
        Ok(Some(FrameGuard {
            session: self,
            frame: Some(frame),
        }))
    }

    /// Give a frame's buffer back to the capture queue.
    pub fn requeue(&self, frame: Frame) -> Result<()> {
        let buffer = frame.into_buffer();
        debug!("=== Re-enqueue buffer(slot {}, {})", buffer.slot(), buffer.len());
        self.lock().backend.enqueue_buffer(self.handle, buffer)
    }

    /// Project world points into the color camera; returns a depth map of
    /// `color_size`.
    pub fn register_world_to_color(&self, points: &[Point3], color_size: (u32, u32)) -> Result<Vec<u16>> {
        self.lock()
            .backend
            .register_world_to_color(self.handle, points, color_size)
    }

    /// Stop, close and shut down, reporting the first error.
    pub fn close(self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        let mut first_err = None;
        if inner.capturing {
            inner.capturing = false;
            if let Err(e) = inner.backend.stop_capture(self.handle) {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = inner.backend.clear_buffer_queue(self.handle) {
            first_err.get_or_insert(e);
        }
        if let Err(e) = inner.backend.close(self.handle) {
            first_err.get_or_insert(e);
        }
        if let Err(e) = inner.backend.deinit() {
            first_err.get_or_insert(e);
        }
        info!("device closed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("error while closing device: {}", e);
        }
    }
}

/// A fetched frame that goes back to the capture queue when dropped.
pub struct FrameGuard<'a> {
    session: &'a Session,
    frame: Option<Frame>,
}

impl FrameGuard<'_> {
    /// Re-enqueue now and report failures.
    pub fn release(mut self) -> Result<()> {
        match self.frame.take() {
            Some(frame) => self.session.requeue(frame),
            None => Ok(()),
        }
    }
}

impl Deref for FrameGuard<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        // only `release` and `drop` take the frame, and both consume the guard
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("frame guard used after release"),
        }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            if let Err(e) = self.session.requeue(frame) {
                warn!("failed to re-enqueue frame buffer: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBackend, SimConfig};

    fn sim_session() -> Session {
        let backend = SimBackend::new(SimConfig {
            frame_interval_ms: 0,
            ..SimConfig::default()
        });
        Library::init(Box::new(backend))
            .unwrap()
            .open(&DeviceSelector::First)
            .unwrap()
    }

    #[test]
    fn unknown_id_is_reported() {
        let lib = Library::init(Box::new(SimBackend::default())).unwrap();
        let err = lib.open(&DeviceSelector::Id("nope".into())).err().unwrap();
        assert!(matches!(err, TyError::DeviceNotFound(id) if id == "nope"));
    }

    #[test]
    fn no_devices_means_no_device_error() {
        let backend = SimBackend::new(SimConfig {
            devices: Vec::new(),
            ..SimConfig::default()
        });
        let lib = Library::init(Box::new(backend)).unwrap();
        assert!(matches!(lib.open(&DeviceSelector::First), Err(TyError::NoDevice)));
    }

    #[test]
    fn guard_returns_buffer_on_drop() {
        let session = sim_session();
        session.enable(ComponentId::DEPTH).unwrap();
        session.prepare_buffers(1, 640 * 480 * 2).unwrap();
        session.start().unwrap();
        for _ in 0..3 {
            let frame = session.fetch(None).unwrap().unwrap();
            assert!(frame.depth().is_some());
        }
        session.close().unwrap();
    }

    #[test]
    fn held_frames_starve_the_queue() {
        let session = sim_session();
        session.enable(ComponentId::DEPTH).unwrap();
        session.prepare_buffers(2, 0).unwrap();
        session.start().unwrap();
        let a = session.fetch(None).unwrap().unwrap();
        let b = session.fetch(None).unwrap().unwrap();
        let err = session.fetch(None).err().unwrap();
        assert_eq!(err.status(), Some(TyStatus::NoBuffer));
        a.release().unwrap();
        drop(b);
        assert!(session.fetch(None).unwrap().is_some());
    }

    #[test]
    fn small_frames_fail_the_size_check() {
        let session = sim_session();
        session.enable(ComponentId::DEPTH).unwrap();
        session.set_image_mode(ComponentId::DEPTH, ImageMode::QVGA).unwrap();
        let err = session.prepare_buffers(2, 640 * 480 * 2).unwrap_err();
        assert!(matches!(err, TyError::BufferTooSmall { .. }));
    }

    #[test]
    fn missing_component_is_refused() {
        let backend = SimBackend::new(SimConfig {
            with_rgb: false,
            ..SimConfig::default()
        });
        let session = Library::init(Box::new(backend))
            .unwrap()
            .open(&DeviceSelector::First)
            .unwrap();
        assert!(matches!(
            session.enable(ComponentId::RGB),
            Err(TyError::MissingComponent(c)) if c == ComponentId::RGB
        ));
        assert!(!session.enable_if_present(ComponentId::RGB).unwrap());
    }
}
