//! The seam between the safe wrapper and whatever produces frames.
//!
//! [`CameraBackend`] mirrors the SDK calls the tools need. The native
//! implementation forwards to libtycam; the simulated one generates frames
//! in-process with the same buffer and lifecycle contract.

use std::time::Duration;

use crate::buffer::FrameBuffer;
use crate::common::{ComponentId, DeviceInfo, Feature, Intrinsics, PixelFormat, Version};
use crate::error::Result;
use crate::pointcloud::Point3;

/// Opaque session identifier returned by `open` and required by every other call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub(crate) usize);

/// Location and shape of one sub-image inside a frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    pub component: ComponentId,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Byte offset from the start of the frame buffer
    pub offset: usize,
    pub size: usize,
    pub timestamp: u64,
    pub index: i32,
}

/// A filled buffer handed back by the backend.
#[derive(Debug)]
pub struct RawFrame {
    pub buffer: FrameBuffer,
    pub images: Vec<ImageDesc>,
}

pub trait CameraBackend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn init(&mut self) -> Result<()>;
    fn deinit(&mut self) -> Result<()>;
    fn lib_version(&self) -> Result<Version>;

    fn device_list(&mut self) -> Result<Vec<DeviceInfo>>;
    fn open_by_id(&mut self, id: &str) -> Result<DeviceHandle>;
    fn open_by_ip(&mut self, ip: &str) -> Result<DeviceHandle>;
    fn close(&mut self, handle: DeviceHandle) -> Result<()>;

    fn component_ids(&self, handle: DeviceHandle) -> Result<ComponentId>;
    fn enabled_components(&self, handle: DeviceHandle) -> Result<ComponentId>;
    fn enable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()>;
    fn disable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()>;

    fn get_int(&self, handle: DeviceHandle, component: ComponentId, feature: Feature) -> Result<i32>;
    fn set_bool(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: bool,
    ) -> Result<()>;
    /// Fails with [`crate::TyStatus::NotPermitted`] when the device keeps the
    /// feature on another component; callers decide whether that is fatal.
    fn set_enum(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: i32,
    ) -> Result<()>;
    fn intrinsics(&self, handle: DeviceHandle, component: ComponentId) -> Result<Intrinsics>;

    /// Bytes needed to hold one frame of the currently enabled components.
    fn frame_buffer_size(&self, handle: DeviceHandle) -> Result<usize>;
    fn enqueue_buffer(&mut self, handle: DeviceHandle, buffer: FrameBuffer) -> Result<()>;
    /// Drops every queued buffer from the capture queue and hands it back.
    fn clear_buffer_queue(&mut self, handle: DeviceHandle) -> Result<Vec<FrameBuffer>>;

    fn start_capture(&mut self, handle: DeviceHandle) -> Result<()>;
    fn stop_capture(&mut self, handle: DeviceHandle) -> Result<()>;
    fn send_soft_trigger(&mut self, handle: DeviceHandle) -> Result<()>;

    /// Blocks for the next frame; `None` waits indefinitely.
    fn fetch_frame(&mut self, handle: DeviceHandle, timeout: Option<Duration>) -> Result<RawFrame>;

    /// Project world points (depth camera coordinates, millimeters) into the
    /// color camera's pixel grid. Returns a `width * height` depth map.
    fn register_world_to_color(
        &mut self,
        handle: DeviceHandle,
        points: &[Point3],
        color_size: (u32, u32),
    ) -> Result<Vec<u16>>;
}
