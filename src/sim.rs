//! Hardware-free camera.
//!
//! [`SimBackend`] follows the SDK's lifecycle rules (init before use,
//! buffers enqueued before capture, fetch fails with `NO_BUFFER` on an
//! empty queue) and renders a synthetic scene: a tilted back wall with a
//! sphere swinging in front of it. Depth, both IR images, color and the
//! point cloud are raycast from the same scene, so they agree with each
//! other the way real sensor output does.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::{CameraBackend, DeviceHandle, ImageDesc, RawFrame};
use crate::buffer::FrameBuffer;
use crate::common::{
    ComponentId, DeviceInfo, DeviceInterface, Feature, ImageMode, Intrinsics, PixelFormat, Version,
};
use crate::error::{Result, TyError, TyStatus};
use crate::pointcloud::{Point3, depth_to_world};

/// Offset of the color camera from the depth camera along x, in millimeters.
pub const COLOR_BASELINE_MM: f32 = 25.0;

const SUPPORTED_MODES: [ImageMode; 3] = [ImageMode::QVGA, ImageMode::VGA, ImageMode::SXGA];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimColorFormat {
    Yuv422,
    Rgb888,
}

impl SimColorFormat {
    fn pixel_format(self) -> PixelFormat {
        match self {
            SimColorFormat::Yuv422 => PixelFormat::Yuv422,
            SimColorFormat::Rgb888 => PixelFormat::Rgb888,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimDeviceSpec {
    pub id: String,
    pub model: String,
    /// Network devices can be opened by address.
    pub ip: Option<String>,
}

/// Parameters of the simulated devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub devices: Vec<SimDeviceSpec>,
    pub with_rgb: bool,
    pub color_format: SimColorFormat,
    pub color_mode: ImageMode,
    /// IR resolution; follows the depth image mode when unset.
    pub ir_mode: Option<ImageMode>,
    /// Initial depth resolution.
    pub depth_mode: ImageMode,
    /// Whether the depth component accepts image mode changes.
    pub image_mode_permitted: bool,
    /// Minimum time between frames; 0 delivers frames as fast as they are fetched.
    pub frame_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            devices: vec![SimDeviceSpec {
                id: "sim-0".into(),
                model: "SIM-DS460".into(),
                ip: Some("192.168.1.200".into()),
            }],
            with_rgb: true,
            color_format: SimColorFormat::Yuv422,
            color_mode: ImageMode::VGA,
            ir_mode: None,
            depth_mode: ImageMode::VGA,
            image_mode_permitted: true,
            frame_interval_ms: 33,
        }
    }
}

impl SimConfig {
    fn components(&self) -> ComponentId {
        let mut ids = ComponentId::DEVICE
            | ComponentId::DEPTH
            | ComponentId::POINT3D
            | ComponentId::IR_LEFT
            | ComponentId::IR_RIGHT;
        if self.with_rgb {
            ids |= ComponentId::RGB;
        }
        ids
    }
}

#[derive(Debug)]
struct OpenDevice {
    index: usize,
    enabled: ComponentId,
    depth_mode: ImageMode,
    trigger_mode: bool,
    capturing: bool,
    queue: VecDeque<FrameBuffer>,
    pending_triggers: usize,
    frame_index: u64,
    last_frame: Option<Instant>,
}

/// In-process stand-in for the camera SDK.
#[derive(Debug)]
pub struct SimBackend {
    config: SimConfig,
    inited: bool,
    open: HashMap<usize, OpenDevice>,
    next_handle: usize,
    started: Instant,
}

fn fail<T>(call: &'static str, status: TyStatus) -> Result<T> {
    Err(TyError::sdk(call, status))
}

impl SimBackend {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            inited: false,
            open: HashMap::new(),
            next_handle: 1,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of buffers currently waiting in a device's capture queue.
    pub fn queued_buffers(&self, handle: DeviceHandle) -> usize {
        self.open.get(&handle.0).map_or(0, |d| d.queue.len())
    }

    fn ensure_init(&self, call: &'static str) -> Result<()> {
        if self.inited {
            Ok(())
        } else {
            fail(call, TyStatus::NotInited)
        }
    }

    fn device(&self, call: &'static str, handle: DeviceHandle) -> Result<&OpenDevice> {
        self.ensure_init(call)?;
        match self.open.get(&handle.0) {
            Some(dev) => Ok(dev),
            None => fail(call, TyStatus::InvalidHandle),
        }
    }

    fn device_mut(&mut self, call: &'static str, handle: DeviceHandle) -> Result<&mut OpenDevice> {
        self.ensure_init(call)?;
        match self.open.get_mut(&handle.0) {
            Some(dev) => Ok(dev),
            None => fail(call, TyStatus::InvalidHandle),
        }
    }

    fn open_index(&mut self, call: &'static str, index: usize) -> Result<DeviceHandle> {
        if self.open.values().any(|d| d.index == index) {
            return fail(call, TyStatus::Busy);
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.open.insert(
            handle,
            OpenDevice {
                index,
                enabled: ComponentId::NONE,
                depth_mode: self.config.depth_mode,
                trigger_mode: false,
                capturing: false,
                queue: VecDeque::new(),
                pending_triggers: 0,
                frame_index: 0,
                last_frame: None,
            },
        );
        debug!("sim: opened {} as handle {}", self.config.devices[index].id, handle);
        Ok(DeviceHandle(handle))
    }

    fn mode_of(&self, dev: &OpenDevice, component: ComponentId) -> ImageMode {
        if component == ComponentId::RGB {
            self.config.color_mode
        } else if component == ComponentId::IR_LEFT || component == ComponentId::IR_RIGHT {
            self.config.ir_mode.unwrap_or(dev.depth_mode)
        } else {
            dev.depth_mode
        }
    }

    fn format_of(&self, component: ComponentId) -> PixelFormat {
        if component == ComponentId::DEPTH {
            PixelFormat::Depth16
        } else if component == ComponentId::POINT3D {
            PixelFormat::Point3D
        } else if component == ComponentId::RGB {
            self.config.color_format.pixel_format()
        } else {
            PixelFormat::Mono8
        }
    }

    /// Image descriptors for the enabled components, in delivery order.
    fn layout(&self, dev: &OpenDevice) -> Vec<ImageDesc> {
        let order = [
            ComponentId::DEPTH,
            ComponentId::IR_LEFT,
            ComponentId::IR_RIGHT,
            ComponentId::RGB,
            ComponentId::POINT3D,
        ];
        let mut offset = 0;
        let mut images = Vec::new();
        for component in order {
            if !dev.enabled.contains(component) {
                continue;
            }
            let mode = self.mode_of(dev, component);
            let format = self.format_of(component);
            let size = mode.pixels() * format.bytes_per_pixel().unwrap_or(1);
            images.push(ImageDesc {
                component,
                format,
                width: mode.width,
                height: mode.height,
                offset,
                size,
                timestamp: 0,
                index: 0,
            });
            offset += size.next_multiple_of(8);
        }
        images
    }

    fn render(&self, dev: &OpenDevice, buffer: &mut FrameBuffer, images: &[ImageDesc]) {
        let scene = Scene::at_frame(dev.frame_index);
        let bytes = buffer.as_mut_slice();
        for desc in images {
            let out = &mut bytes[desc.offset..desc.offset + desc.size];
            let mode = ImageMode::new(desc.width, desc.height);
            let intr = sim_intrinsics(mode);
            if desc.component == ComponentId::DEPTH {
                for (i, px) in out.chunks_exact_mut(2).enumerate() {
                    let d = scene.depth_px(&intr, mode, i);
                    px.copy_from_slice(&d.to_ne_bytes());
                }
            } else if desc.component == ComponentId::POINT3D {
                for (i, px) in out.chunks_exact_mut(12).enumerate() {
                    let d = scene.depth_px(&intr, mode, i);
                    let p = if d == 0 {
                        Point3::default()
                    } else {
                        let (u, v) = pixel(mode, i);
                        depth_to_world(&intr, u as f32, v as f32, d as f32)
                    };
                    px.copy_from_slice(bytemuck::bytes_of(&p));
                }
            } else if desc.component == ComponentId::RGB {
                let rgb: Vec<[u8; 3]> = (0..mode.pixels())
                    .map(|i| scene.color_px(&intr, mode, i))
                    .collect();
                match desc.format {
                    PixelFormat::Yuv422 => encode_yvyu(&rgb, out),
                    _ => out.copy_from_slice(bytemuck::cast_slice(&rgb)),
                }
            } else {
                let seed = if desc.component == ComponentId::IR_LEFT { 0x1f } else { 0x2e };
                for (i, px) in out.iter_mut().enumerate() {
                    *px = scene.ir_px(&intr, mode, i, seed ^ dev.frame_index);
                }
            }
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl CameraBackend for SimBackend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn init(&mut self) -> Result<()> {
        self.inited = true;
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.ensure_init("TYDeinitLib")?;
        self.open.clear();
        self.inited = false;
        Ok(())
    }

    fn lib_version(&self) -> Result<Version> {
        self.ensure_init("TYLibVersion")?;
        Ok(Version {
            major: 2,
            minor: 6,
            patch: 0,
        })
    }

    fn device_list(&mut self) -> Result<Vec<DeviceInfo>> {
        self.ensure_init("TYGetDeviceList")?;
        Ok(self
            .config
            .devices
            .iter()
            .map(|spec| DeviceInfo {
                id: spec.id.clone(),
                interface: if spec.ip.is_some() {
                    DeviceInterface::Ethernet
                } else {
                    DeviceInterface::Usb
                },
                vendor: "Simulated".into(),
                model: spec.model.clone(),
                ip: spec.ip.clone(),
                hardware_version: Version {
                    major: 1,
                    minor: 0,
                    patch: 0,
                },
                firmware_version: Version {
                    major: 3,
                    minor: 2,
                    patch: 1,
                },
            })
            .collect())
    }

    fn open_by_id(&mut self, id: &str) -> Result<DeviceHandle> {
        self.ensure_init("TYOpenDevice")?;
        match self.config.devices.iter().position(|d| d.id == id) {
            Some(index) => self.open_index("TYOpenDevice", index),
            None => fail("TYOpenDevice", TyStatus::InvalidParameter),
        }
    }

    fn open_by_ip(&mut self, ip: &str) -> Result<DeviceHandle> {
        self.ensure_init("TYOpenDeviceWithIP")?;
        match self
            .config
            .devices
            .iter()
            .position(|d| d.ip.as_deref() == Some(ip))
        {
            Some(index) => self.open_index("TYOpenDeviceWithIP", index),
            None => fail("TYOpenDeviceWithIP", TyStatus::DeviceError),
        }
    }

    fn close(&mut self, handle: DeviceHandle) -> Result<()> {
        self.device("TYCloseDevice", handle)?;
        self.open.remove(&handle.0);
        Ok(())
    }

    fn component_ids(&self, handle: DeviceHandle) -> Result<ComponentId> {
        self.device("TYGetComponentIDs", handle)?;
        Ok(self.config.components())
    }

    fn enabled_components(&self, handle: DeviceHandle) -> Result<ComponentId> {
        Ok(self.device("TYGetEnabledComponents", handle)?.enabled)
    }

    fn enable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()> {
        let available = self.config.components();
        let dev = self.device_mut("TYEnableComponents", handle)?;
        if dev.capturing {
            return fail("TYEnableComponents", TyStatus::Busy);
        }
        if components.is_empty() || !available.contains(components) {
            return fail("TYEnableComponents", TyStatus::InvalidComponent);
        }
        dev.enabled |= components;
        Ok(())
    }

    fn disable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()> {
        let dev = self.device_mut("TYDisableComponents", handle)?;
        if dev.capturing {
            return fail("TYDisableComponents", TyStatus::Busy);
        }
        dev.enabled = dev.enabled.without(components);
        Ok(())
    }

    fn get_int(&self, handle: DeviceHandle, component: ComponentId, feature: Feature) -> Result<i32> {
        let dev = self.device("TYGetInt", handle)?;
        if !self.config.components().contains(component) || component == ComponentId::DEVICE {
            return fail("TYGetInt", TyStatus::InvalidComponent);
        }
        let mode = self.mode_of(dev, component);
        match feature {
            Feature::WIDTH => Ok(mode.width as i32),
            Feature::HEIGHT => Ok(mode.height as i32),
            Feature::IMAGE_MODE => Ok(mode.as_raw()),
            _ => fail("TYGetInt", TyStatus::InvalidFeature),
        }
    }

    fn set_bool(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: bool,
    ) -> Result<()> {
        let dev = self.device_mut("TYSetBool", handle)?;
        if feature != Feature::TRIGGER_MODE {
            return fail("TYSetBool", TyStatus::InvalidFeature);
        }
        if component != ComponentId::DEVICE {
            return fail("TYSetBool", TyStatus::InvalidComponent);
        }
        if dev.capturing {
            return fail("TYSetBool", TyStatus::Busy);
        }
        dev.trigger_mode = value;
        Ok(())
    }

    fn set_enum(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: i32,
    ) -> Result<()> {
        let permitted = self.config.image_mode_permitted;
        let dev = self.device_mut("TYSetEnum", handle)?;
        if feature != Feature::IMAGE_MODE {
            return fail("TYSetEnum", TyStatus::InvalidFeature);
        }
        if component != ComponentId::DEPTH {
            return fail("TYSetEnum", TyStatus::NotPermitted);
        }
        if !permitted {
            return fail("TYSetEnum", TyStatus::NotPermitted);
        }
        if dev.capturing {
            return fail("TYSetEnum", TyStatus::Busy);
        }
        let mode = ImageMode::from_raw(value);
        if !SUPPORTED_MODES.contains(&mode) {
            return fail("TYSetEnum", TyStatus::InvalidParameter);
        }
        dev.depth_mode = mode;
        Ok(())
    }

    fn intrinsics(&self, handle: DeviceHandle, component: ComponentId) -> Result<Intrinsics> {
        let dev = self.device("TYGetStruct", handle)?;
        if component == ComponentId::DEVICE || !self.config.components().contains(component) {
            return fail("TYGetStruct", TyStatus::InvalidComponent);
        }
        Ok(sim_intrinsics(self.mode_of(dev, component)))
    }

    fn frame_buffer_size(&self, handle: DeviceHandle) -> Result<usize> {
        let dev = self.device("TYGetFrameBufferSize", handle)?;
        Ok(self
            .layout(dev)
            .iter()
            .map(|d| d.size.next_multiple_of(8))
            .sum())
    }

    fn enqueue_buffer(&mut self, handle: DeviceHandle, buffer: FrameBuffer) -> Result<()> {
        let required = self.frame_buffer_size(handle)?;
        let dev = self.device_mut("TYEnqueueBuffer", handle)?;
        if buffer.len() < required {
            return fail("TYEnqueueBuffer", TyStatus::WrongSize);
        }
        dev.queue.push_back(buffer);
        Ok(())
    }

    fn clear_buffer_queue(&mut self, handle: DeviceHandle) -> Result<Vec<FrameBuffer>> {
        let dev = self.device_mut("TYClearBufferQueue", handle)?;
        if dev.capturing {
            return fail("TYClearBufferQueue", TyStatus::Busy);
        }
        Ok(dev.queue.drain(..).collect())
    }

    fn start_capture(&mut self, handle: DeviceHandle) -> Result<()> {
        let dev = self.device_mut("TYStartCapture", handle)?;
        if dev.capturing {
            return fail("TYStartCapture", TyStatus::Busy);
        }
        if dev.enabled.without(ComponentId::DEVICE).is_empty() {
            return fail("TYStartCapture", TyStatus::InvalidComponent);
        }
        if dev.queue.is_empty() {
            return fail("TYStartCapture", TyStatus::NoBuffer);
        }
        dev.capturing = true;
        dev.pending_triggers = 0;
        Ok(())
    }

    fn stop_capture(&mut self, handle: DeviceHandle) -> Result<()> {
        let dev = self.device_mut("TYStopCapture", handle)?;
        if !dev.capturing {
            return fail("TYStopCapture", TyStatus::Idle);
        }
        dev.capturing = false;
        Ok(())
    }

    fn send_soft_trigger(&mut self, handle: DeviceHandle) -> Result<()> {
        let dev = self.device_mut("TYSendSoftTrigger", handle)?;
        if !dev.trigger_mode {
            return fail("TYSendSoftTrigger", TyStatus::WrongMode);
        }
        if !dev.capturing {
            return fail("TYSendSoftTrigger", TyStatus::Idle);
        }
        dev.pending_triggers += 1;
        Ok(())
    }

    fn fetch_frame(&mut self, handle: DeviceHandle, timeout: Option<Duration>) -> Result<RawFrame> {
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        let dev = self.device_mut("TYFetchFrame", handle)?;
        if !dev.capturing {
            return fail("TYFetchFrame", TyStatus::Idle);
        }
        if dev.trigger_mode && dev.pending_triggers == 0 {
            std::thread::sleep(timeout.unwrap_or(Duration::ZERO).min(Duration::from_millis(10)));
            return fail("TYFetchFrame", TyStatus::Timeout);
        }
        if dev.queue.is_empty() {
            return fail("TYFetchFrame", TyStatus::NoBuffer);
        }
        if let Some(last) = dev.last_frame {
            let wait = interval.saturating_sub(last.elapsed());
            if let Some(limit) = timeout.filter(|limit| wait > *limit) {
                std::thread::sleep(limit);
                return fail("TYFetchFrame", TyStatus::Timeout);
            }
            std::thread::sleep(wait);
        }

        let Some(mut buffer) = dev.queue.pop_front() else {
            return fail("TYFetchFrame", TyStatus::NoBuffer);
        };
        if dev.trigger_mode {
            dev.pending_triggers -= 1;
        }
        dev.last_frame = Some(Instant::now());

        let dev = self.device("TYFetchFrame", handle)?;
        let timestamp = self.started.elapsed().as_micros() as u64;
        let mut images = self.layout(dev);
        for desc in &mut images {
            desc.timestamp = timestamp;
            desc.index = dev.frame_index as i32;
        }
        self.render(dev, &mut buffer, &images);
        trace!("sim: frame {} into slot {}", dev.frame_index, buffer.slot());

        if let Some(dev) = self.open.get_mut(&handle.0) {
            dev.frame_index += 1;
        }
        Ok(RawFrame { buffer, images })
    }

    fn register_world_to_color(
        &mut self,
        handle: DeviceHandle,
        points: &[Point3],
        color_size: (u32, u32),
    ) -> Result<Vec<u16>> {
        self.device("TYRegisterWorldToColor", handle)?;
        if !self.config.with_rgb {
            return fail("TYRegisterWorldToColor", TyStatus::InvalidComponent);
        }
        let (w, h) = color_size;
        let intr = sim_intrinsics(ImageMode::new(w, h));
        Ok(project_to_color(points, &intr, (w, h), COLOR_BASELINE_MM))
    }
}

/// Pinhole model shared by every simulated sensor: about 58 degrees of
/// horizontal field of view, principal point at the image center.
pub fn sim_intrinsics(mode: ImageMode) -> Intrinsics {
    let f = 0.904 * mode.width as f32;
    Intrinsics::new(f, f, mode.width as f32 / 2.0, mode.height as f32 / 2.0)
}

/// Project points onto a camera displaced by `baseline` mm along x.
///
/// Each output pixel keeps the nearest depth that lands on it; pixels no
/// point reaches stay 0.
pub fn project_to_color(
    points: &[Point3],
    intr: &Intrinsics,
    size: (u32, u32),
    baseline: f32,
) -> Vec<u16> {
    let (w, h) = size;
    let mut out = vec![0u16; w as usize * h as usize];
    for p in points.iter().filter(|p| p.is_valid()) {
        let u = (intr.fx() * (p.x - baseline) / p.z + intr.cx()).round();
        let v = (intr.fy() * p.y / p.z + intr.cy()).round();
        if u < 0.0 || v < 0.0 || u >= w as f32 || v >= h as f32 {
            continue;
        }
        let depth = p.z.round().min(u16::MAX as f32) as u16;
        let slot = &mut out[v as usize * w as usize + u as usize];
        if *slot == 0 || depth < *slot {
            *slot = depth;
        }
    }
    out
}

fn pixel(mode: ImageMode, i: usize) -> (u32, u32) {
    ((i % mode.width as usize) as u32, (i / mode.width as usize) as u32)
}

/// Cheap integer hash used for sensor speckle.
fn speckle(x: u32, y: u32, seed: u64) -> u32 {
    let mut h = (x as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (y as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f)
        ^ seed.wrapping_mul(0x1656_67b1_9e37_79f9);
    h ^= h >> 31;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 29;
    h as u32
}

enum Hit {
    Wall,
    Sphere,
}

struct Scene {
    sphere: [f32; 3],
    radius: f32,
}

impl Scene {
    const WALL_Z: f32 = 1800.0;
    const WALL_TILT: f32 = 0.35;

    fn at_frame(index: u64) -> Self {
        let phase = index as f32 * 0.08;
        Self {
            sphere: [260.0 * phase.sin(), 40.0, 1100.0 + 150.0 * phase.cos()],
            radius: 180.0,
        }
    }

    /// Cast a ray from `origin` along `(dx, dy, 1)`; returns the z of the hit.
    fn cast(&self, origin: [f32; 3], dx: f32, dy: f32) -> (f32, Hit) {
        let wall = (Self::WALL_Z + Self::WALL_TILT * origin[1] - origin[2]) / (1.0 - Self::WALL_TILT * dy);

        let oc = [
            self.sphere[0] - origin[0],
            self.sphere[1] - origin[1],
            self.sphere[2] - origin[2],
        ];
        let dd = dx * dx + dy * dy + 1.0;
        let b = dx * oc[0] + dy * oc[1] + oc[2];
        let c = oc[0] * oc[0] + oc[1] * oc[1] + oc[2] * oc[2] - self.radius * self.radius;
        let disc = b * b - dd * c;
        if disc >= 0.0 {
            let t = (b - disc.sqrt()) / dd;
            if t > 0.0 && t < wall {
                return (origin[2] + t, Hit::Sphere);
            }
        }
        (origin[2] + wall, Hit::Wall)
    }

    fn ray(intr: &Intrinsics, mode: ImageMode, i: usize) -> (u32, u32, f32, f32) {
        let (u, v) = pixel(mode, i);
        (
            u,
            v,
            (u as f32 - intr.cx()) / intr.fx(),
            (v as f32 - intr.cy()) / intr.fy(),
        )
    }

    fn depth_px(&self, intr: &Intrinsics, mode: ImageMode, i: usize) -> u16 {
        let (u, _, dx, dy) = Self::ray(intr, mode, i);
        // stereo dead band on both edges
        let band = mode.width / 32;
        if u < band || u >= mode.width - band {
            return 0;
        }
        let (z, _) = self.cast([0.0; 3], dx, dy);
        z.round().clamp(0.0, u16::MAX as f32) as u16
    }

    fn ir_px(&self, intr: &Intrinsics, mode: ImageMode, i: usize, seed: u64) -> u8 {
        let (u, v, dx, dy) = Self::ray(intr, mode, i);
        let (z, _) = self.cast([0.0; 3], dx, dy);
        let base = 255.0 - (z / 10.0).min(200.0);
        let noise = (speckle(u, v, seed) % 48) as f32 - 24.0;
        (base + noise).clamp(0.0, 255.0) as u8
    }

    fn color_px(&self, intr: &Intrinsics, mode: ImageMode, i: usize) -> [u8; 3] {
        let (_, _, dx, dy) = Self::ray(intr, mode, i);
        let (z, hit) = self.cast([COLOR_BASELINE_MM, 0.0, 0.0], dx, dy);
        match hit {
            Hit::Sphere => {
                let shade = (1.0 - (z - self.sphere[2] + self.radius) / self.radius).clamp(0.3, 1.0);
                [(220.0 * shade) as u8, (70.0 * shade) as u8, (50.0 * shade) as u8]
            }
            Hit::Wall => {
                let x = COLOR_BASELINE_MM + dx * z;
                let y = dy * z;
                if ((x / 150.0).floor() as i32 + (y / 150.0).floor() as i32) % 2 == 0 {
                    [210, 205, 190]
                } else {
                    [80, 110, 150]
                }
            }
        }
    }
}

/// Pack RGB pixels as YVYU 4:2:2 (BT.601, full range).
fn encode_yvyu(rgb: &[[u8; 3]], out: &mut [u8]) {
    let luma = |p: [u8; 3]| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
    for (pair, dst) in rgb.chunks_exact(2).zip(out.chunks_exact_mut(4)) {
        let y0 = luma(pair[0]);
        let y1 = luma(pair[1]);
        let r = (pair[0][0] as f32 + pair[1][0] as f32) / 2.0;
        let b = (pair[0][2] as f32 + pair[1][2] as f32) / 2.0;
        let y = (y0 + y1) / 2.0;
        let u = (b - y) * 0.564 + 128.0;
        let v = (r - y) * 0.713 + 128.0;
        dst[0] = y0.round().clamp(0.0, 255.0) as u8;
        dst[1] = v.round().clamp(0.0, 255.0) as u8;
        dst[2] = y1.round().clamp(0.0, 255.0) as u8;
        dst[3] = u.round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> SimBackend {
        let mut sim = SimBackend::new(SimConfig {
            frame_interval_ms: 0,
            ..SimConfig::default()
        });
        sim.init().unwrap();
        sim
    }

    #[test]
    fn calls_before_init_fail() {
        let mut sim = SimBackend::default();
        let err = sim.device_list().unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::NotInited));
    }

    #[test]
    fn capture_requires_enqueued_buffers() {
        let mut sim = fast();
        let h = sim.open_by_id("sim-0").unwrap();
        sim.enable_components(h, ComponentId::DEPTH).unwrap();
        let err = sim.start_capture(h).unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::NoBuffer));

        let size = sim.frame_buffer_size(h).unwrap();
        assert_eq!(size, 640 * 480 * 2);
        sim.enqueue_buffer(h, FrameBuffer::new(0, size)).unwrap();
        sim.start_capture(h).unwrap();

        let frame = sim.fetch_frame(h, None).unwrap();
        assert_eq!(frame.images.len(), 1);
        let err = sim.fetch_frame(h, None).unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::NoBuffer));
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut sim = fast();
        let h = sim.open_by_id("sim-0").unwrap();
        sim.enable_components(h, ComponentId::DEPTH | ComponentId::RGB).unwrap();
        let err = sim.enqueue_buffer(h, FrameBuffer::new(0, 16)).unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::WrongSize));
    }

    #[test]
    fn image_mode_can_be_refused() {
        let mut sim = SimBackend::new(SimConfig {
            image_mode_permitted: false,
            ..SimConfig::default()
        });
        sim.init().unwrap();
        let h = sim.open_by_ip("192.168.1.200").unwrap();
        let err = sim
            .set_enum(h, ComponentId::DEPTH, Feature::IMAGE_MODE, ImageMode::QVGA.as_raw())
            .unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::NotPermitted));
    }

    #[test]
    fn trigger_mode_waits_for_soft_trigger() {
        let mut sim = fast();
        let h = sim.open_by_id("sim-0").unwrap();
        sim.enable_components(h, ComponentId::DEPTH).unwrap();
        sim.set_bool(h, ComponentId::DEVICE, Feature::TRIGGER_MODE, true).unwrap();
        let size = sim.frame_buffer_size(h).unwrap();
        sim.enqueue_buffer(h, FrameBuffer::new(0, size)).unwrap();
        sim.start_capture(h).unwrap();

        let err = sim.fetch_frame(h, Some(Duration::from_millis(1))).unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::Timeout));
        sim.send_soft_trigger(h).unwrap();
        assert!(sim.fetch_frame(h, None).is_ok());
    }

    #[test]
    fn depth_has_invalid_borders_and_valid_center() {
        let mut sim = fast();
        let h = sim.open_by_id("sim-0").unwrap();
        sim.enable_components(h, ComponentId::DEPTH).unwrap();
        sim.enqueue_buffer(h, FrameBuffer::new(0, 640 * 480 * 2)).unwrap();
        sim.start_capture(h).unwrap();
        let raw = sim.fetch_frame(h, None).unwrap();
        let depth: &[u16] = bytemuck::cast_slice(raw.buffer.as_slice());
        assert_eq!(depth[240 * 640], 0);
        let center = depth[240 * 640 + 320];
        assert!(center > 500 && center < 2500, "center depth {center}");
    }

    #[test]
    fn projection_keeps_nearest_depth() {
        let intr = Intrinsics::new(100.0, 100.0, 5.0, 5.0);
        let points = [
            Point3::new(0.0, 0.0, 1000.0),
            Point3::new(0.0, 0.0, 800.0),
            Point3::default(),
        ];
        let out = project_to_color(&points, &intr, (10, 10), 0.0);
        assert_eq!(out[5 * 10 + 5], 800);
        assert_eq!(out.iter().filter(|&&d| d != 0).count(), 1);
    }

    #[test]
    fn yvyu_encoding_of_gray_is_neutral() {
        let mut out = [0u8; 4];
        encode_yvyu(&[[100, 100, 100], [100, 100, 100]], &mut out);
        assert_eq!(out, [100, 128, 100, 128]);
    }
}
