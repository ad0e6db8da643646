use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use tycam_sys as sys;

/// Set of camera components (modalities), as the SDK's bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentId(u32);

impl ComponentId {
    pub const NONE: ComponentId = ComponentId(0);
    pub const DEVICE: ComponentId = ComponentId(sys::TY_COMPONENT_DEVICE as u32);
    pub const DEPTH: ComponentId = ComponentId(sys::TY_COMPONENT_DEPTH_CAM as u32);
    pub const POINT3D: ComponentId = ComponentId(sys::TY_COMPONENT_POINT3D_CAM as u32);
    pub const IR_LEFT: ComponentId = ComponentId(sys::TY_COMPONENT_IR_CAM_LEFT as u32);
    pub const IR_RIGHT: ComponentId = ComponentId(sys::TY_COMPONENT_IR_CAM_RIGHT as u32);
    pub const RGB: ComponentId = ComponentId(sys::TY_COMPONENT_RGB_CAM as u32);

    const NAMED: [(ComponentId, &'static str); 6] = [
        (ComponentId::DEVICE, "device"),
        (ComponentId::DEPTH, "depth"),
        (ComponentId::POINT3D, "point3d"),
        (ComponentId::IR_LEFT, "ir-left"),
        (ComponentId::IR_RIGHT, "ir-right"),
        (ComponentId::RGB, "rgb"),
    ];

    pub fn from_raw(value: i32) -> Self {
        ComponentId(value as u32)
    }

    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }

    pub fn contains(self, other: ComponentId) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ComponentId) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn without(self, other: ComponentId) -> Self {
        ComponentId(self.0 & !other.0)
    }

    /// Iterate over the single known components contained in this set.
    pub fn iter(self) -> impl Iterator<Item = ComponentId> {
        Self::NAMED
            .into_iter()
            .map(|(id, _)| id)
            .filter(move |id| self.contains(*id))
    }

    /// Name of a single component, `None` for sets or unknown bits.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, name)| *name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }
}

impl BitOr for ComponentId {
    type Output = ComponentId;

    fn bitor(self, rhs: ComponentId) -> ComponentId {
        ComponentId(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComponentId {
    fn bitor_assign(&mut self, rhs: ComponentId) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        let names: Vec<&str> = self.iter().filter_map(|c| c.name()).collect();
        if names.is_empty() {
            write!(f, "{:#010x}", self.0)
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Pixel layout of a sub-image inside a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit gray (IR cameras)
    Mono8,
    /// 16-bit depth in millimeters
    Depth16,
    /// Packed YVYU 4:2:2
    Yuv422,
    /// Packed 8-bit RGB
    Rgb888,
    /// Three `f32` per pixel (x, y, z) in millimeters
    Point3D,
    Unknown(i32),
}

impl PixelFormat {
    pub fn from_raw(value: i32) -> Self {
        match value {
            sys::TY_PIXEL_FORMAT_MONO => PixelFormat::Mono8,
            sys::TY_PIXEL_FORMAT_DEPTH16 => PixelFormat::Depth16,
            sys::TY_PIXEL_FORMAT_YUV422 => PixelFormat::Yuv422,
            sys::TY_PIXEL_FORMAT_RGB => PixelFormat::Rgb888,
            sys::TY_PIXEL_FORMAT_FPOINT3D => PixelFormat::Point3D,
            other => PixelFormat::Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            PixelFormat::Mono8 => sys::TY_PIXEL_FORMAT_MONO,
            PixelFormat::Depth16 => sys::TY_PIXEL_FORMAT_DEPTH16,
            PixelFormat::Yuv422 => sys::TY_PIXEL_FORMAT_YUV422,
            PixelFormat::Rgb888 => sys::TY_PIXEL_FORMAT_RGB,
            PixelFormat::Point3D => sys::TY_PIXEL_FORMAT_FPOINT3D,
            PixelFormat::Unknown(raw) => raw,
        }
    }

    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Mono8 => Some(1),
            PixelFormat::Depth16 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Point3D => Some(12),
            PixelFormat::Unknown(_) => None,
        }
    }
}

/// Sensor resolution, packed by the SDK as `width << 12 | height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageMode {
    pub width: u32,
    pub height: u32,
}

impl ImageMode {
    pub const VGA: ImageMode = ImageMode::new(640, 480);
    pub const QVGA: ImageMode = ImageMode::new(320, 240);
    pub const SXGA: ImageMode = ImageMode::new(1280, 960);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_raw(value: i32) -> Self {
        let value = value as u32;
        Self::new(value >> 12, value & 0xfff)
    }

    pub fn as_raw(self) -> i32 {
        ((self.width << 12) | (self.height & 0xfff)) as i32
    }

    pub fn pixels(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for ImageMode {
    fn default() -> Self {
        ImageMode::VGA
    }
}

impl fmt::Display for ImageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Feature identifiers used with the structured get/set calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature(i32);

impl Feature {
    pub const TRIGGER_MODE: Feature = Feature(sys::TY_BOOL_TRIGGER_MODE);
    pub const IMAGE_MODE: Feature = Feature(sys::TY_ENUM_IMAGE_MODE);
    pub const CAM_INTRINSIC: Feature = Feature(sys::TY_STRUCT_CAM_INTRINSIC);
    pub const WIDTH: Feature = Feature(sys::TY_INT_WIDTH);
    pub const HEIGHT: Feature = Feature(sys::TY_INT_HEIGHT);

    pub fn from_raw(value: i32) -> Self {
        Feature(value)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }
}

/// Pinhole camera intrinsics, 3x3 row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub data: [f32; 9],
}

impl Intrinsics {
    /// Factory calibration of the 1280x960 IR sensor that the offline
    /// point-cloud tool assumes for dump files.
    pub const REFERENCE_1280X960: Intrinsics = Intrinsics {
        data: [
            1157.47473, 0.0, 627.822876, //
            0.0, 1157.47473, 464.911407, //
            0.0, 0.0, 1.0,
        ],
    };

    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            data: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
        }
    }

    pub fn fx(&self) -> f32 {
        self.data[0]
    }

    pub fn fy(&self) -> f32 {
        self.data[4]
    }

    pub fn cx(&self) -> f32 {
        self.data[2]
    }

    pub fn cy(&self) -> f32 {
        self.data[5]
    }

    /// Intrinsics for an image resampled by `factor` (0.5 halves the resolution).
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.fx() * factor,
            self.fy() * factor,
            self.cx() * factor,
            self.cy() * factor,
        )
    }
}

/// SDK or firmware version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl From<sys::TY_VERSION_INFO> for Version {
    fn from(v: sys::TY_VERSION_INFO) -> Self {
        Version {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceInterface {
    Ethernet,
    Usb,
    Unknown,
}

impl DeviceInterface {
    pub fn from_raw(value: i32) -> Self {
        match value {
            sys::TY_INTERFACE_ETHERNET => DeviceInterface::Ethernet,
            sys::TY_INTERFACE_USB => DeviceInterface::Usb,
            _ => DeviceInterface::Unknown,
        }
    }
}

/// Enumerated device description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub interface: DeviceInterface,
    pub vendor: String,
    pub model: String,
    pub ip: Option<String>,
    pub hardware_version: Version,
    pub firmware_version: Version,
}

impl From<&sys::TY_DEVICE_BASE_INFO> for DeviceInfo {
    fn from(raw: &sys::TY_DEVICE_BASE_INFO) -> Self {
        let interface = DeviceInterface::from_raw(raw.devInterface);
        let ip = match interface {
            DeviceInterface::Ethernet => Some(sys::c_chars_to_string(&raw.netInfo.ip)),
            _ => None,
        };
        DeviceInfo {
            id: sys::c_chars_to_string(&raw.id),
            interface,
            vendor: sys::c_chars_to_string(&raw.vendorName),
            model: sys::c_chars_to_string(&raw.modelName),
            ip,
            hardware_version: raw.hardwareVersion.into(),
            firmware_version: raw.firmwareVersion.into(),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.vendor, self.model, self.id)?;
        if let Some(ip) = &self.ip {
            write!(f, " @ {}", ip)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_set_operations() {
        let set = ComponentId::DEPTH | ComponentId::IR_LEFT | ComponentId::IR_RIGHT;
        assert!(set.contains(ComponentId::DEPTH));
        assert!(set.contains(ComponentId::IR_LEFT | ComponentId::IR_RIGHT));
        assert!(!set.contains(ComponentId::RGB));
        assert!(!set.contains(ComponentId::NONE));
        assert_eq!(set.iter().count(), 3);
        assert_eq!(set.to_string(), "depth|ir-left|ir-right");
        assert_eq!(set.without(ComponentId::DEPTH).iter().count(), 2);
    }

    #[test]
    fn component_names_parse_back() {
        for id in [ComponentId::DEPTH, ComponentId::POINT3D, ComponentId::RGB] {
            let name = id.name().unwrap();
            assert_eq!(ComponentId::from_name(name), Some(id));
        }
    }

    #[test]
    fn image_mode_matches_sdk_packing() {
        assert_eq!(ImageMode::VGA.as_raw(), sys::TY_IMAGE_MODE_640x480);
        assert_eq!(ImageMode::from_raw(sys::TY_IMAGE_MODE_1280x960), ImageMode::SXGA);
    }

    #[test]
    fn pixel_formats_know_their_size() {
        assert_eq!(PixelFormat::from_raw(sys::TY_PIXEL_FORMAT_DEPTH16), PixelFormat::Depth16);
        assert_eq!(PixelFormat::Point3D.bytes_per_pixel(), Some(12));
        assert_eq!(PixelFormat::Unknown(7).bytes_per_pixel(), None);
    }

    #[test]
    fn intrinsics_scale_with_resolution() {
        let half = Intrinsics::REFERENCE_1280X960.scaled(0.5);
        assert!((half.fx() - 578.737365).abs() < 1e-3);
        assert!((half.cy() - 232.455704).abs() < 1e-3);
    }
}
