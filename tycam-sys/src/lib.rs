//! Raw declarations for the TY depth camera SDK C API (`TYApi.h`).
//!
//! Nothing here is safe to call directly; the `tycam` crate wraps every
//! function and checks the returned status.
//!
//! Linking only happens with the `native` feature. Without it the types and
//! constants are still available, which lets hardware-free code share the
//! same vocabulary.

#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_int, c_void};

pub type TY_STATUS = i32;
pub type TY_DEV_HANDLE = *mut c_void;
pub type TY_COMPONENT_ID = i32;
pub type TY_FEATURE_ID = i32;
pub type TY_PIXEL_FORMAT = i32;
pub type TY_IMAGE_MODE = i32;
pub type TY_INTERFACE = i32;

// Status codes
pub const TY_STATUS_OK: TY_STATUS = 0;
pub const TY_STATUS_ERROR: TY_STATUS = -1001;
pub const TY_STATUS_NOT_INITED: TY_STATUS = -1002;
pub const TY_STATUS_NOT_IMPLEMENTED: TY_STATUS = -1003;
pub const TY_STATUS_NOT_PERMITTED: TY_STATUS = -1004;
pub const TY_STATUS_DEVICE_ERROR: TY_STATUS = -1005;
pub const TY_STATUS_INVALID_PARAMETER: TY_STATUS = -1006;
pub const TY_STATUS_INVALID_HANDLE: TY_STATUS = -1007;
pub const TY_STATUS_INVALID_COMPONENT: TY_STATUS = -1008;
pub const TY_STATUS_INVALID_FEATURE: TY_STATUS = -1009;
pub const TY_STATUS_WRONG_TYPE: TY_STATUS = -1010;
pub const TY_STATUS_WRONG_SIZE: TY_STATUS = -1011;
pub const TY_STATUS_OUT_OF_MEMORY: TY_STATUS = -1012;
pub const TY_STATUS_OUT_OF_RANGE: TY_STATUS = -1013;
pub const TY_STATUS_TIMEOUT: TY_STATUS = -1014;
pub const TY_STATUS_WRONG_MODE: TY_STATUS = -1015;
pub const TY_STATUS_BUSY: TY_STATUS = -1016;
pub const TY_STATUS_IDLE: TY_STATUS = -1017;
pub const TY_STATUS_NO_DATA: TY_STATUS = -1018;
pub const TY_STATUS_NO_BUFFER: TY_STATUS = -1019;
pub const TY_STATUS_NULL_POINTER: TY_STATUS = -1020;
pub const TY_STATUS_READONLY_FEATURE: TY_STATUS = -1021;

// Component ids (bit set)
pub const TY_COMPONENT_DEVICE: TY_COMPONENT_ID = 0x8000_0000_u32 as i32;
pub const TY_COMPONENT_DEPTH_CAM: TY_COMPONENT_ID = 0x0001_0000;
pub const TY_COMPONENT_POINT3D_CAM: TY_COMPONENT_ID = 0x0002_0000;
pub const TY_COMPONENT_IR_CAM_LEFT: TY_COMPONENT_ID = 0x0004_0000;
pub const TY_COMPONENT_IR_CAM_RIGHT: TY_COMPONENT_ID = 0x0008_0000;
pub const TY_COMPONENT_RGB_CAM_LEFT: TY_COMPONENT_ID = 0x0010_0000;
pub const TY_COMPONENT_RGB_CAM_RIGHT: TY_COMPONENT_ID = 0x0020_0000;
pub const TY_COMPONENT_LASER: TY_COMPONENT_ID = 0x0040_0000;
pub const TY_COMPONENT_RGB_CAM: TY_COMPONENT_ID = TY_COMPONENT_RGB_CAM_LEFT;

// Feature type tags, OR-ed into feature ids
pub const TY_FEATURE_INT: TY_FEATURE_ID = 0x1000;
pub const TY_FEATURE_FLOAT: TY_FEATURE_ID = 0x2000;
pub const TY_FEATURE_ENUM: TY_FEATURE_ID = 0x3000;
pub const TY_FEATURE_BOOL: TY_FEATURE_ID = 0x4000;
pub const TY_FEATURE_STRING: TY_FEATURE_ID = 0x5000;
pub const TY_FEATURE_STRUCT: TY_FEATURE_ID = 0x6000;

pub const TY_STRUCT_CAM_INTRINSIC: TY_FEATURE_ID = 0x0000 | TY_FEATURE_STRUCT;
pub const TY_STRUCT_EXTRINSIC_TO_LEFT_IR: TY_FEATURE_ID = 0x0001 | TY_FEATURE_STRUCT;
pub const TY_STRUCT_CAM_DISTORTION: TY_FEATURE_ID = 0x0006 | TY_FEATURE_STRUCT;
pub const TY_INT_WIDTH: TY_FEATURE_ID = 0x0104 | TY_FEATURE_INT;
pub const TY_INT_HEIGHT: TY_FEATURE_ID = 0x0105 | TY_FEATURE_INT;
pub const TY_ENUM_IMAGE_MODE: TY_FEATURE_ID = 0x0109 | TY_FEATURE_ENUM;
pub const TY_BOOL_TRIGGER_MODE: TY_FEATURE_ID = 0x0200 | TY_FEATURE_BOOL;

// Pixel formats
pub const TY_PIXEL_FORMAT_UNDEFINED: TY_PIXEL_FORMAT = 0;
pub const TY_PIXEL_FORMAT_MONO: TY_PIXEL_FORMAT = 0x1010_0000;
pub const TY_PIXEL_FORMAT_DEPTH16: TY_PIXEL_FORMAT = 0x1020_0000;
pub const TY_PIXEL_FORMAT_YUV422: TY_PIXEL_FORMAT = 0x2020_0000;
pub const TY_PIXEL_FORMAT_RGB: TY_PIXEL_FORMAT = 0x2130_0000;
pub const TY_PIXEL_FORMAT_FPOINT3D: TY_PIXEL_FORMAT = 0x30c0_0000;

// Image modes: (width << 12) | height
pub const TY_IMAGE_MODE_320x240: TY_IMAGE_MODE = (320 << 12) | 240;
pub const TY_IMAGE_MODE_640x480: TY_IMAGE_MODE = (640 << 12) | 480;
pub const TY_IMAGE_MODE_1280x960: TY_IMAGE_MODE = (1280 << 12) | 960;

// Interfaces
pub const TY_INTERFACE_ETHERNET: TY_INTERFACE = 1;
pub const TY_INTERFACE_USB: TY_INTERFACE = 2;

pub const TY_MAX_IMAGES_PER_FRAME: usize = 10;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TY_VERSION_INFO {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    pub reserved: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TY_DEVICE_NET_INFO {
    pub mac: [c_char; 32],
    pub ip: [c_char; 32],
    pub netmask: [c_char; 32],
    pub gateway: [c_char; 32],
    pub broadcast: [c_char; 32],
    pub reserved: [c_char; 96],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TY_DEVICE_BASE_INFO {
    pub devInterface: TY_INTERFACE,
    pub id: [c_char; 32],
    pub vendorName: [c_char; 32],
    pub modelName: [c_char; 32],
    pub hardwareVersion: TY_VERSION_INFO,
    pub firmwareVersion: TY_VERSION_INFO,
    pub netInfo: TY_DEVICE_NET_INFO,
    pub reserved: [c_char; 256],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TY_CAMERA_INTRINSIC {
    pub data: [f32; 9],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TY_VECT_3F {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TY_IMAGE_DATA {
    pub timestamp: u64,
    pub imageIndex: i32,
    pub status: i32,
    pub componentID: TY_COMPONENT_ID,
    pub size: i32,
    pub buffer: *mut c_void,
    pub width: i32,
    pub height: i32,
    pub pixelFormat: TY_PIXEL_FORMAT,
    pub reserved: [i32; 9],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TY_FRAME_DATA {
    pub userBuffer: *mut c_void,
    pub bufferSize: i32,
    pub validCount: i32,
    pub reserved: [i32; 6],
    pub image: [TY_IMAGE_DATA; TY_MAX_IMAGES_PER_FRAME],
}

impl Default for TY_IMAGE_DATA {
    fn default() -> Self {
        Self {
            timestamp: 0,
            imageIndex: 0,
            status: 0,
            componentID: 0,
            size: 0,
            buffer: std::ptr::null_mut(),
            width: 0,
            height: 0,
            pixelFormat: TY_PIXEL_FORMAT_UNDEFINED,
            reserved: [0; 9],
        }
    }
}

impl Default for TY_FRAME_DATA {
    fn default() -> Self {
        Self {
            userBuffer: std::ptr::null_mut(),
            bufferSize: 0,
            validCount: 0,
            reserved: [0; 6],
            image: [TY_IMAGE_DATA::default(); TY_MAX_IMAGES_PER_FRAME],
        }
    }
}

impl Default for TY_DEVICE_BASE_INFO {
    fn default() -> Self {
        Self {
            devInterface: 0,
            id: [0; 32],
            vendorName: [0; 32],
            modelName: [0; 32],
            hardwareVersion: TY_VERSION_INFO::default(),
            firmwareVersion: TY_VERSION_INFO::default(),
            netInfo: TY_DEVICE_NET_INFO {
                mac: [0; 32],
                ip: [0; 32],
                netmask: [0; 32],
                gateway: [0; 32],
                broadcast: [0; 32],
                reserved: [0; 96],
            },
            reserved: [0; 256],
        }
    }
}

pub type TY_FRAME_CALLBACK = Option<unsafe extern "C" fn(frame: *mut TY_FRAME_DATA, userdata: *mut c_void)>;

unsafe extern "C" {
    pub fn TYErrorString(status: TY_STATUS) -> *const c_char;

    pub fn TYInitLib() -> TY_STATUS;
    pub fn TYDeinitLib() -> TY_STATUS;
    pub fn TYLibVersion(version: *mut TY_VERSION_INFO) -> TY_STATUS;

    pub fn TYGetDeviceNumber(device_number: *mut c_int) -> TY_STATUS;
    pub fn TYGetDeviceList(
        device_infos: *mut TY_DEVICE_BASE_INFO,
        buffer_count: c_int,
        filled_device_num: *mut c_int,
    ) -> TY_STATUS;
    pub fn TYOpenDevice(device_id: *const c_char, device_handle: *mut TY_DEV_HANDLE) -> TY_STATUS;
    pub fn TYOpenDeviceWithIP(ip: *const c_char, device_handle: *mut TY_DEV_HANDLE) -> TY_STATUS;
    pub fn TYCloseDevice(device_handle: TY_DEV_HANDLE) -> TY_STATUS;

    pub fn TYGetComponentIDs(device_handle: TY_DEV_HANDLE, component_ids: *mut i32) -> TY_STATUS;
    pub fn TYGetEnabledComponents(device_handle: TY_DEV_HANDLE, component_ids: *mut i32) -> TY_STATUS;
    pub fn TYEnableComponents(device_handle: TY_DEV_HANDLE, component_ids: i32) -> TY_STATUS;
    pub fn TYDisableComponents(device_handle: TY_DEV_HANDLE, component_ids: i32) -> TY_STATUS;

    pub fn TYGetFrameBufferSize(device_handle: TY_DEV_HANDLE, buffer_size: *mut i32) -> TY_STATUS;
    pub fn TYEnqueueBuffer(device_handle: TY_DEV_HANDLE, buffer: *mut c_void, buffer_size: i32) -> TY_STATUS;
    pub fn TYClearBufferQueue(device_handle: TY_DEV_HANDLE) -> TY_STATUS;

    pub fn TYStartCapture(device_handle: TY_DEV_HANDLE) -> TY_STATUS;
    pub fn TYStopCapture(device_handle: TY_DEV_HANDLE) -> TY_STATUS;
    pub fn TYSendSoftTrigger(device_handle: TY_DEV_HANDLE) -> TY_STATUS;

    pub fn TYRegisterCallback(
        device_handle: TY_DEV_HANDLE,
        callback: TY_FRAME_CALLBACK,
        userdata: *mut c_void,
    ) -> TY_STATUS;
    pub fn TYFetchFrame(device_handle: TY_DEV_HANDLE, frame: *mut TY_FRAME_DATA, timeout: c_int) -> TY_STATUS;

    pub fn TYGetInt(
        device_handle: TY_DEV_HANDLE,
        component_id: TY_COMPONENT_ID,
        feature_id: TY_FEATURE_ID,
        value: *mut i32,
    ) -> TY_STATUS;
    pub fn TYSetInt(
        device_handle: TY_DEV_HANDLE,
        component_id: TY_COMPONENT_ID,
        feature_id: TY_FEATURE_ID,
        value: i32,
    ) -> TY_STATUS;
    pub fn TYSetBool(
        device_handle: TY_DEV_HANDLE,
        component_id: TY_COMPONENT_ID,
        feature_id: TY_FEATURE_ID,
        value: bool,
    ) -> TY_STATUS;
    pub fn TYSetEnum(
        device_handle: TY_DEV_HANDLE,
        component_id: TY_COMPONENT_ID,
        feature_id: TY_FEATURE_ID,
        value: i32,
    ) -> TY_STATUS;
    pub fn TYGetStruct(
        device_handle: TY_DEV_HANDLE,
        component_id: TY_COMPONENT_ID,
        feature_id: TY_FEATURE_ID,
        data: *mut c_void,
        size: i32,
    ) -> TY_STATUS;

    pub fn TYRegisterWorldToColor(
        device_handle: TY_DEV_HANDLE,
        world: *const TY_VECT_3F,
        world_padding_bytes: i32,
        point_count: i32,
        out_buffer: *mut u16,
        buffer_size: i32,
    ) -> TY_STATUS;
}

/// Interprets a fixed-size, NUL-padded C char array as a Rust string.
pub fn c_chars_to_string(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_mode_packs_width_and_height() {
        assert_eq!(TY_IMAGE_MODE_640x480 >> 12, 640);
        assert_eq!(TY_IMAGE_MODE_640x480 & 0xfff, 480);
    }

    #[test]
    fn c_chars_stop_at_nul() {
        let mut raw = [0 as c_char; 32];
        for (dst, src) in raw.iter_mut().zip(b"207000106930") {
            *dst = *src as c_char;
        }
        assert_eq!(c_chars_to_string(&raw), "207000106930");
    }
}
