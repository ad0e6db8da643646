//! Backend that forwards to the vendor SDK through `tycam-sys`.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_void};
use std::time::Duration;

use tracing::warn;
use tycam_sys as sys;

use crate::backend::{CameraBackend, DeviceHandle, ImageDesc, RawFrame};
use crate::buffer::FrameBuffer;
use crate::common::{ComponentId, DeviceInfo, Feature, Intrinsics, PixelFormat, Version};
use crate::error::{Result, TyError, TyStatus, check};
use crate::pointcloud::Point3;

/// Human readable text the SDK associates with a status code.
pub fn error_string(status: TyStatus) -> String {
    let ptr = unsafe { sys::TYErrorString(status.as_raw()) };
    if ptr.is_null() {
        status.description().to_string()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

struct NativeDevice {
    raw: sys::TY_DEV_HANDLE,
    /// Buffers currently owned by the SDK, keyed by start address.
    lent: HashMap<usize, FrameBuffer>,
}

/// Talks to real cameras through libtycam.
pub struct NativeBackend {
    devices: HashMap<usize, NativeDevice>,
    next_handle: usize,
    inited: bool,
}

// The SDK handles are plain pointers that the library allows to be used from
// any thread, one call at a time; `Session` serializes access.
unsafe impl Send for NativeBackend {}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            next_handle: 1,
            inited: false,
        }
    }

    fn raw(&self, handle: DeviceHandle) -> Result<sys::TY_DEV_HANDLE> {
        self.devices
            .get(&handle.0)
            .map(|d| d.raw)
            .ok_or(TyError::sdk("device handle", TyStatus::InvalidHandle))
    }

    fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut NativeDevice> {
        self.devices
            .get_mut(&handle.0)
            .ok_or(TyError::sdk("device handle", TyStatus::InvalidHandle))
    }

    fn insert(&mut self, raw: sys::TY_DEV_HANDLE) -> DeviceHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.devices.insert(
            handle,
            NativeDevice {
                raw,
                lent: HashMap::new(),
            },
        );
        DeviceHandle(handle)
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        for (_, dev) in self.devices.drain() {
            unsafe {
                sys::TYStopCapture(dev.raw);
                sys::TYClearBufferQueue(dev.raw);
                sys::TYCloseDevice(dev.raw);
            }
        }
        if self.inited {
            unsafe { sys::TYDeinitLib() };
        }
    }
}

impl CameraBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn init(&mut self) -> Result<()> {
        check("TYInitLib", unsafe { sys::TYInitLib() })?;
        self.inited = true;
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        check("TYDeinitLib", unsafe { sys::TYDeinitLib() })?;
        self.inited = false;
        Ok(())
    }

    fn lib_version(&self) -> Result<Version> {
        let mut ver = sys::TY_VERSION_INFO::default();
        check("TYLibVersion", unsafe { sys::TYLibVersion(&mut ver) })?;
        Ok(ver.into())
    }

    fn device_list(&mut self) -> Result<Vec<DeviceInfo>> {
        let mut count = 0;
        check("TYGetDeviceNumber", unsafe { sys::TYGetDeviceNumber(&mut count) })?;
        if count <= 0 {
            return Ok(Vec::new());
        }
        let mut infos = vec![sys::TY_DEVICE_BASE_INFO::default(); count as usize];
        let mut filled = 0;
        check("TYGetDeviceList", unsafe {
            sys::TYGetDeviceList(infos.as_mut_ptr(), count, &mut filled)
        })?;
        infos.truncate(filled.max(0) as usize);
        Ok(infos.iter().map(DeviceInfo::from).collect())
    }

    fn open_by_id(&mut self, id: &str) -> Result<DeviceHandle> {
        let id = CString::new(id)?;
        let mut raw = std::ptr::null_mut();
        check("TYOpenDevice", unsafe { sys::TYOpenDevice(id.as_ptr(), &mut raw) })?;
        Ok(self.insert(raw))
    }

    fn open_by_ip(&mut self, ip: &str) -> Result<DeviceHandle> {
        let ip = CString::new(ip)?;
        let mut raw = std::ptr::null_mut();
        check("TYOpenDeviceWithIP", unsafe {
            sys::TYOpenDeviceWithIP(ip.as_ptr(), &mut raw)
        })?;
        Ok(self.insert(raw))
    }

    fn close(&mut self, handle: DeviceHandle) -> Result<()> {
        let raw = self.raw(handle)?;
        check("TYCloseDevice", unsafe { sys::TYCloseDevice(raw) })?;
        if let Some(dev) = self.devices.remove(&handle.0) {
            if !dev.lent.is_empty() {
                warn!("closing device with {} buffers still queued", dev.lent.len());
            }
        }
        Ok(())
    }

    fn component_ids(&self, handle: DeviceHandle) -> Result<ComponentId> {
        let mut ids = 0;
        check("TYGetComponentIDs", unsafe {
            sys::TYGetComponentIDs(self.raw(handle)?, &mut ids)
        })?;
        Ok(ComponentId::from_raw(ids))
    }

    fn enabled_components(&self, handle: DeviceHandle) -> Result<ComponentId> {
        let mut ids = 0;
        check("TYGetEnabledComponents", unsafe {
            sys::TYGetEnabledComponents(self.raw(handle)?, &mut ids)
        })?;
        Ok(ComponentId::from_raw(ids))
    }

    fn enable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()> {
        check("TYEnableComponents", unsafe {
            sys::TYEnableComponents(self.raw(handle)?, components.as_raw())
        })
    }

    fn disable_components(&mut self, handle: DeviceHandle, components: ComponentId) -> Result<()> {
        check("TYDisableComponents", unsafe {
            sys::TYDisableComponents(self.raw(handle)?, components.as_raw())
        })
    }

    fn get_int(&self, handle: DeviceHandle, component: ComponentId, feature: Feature) -> Result<i32> {
        let mut value = 0;
        check("TYGetInt", unsafe {
            sys::TYGetInt(self.raw(handle)?, component.as_raw(), feature.as_raw(), &mut value)
        })?;
        Ok(value)
    }

    fn set_bool(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: bool,
    ) -> Result<()> {
        check("TYSetBool", unsafe {
            sys::TYSetBool(self.raw(handle)?, component.as_raw(), feature.as_raw(), value)
        })
    }

    fn set_enum(
        &mut self,
        handle: DeviceHandle,
        component: ComponentId,
        feature: Feature,
        value: i32,
    ) -> Result<()> {
        check("TYSetEnum", unsafe {
            sys::TYSetEnum(self.raw(handle)?, component.as_raw(), feature.as_raw(), value)
        })
    }

    fn intrinsics(&self, handle: DeviceHandle, component: ComponentId) -> Result<Intrinsics> {
        let mut intr = sys::TY_CAMERA_INTRINSIC::default();
        check("TYGetStruct", unsafe {
            sys::TYGetStruct(
                self.raw(handle)?,
                component.as_raw(),
                Feature::CAM_INTRINSIC.as_raw(),
                &mut intr as *mut _ as *mut c_void,
                std::mem::size_of::<sys::TY_CAMERA_INTRINSIC>() as i32,
            )
        })?;
        Ok(Intrinsics { data: intr.data })
    }

    fn frame_buffer_size(&self, handle: DeviceHandle) -> Result<usize> {
        let mut size = 0;
        check("TYGetFrameBufferSize", unsafe {
            sys::TYGetFrameBufferSize(self.raw(handle)?, &mut size)
        })?;
        Ok(size.max(0) as usize)
    }

    fn enqueue_buffer(&mut self, handle: DeviceHandle, mut buffer: FrameBuffer) -> Result<()> {
        let raw = self.raw(handle)?;
        let len = i32::try_from(buffer.len()).map_err(|_| TyError::sdk("TYEnqueueBuffer", TyStatus::WrongSize))?;
        check("TYEnqueueBuffer", unsafe {
            sys::TYEnqueueBuffer(raw, buffer.as_mut_ptr() as *mut c_void, len)
        })?;
        let dev = self.device_mut(handle)?;
        dev.lent.insert(buffer.addr(), buffer);
        Ok(())
    }

    fn clear_buffer_queue(&mut self, handle: DeviceHandle) -> Result<Vec<FrameBuffer>> {
        let raw = self.raw(handle)?;
        check("TYClearBufferQueue", unsafe { sys::TYClearBufferQueue(raw) })?;
        let dev = self.device_mut(handle)?;
        Ok(dev.lent.drain().map(|(_, b)| b).collect())
    }

    fn start_capture(&mut self, handle: DeviceHandle) -> Result<()> {
        check("TYStartCapture", unsafe { sys::TYStartCapture(self.raw(handle)?) })
    }

    fn stop_capture(&mut self, handle: DeviceHandle) -> Result<()> {
        check("TYStopCapture", unsafe { sys::TYStopCapture(self.raw(handle)?) })
    }

    fn send_soft_trigger(&mut self, handle: DeviceHandle) -> Result<()> {
        check("TYSendSoftTrigger", unsafe { sys::TYSendSoftTrigger(self.raw(handle)?) })
    }

    fn fetch_frame(&mut self, handle: DeviceHandle, timeout: Option<Duration>) -> Result<RawFrame> {
        let raw = self.raw(handle)?;
        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);
        let mut frame = sys::TY_FRAME_DATA::default();
        check("TYFetchFrame", unsafe { sys::TYFetchFrame(raw, &mut frame, timeout_ms) })?;

        let base = frame.userBuffer as usize;
        let dev = self.device_mut(handle)?;
        let buffer = dev
            .lent
            .remove(&base)
            .ok_or_else(|| TyError::InvalidFrame(format!("unknown user buffer {:#x}", base)))?;

        let count = (frame.validCount.max(0) as usize).min(sys::TY_MAX_IMAGES_PER_FRAME);
        let mut images = Vec::with_capacity(count);
        for img in &frame.image[..count] {
            let addr = img.buffer as usize;
            if img.buffer.is_null() || addr < base {
                warn!("skipping {} image outside the user buffer", ComponentId::from_raw(img.componentID));
                continue;
            }
            images.push(ImageDesc {
                component: ComponentId::from_raw(img.componentID),
                format: PixelFormat::from_raw(img.pixelFormat),
                width: img.width.max(0) as u32,
                height: img.height.max(0) as u32,
                offset: addr - base,
                size: img.size.max(0) as usize,
                timestamp: img.timestamp,
                index: img.imageIndex,
            });
        }
        Ok(RawFrame { buffer, images })
    }

    fn register_world_to_color(
        &mut self,
        handle: DeviceHandle,
        points: &[Point3],
        color_size: (u32, u32),
    ) -> Result<Vec<u16>> {
        let raw = self.raw(handle)?;
        let mut out = vec![0u16; color_size.0 as usize * color_size.1 as usize];
        check("TYRegisterWorldToColor", unsafe {
            sys::TYRegisterWorldToColor(
                raw,
                points.as_ptr() as *const sys::TY_VECT_3F,
                0,
                points.len() as i32,
                out.as_mut_ptr(),
                (out.len() * 2) as i32,
            )
        })?;
        Ok(out)
    }
}
