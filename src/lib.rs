pub mod apps;
pub mod backend;
pub mod buffer;
pub mod common;
pub mod config;
pub mod detector;
pub mod device;
pub mod dispatch;
pub mod dump;
pub mod error;
pub mod frame;
pub mod histogram;
pub mod input;
#[cfg(feature = "native")]
pub mod native;
pub mod pointcloud;
pub mod render;
pub mod sim;
pub mod visualization;

pub use tycam_sys as bindings;

// Re-export main types for convenience
pub use crate::backend::{CameraBackend, DeviceHandle, ImageDesc, RawFrame};
pub use crate::buffer::{BufferPool, FrameBuffer};
pub use crate::common::{ComponentId, DeviceInfo, ImageMode, Intrinsics, PixelFormat, Version};
pub use crate::config::Config;
pub use crate::device::{DeviceSelector, FrameGuard, Library, Session};
pub use crate::dispatch::{Control, Dispatcher, FrameSink, SinkContext, StopSignal};
pub use crate::error::{Result, TyError, TyStatus};
pub use crate::frame::{ColorView, DepthView, Frame, GrayView, ImageView, IrSide, PointView};
#[cfg(feature = "native")]
pub use crate::native::NativeBackend;
pub use crate::pointcloud::{Point3, PointCloud};
pub use crate::sim::{SimBackend, SimConfig};
pub use crate::visualization::{DirectoryViewer, MemoryViewer, NullViewer, Viewer};
