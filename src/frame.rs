//! Frames and zero-copy views over their sub-images.

use std::borrow::Cow;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::{Array2, ArrayView2};

use crate::backend::{ImageDesc, RawFrame};
use crate::buffer::FrameBuffer;
use crate::common::{ComponentId, PixelFormat};
use crate::error::{Result, TyError};
use crate::pointcloud::{Point3, PointCloud};
use crate::render;

/// One capture cycle: a buffer plus the sub-images it holds.
///
/// Views borrow the buffer, so they cannot outlive the frame. Give the frame
/// back to the session (or drop its guard) to re-enqueue the buffer.
#[derive(Debug)]
pub struct Frame {
    buffer: FrameBuffer,
    images: Vec<ImageDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrSide {
    Left,
    Right,
}

/// A sub-image classified by component.
#[derive(Debug, Clone, Copy)]
pub enum ImageView<'a> {
    Depth(DepthView<'a>),
    Ir(IrSide, GrayView<'a>),
    Color(ColorView<'a>),
    Point3D(PointView<'a>),
    /// Component or format the tools do not handle.
    Other(&'a ImageDesc),
}

impl Frame {
    /// Validate descriptors against the buffer and take ownership.
    pub fn new(raw: RawFrame) -> Result<Self> {
        validate(raw.buffer.len(), &raw.images)?;
        Ok(Self {
            buffer: raw.buffer,
            images: raw.images,
        })
    }

    pub fn descriptors(&self) -> &[ImageDesc] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn slot(&self) -> usize {
        self.buffer.slot()
    }

    /// Classify every sub-image by its component tag.
    pub fn images(&self) -> impl Iterator<Item = ImageView<'_>> {
        self.images.iter().map(|desc| self.classify(desc))
    }

    pub fn depth(&self) -> Option<DepthView<'_>> {
        self.images().find_map(|v| match v {
            ImageView::Depth(d) => Some(d),
            _ => None,
        })
    }

    pub fn ir(&self, side: IrSide) -> Option<GrayView<'_>> {
        self.images().find_map(|v| match v {
            ImageView::Ir(s, g) if s == side => Some(g),
            _ => None,
        })
    }

    pub fn color(&self) -> Option<ColorView<'_>> {
        self.images().find_map(|v| match v {
            ImageView::Color(c) => Some(c),
            _ => None,
        })
    }

    pub fn points(&self) -> Option<PointView<'_>> {
        self.images().find_map(|v| match v {
            ImageView::Point3D(p) => Some(p),
            _ => None,
        })
    }

    pub fn into_buffer(self) -> FrameBuffer {
        self.buffer
    }

    fn bytes(&self, desc: &ImageDesc) -> &[u8] {
        &self.buffer.as_slice()[desc.offset..desc.offset + desc.size]
    }

    fn classify<'a>(&'a self, desc: &'a ImageDesc) -> ImageView<'a> {
        let data = self.bytes(desc);
        let (width, height) = (desc.width, desc.height);
        match (desc.component, desc.format) {
            (c, PixelFormat::Depth16) if c == ComponentId::DEPTH => ImageView::Depth(DepthView {
                width,
                height,
                data,
            }),
            (c, PixelFormat::Mono8) if c == ComponentId::IR_LEFT => {
                ImageView::Ir(IrSide::Left, GrayView { width, height, data })
            }
            (c, PixelFormat::Mono8) if c == ComponentId::IR_RIGHT => {
                ImageView::Ir(IrSide::Right, GrayView { width, height, data })
            }
            (c, format @ (PixelFormat::Rgb888 | PixelFormat::Yuv422)) if c == ComponentId::RGB => {
                ImageView::Color(ColorView {
                    width,
                    height,
                    format,
                    data,
                })
            }
            (c, PixelFormat::Point3D) if c == ComponentId::POINT3D => {
                ImageView::Point3D(PointView {
                    width,
                    height,
                    data,
                })
            }
            _ => ImageView::Other(desc),
        }
    }
}

/// Check that every sub-image lies inside a buffer of `len` bytes and that
/// typed images are non-empty and large enough for their dimensions.
pub fn validate(len: usize, images: &[ImageDesc]) -> Result<()> {
    for desc in images {
        let end = desc
            .offset
            .checked_add(desc.size)
            .ok_or_else(|| TyError::InvalidFrame(format!("{} image offset overflows", desc.component)))?;
        if end > len {
            return Err(TyError::InvalidFrame(format!(
                "{} image spans {}..{} but the buffer holds {} bytes",
                desc.component, desc.offset, end, len
            )));
        }
        if let Some(bpp) = desc.format.bytes_per_pixel() {
            if desc.width == 0 || desc.height == 0 {
                return Err(TyError::InvalidFrame(format!(
                    "{} image is {}x{}",
                    desc.component, desc.width, desc.height
                )));
            }
            let needed = desc.width as usize * desc.height as usize * bpp;
            if desc.size < needed {
                return Err(TyError::InvalidFrame(format!(
                    "{} image is {}x{} {:?} but only {} bytes were delivered",
                    desc.component, desc.width, desc.height, desc.format, desc.size
                )));
            }
        }
    }
    Ok(())
}

/// 16-bit depth in millimeters; 0 means no measurement.
#[derive(Debug, Clone, Copy)]
pub struct DepthView<'a> {
    pub width: u32,
    pub height: u32,
    data: &'a [u8],
}

impl<'a> DepthView<'a> {
    pub fn from_bytes(width: u32, height: u32, data: &'a [u8]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TyError::InvalidFrame(format!("depth plane is {}x{}", width, height)));
        }
        if data.len() < width as usize * height as usize * 2 {
            return Err(TyError::InvalidFrame(format!(
                "depth plane {}x{} needs {} bytes, got {}",
                width,
                height,
                width as usize * height as usize * 2,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn bytes(&self) -> &'a [u8] {
        &self.data[..self.width as usize * self.height as usize * 2]
    }

    /// Borrowed when the plane is 2-byte aligned, copied otherwise.
    pub fn values(&self) -> Cow<'a, [u16]> {
        let bytes = self.bytes();
        match bytemuck::try_cast_slice(bytes) {
            Ok(values) => Cow::Borrowed(values),
            Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(bytes)),
        }
    }

    pub fn at(&self, x: u32, y: u32) -> u16 {
        let i = (y as usize * self.width as usize + x as usize) * 2;
        u16::from_ne_bytes([self.data[i], self.data[i + 1]])
    }

    pub fn center(&self) -> u16 {
        self.at(self.width / 2, self.height / 2)
    }

    pub fn to_array(&self) -> Array2<u16> {
        let values = self.values().into_owned();
        Array2::from_shape_vec((self.height as usize, self.width as usize), values)
            .unwrap_or_else(|_| Array2::zeros((self.height as usize, self.width as usize)))
    }

    pub fn with_array<R>(&self, f: impl FnOnce(ArrayView2<'_, u16>) -> R) -> R {
        let values = self.values();
        let shape = (self.height as usize, self.width as usize);
        match ArrayView2::from_shape(shape, &values) {
            Ok(view) => f(view),
            Err(_) => f(Array2::zeros(shape).view()),
        }
    }

    pub fn to_image(&self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        ImageBuffer::from_raw(self.width, self.height, self.values().into_owned())
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }
}

/// 8-bit gray image (IR)
#[derive(Debug, Clone, Copy)]
pub struct GrayView<'a> {
    pub width: u32,
    pub height: u32,
    data: &'a [u8],
}

impl<'a> GrayView<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.bytes().to_vec())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

/// Color image as delivered by the RGB camera (RGB888 or YVYU).
#[derive(Debug, Clone, Copy)]
pub struct ColorView<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    data: &'a [u8],
}

impl<'a> ColorView<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Convert to packed RGB regardless of the delivered format.
    pub fn to_rgb(&self) -> RgbImage {
        match self.format {
            PixelFormat::Yuv422 => render::yvyu_to_rgb(self.data, self.width, self.height),
            _ => {
                let len = self.width as usize * self.height as usize * 3;
                RgbImage::from_raw(self.width, self.height, self.data[..len].to_vec())
                    .unwrap_or_else(|| RgbImage::new(self.width, self.height))
            }
        }
    }
}

/// Organized point cloud as delivered by the point-cloud component.
#[derive(Debug, Clone, Copy)]
pub struct PointView<'a> {
    pub width: u32,
    pub height: u32,
    data: &'a [u8],
}

impl<'a> PointView<'a> {
    pub fn points(&self) -> Cow<'a, [Point3]> {
        let bytes = &self.data[..self.width as usize * self.height as usize * 12];
        match bytemuck::try_cast_slice(bytes) {
            Ok(points) => Cow::Borrowed(points),
            Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(bytes)),
        }
    }

    pub fn to_cloud(&self) -> PointCloud {
        PointCloud::new(self.width, self.height, self.points().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(component: ComponentId, format: PixelFormat, w: u32, h: u32, offset: usize) -> ImageDesc {
        ImageDesc {
            component,
            format,
            width: w,
            height: h,
            offset,
            size: w as usize * h as usize * format.bytes_per_pixel().unwrap(),
            timestamp: 0,
            index: 0,
        }
    }

    #[test]
    fn sub_images_are_classified_by_component() {
        let mut buffer = FrameBuffer::new(0, 4 * 2 + 4 + 4 * 3);
        let bytes = buffer.as_mut_slice();
        bytes[..2].copy_from_slice(&1234u16.to_ne_bytes());
        bytes[8] = 77;
        let frame = Frame::new(RawFrame {
            buffer,
            images: vec![
                desc(ComponentId::DEPTH, PixelFormat::Depth16, 2, 2, 0),
                desc(ComponentId::IR_LEFT, PixelFormat::Mono8, 2, 2, 8),
                desc(ComponentId::RGB, PixelFormat::Rgb888, 2, 2, 12),
            ],
        })
        .unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.depth().unwrap().at(0, 0), 1234);
        assert_eq!(frame.ir(IrSide::Left).unwrap().bytes()[0], 77);
        assert!(frame.ir(IrSide::Right).is_none());
        assert_eq!(frame.color().unwrap().to_rgb().dimensions(), (2, 2));
        assert!(frame.points().is_none());
    }

    #[test]
    fn descriptors_outside_the_buffer_are_rejected() {
        let buffer = FrameBuffer::new(0, 8);
        let err = Frame::new(RawFrame {
            buffer,
            images: vec![desc(ComponentId::DEPTH, PixelFormat::Depth16, 4, 4, 0)],
        })
        .unwrap_err();
        assert!(matches!(err, TyError::InvalidFrame(_)));
    }

    #[test]
    fn empty_depth_images_are_rejected() {
        let err = Frame::new(RawFrame {
            buffer: FrameBuffer::new(0, 8),
            images: vec![desc(ComponentId::DEPTH, PixelFormat::Depth16, 0, 0, 0)],
        })
        .unwrap_err();
        assert!(matches!(err, TyError::InvalidFrame(_)));
        assert!(DepthView::from_bytes(0, 0, &[]).is_err());
    }

    #[test]
    fn unknown_formats_fall_through() {
        let buffer = FrameBuffer::new(0, 16);
        let frame = Frame::new(RawFrame {
            buffer,
            images: vec![ImageDesc {
                component: ComponentId::RGB,
                format: PixelFormat::Unknown(99),
                width: 4,
                height: 4,
                offset: 0,
                size: 16,
                timestamp: 0,
                index: 0,
            }],
        })
        .unwrap();
        assert!(matches!(frame.images().next(), Some(ImageView::Other(_))));
    }

    #[test]
    fn point_view_reads_native_floats() {
        let mut buffer = FrameBuffer::new(0, 12);
        let p = Point3::new(1.5, -2.0, 900.0);
        buffer.as_mut_slice().copy_from_slice(bytemuck::bytes_of(&p));
        let frame = Frame::new(RawFrame {
            buffer,
            images: vec![desc(ComponentId::POINT3D, PixelFormat::Point3D, 1, 1, 0)],
        })
        .unwrap();
        assert_eq!(frame.points().unwrap().points()[0], p);
    }
}
