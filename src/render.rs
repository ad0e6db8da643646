//! Depth colorization and the small image operations the viewers need.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TyError};
use crate::frame::DepthView;

/// Depth beyond this is treated as a measurement error.
const MAX_VALID_DEPTH_MM: u16 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    /// Perceptual rainbow, blue near and red far
    #[default]
    Turbo,
    /// Bright near, dark far
    Gray,
}

/// Turns 16-bit depth into a viewable RGB image. Invalid pixels are black.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthRender {
    pub colormap: Colormap,
    /// Near end of the color range in mm.
    pub min_mm: u16,
    /// Far end of the color range in mm; 0 picks the range from each frame.
    pub max_mm: u16,
    /// Quantize into this many bands; 0 renders a smooth gradient.
    pub bands: u32,
}

impl Default for DepthRender {
    fn default() -> Self {
        Self {
            colormap: Colormap::Turbo,
            min_mm: 0,
            max_mm: 0,
            bands: 0,
        }
    }
}

impl DepthRender {
    pub fn fixed(min_mm: u16, max_mm: u16) -> Self {
        Self {
            min_mm,
            max_mm,
            ..Self::default()
        }
    }

    pub fn render(&self, depth: &DepthView<'_>) -> RgbImage {
        self.compute(&depth.values(), depth.width, depth.height)
    }

    pub fn compute(&self, depth: &[u16], width: u32, height: u32) -> RgbImage {
        let pixels = width as usize * height as usize;
        let (min, max) = self.range(&depth[..pixels.min(depth.len())]);
        let span = (max - min).max(1) as f32;

        let mut out = RgbImage::new(width, height);
        for (px, &d) in out.pixels_mut().zip(depth) {
            if d == 0 || d >= MAX_VALID_DEPTH_MM {
                continue;
            }
            let mut t = (d.saturating_sub(min) as f32 / span).clamp(0.0, 1.0);
            if self.bands > 0 {
                let bands = self.bands as f32;
                t = (t * bands).floor() / bands;
            }
            *px = match self.colormap {
                Colormap::Turbo => Rgb(turbo(t)),
                Colormap::Gray => {
                    let g = ((1.0 - t) * 255.0) as u8;
                    Rgb([g, g, g])
                }
            };
        }
        out
    }

    fn range(&self, depth: &[u16]) -> (u16, u16) {
        if self.max_mm != 0 {
            return (self.min_mm, self.max_mm.max(self.min_mm));
        }
        let valid = depth.iter().copied().filter(|&d| d != 0 && d < MAX_VALID_DEPTH_MM);
        let (lo, hi) = valid.fold((u16::MAX, 0), |(lo, hi), d| (lo.min(d), hi.max(d)));
        if hi <= lo { (0, 4000) } else { (lo, hi) }
    }
}

/// Google's Turbo colormap, polynomial approximation.
fn turbo(t: f32) -> [u8; 3] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

/// Mark the image center and return the depth measured there.
pub fn annotate_center_depth(image: &mut RgbImage, depth: &DepthView<'_>) -> u16 {
    let value = depth.center();
    let (cx, cy) = (image.width() as i32 / 2, image.height() as i32 / 2);
    let green = Rgb([0, 255, 0]);
    draw_cross_mut(image, green, cx, cy);
    draw_hollow_rect_mut(image, Rect::at(cx - 6, cy - 6).of_size(13, 13), green);
    value
}

/// Per-channel average of two images of the same size.
pub fn blend_half(a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
    if a.dimensions() != b.dimensions() {
        return Err(TyError::InvalidFrame(format!(
            "cannot blend {:?} with {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    let mut out = a.clone();
    for (o, p) in out.iter_mut().zip(b.iter()) {
        *o = *o / 2 + *p / 2;
    }
    Ok(out)
}

/// Convert packed YVYU 4:2:2 (`Y0 V Y1 U`) to RGB with BT.601 coefficients.
pub fn yvyu_to_rgb(data: &[u8], width: u32, height: u32) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    let mut pixels = out.pixels_mut();
    'outer: for chunk in data.chunks_exact(4) {
        let v = chunk[1] as f32 - 128.0;
        let u = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            let Some(px) = pixels.next() else { break 'outer };
            *px = Rgb([
                (y + 1.402 * v).round().clamp(0.0, 255.0) as u8,
                (y - 0.344 * u - 0.714 * v).round().clamp(0.0, 255.0) as u8,
                (y + 1.772 * u).round().clamp(0.0, 255.0) as u8,
            ]);
        }
    }
    out
}

/// Exchange the red and blue channels in place (RGB <-> BGR).
pub fn swap_rb(image: &mut RgbImage) {
    for px in image.pixels_mut() {
        px.0.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_depth_is_black() {
        let img = DepthRender::default().compute(&[0, 1000, 2000, 60000], 4, 1);
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(3, 0), &Rgb([0, 0, 0]));
        assert_ne!(img.get_pixel(1, 0), img.get_pixel(2, 0));
    }

    #[test]
    fn gray_map_is_bright_near() {
        let render = DepthRender {
            colormap: Colormap::Gray,
            ..DepthRender::fixed(1000, 2000)
        };
        let img = render.compute(&[1000, 2000], 2, 1);
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn turbo_ends_are_blue_and_red() {
        let near = turbo(0.1);
        let far = turbo(1.0);
        assert!(near[2] > near[0]);
        assert!(far[0] > far[2]);
    }

    #[test]
    fn blend_averages_and_checks_size() {
        let a = RgbImage::from_pixel(2, 2, Rgb([200, 0, 100]));
        let b = RgbImage::from_pixel(2, 2, Rgb([0, 200, 100]));
        assert_eq!(blend_half(&a, &b).unwrap().get_pixel(1, 1), &Rgb([100, 100, 100]));
        let odd = RgbImage::from_pixel(1, 1, Rgb([1, 255, 3]));
        assert_eq!(blend_half(&odd, &odd).unwrap().get_pixel(0, 0), &Rgb([0, 254, 2]));
        assert!(blend_half(&a, &RgbImage::new(3, 2)).is_err());
    }

    #[test]
    fn yvyu_gray_decodes_to_gray() {
        let img = yvyu_to_rgb(&[90, 128, 180, 128], 2, 1);
        assert_eq!(img.get_pixel(0, 0), &Rgb([90, 90, 90]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([180, 180, 180]));
    }

    #[test]
    fn swap_rb_exchanges_channels() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        swap_rb(&mut img);
        assert_eq!(img.get_pixel(0, 0), &Rgb([3, 2, 1]));
    }
}
