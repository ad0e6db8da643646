//! Background change detection on color frames.

use image::RgbImage;

use crate::error::{Result, TyError};

/// Default mean absolute difference (per channel value) that counts as a change.
pub const DEFAULT_THRESHOLD: f32 = 12.0;

/// Learns a mean background from the first `bg_count` frames, then reports
/// whether later frames differ from it.
///
/// With `bg_count == 0` nothing is learned and every frame is judged as
/// changed.
#[derive(Debug, Clone)]
pub struct BackgroundDetector {
    bg_count: usize,
    collected: usize,
    dims: Option<(u32, u32)>,
    sum: Vec<f32>,
    threshold: f32,
}

impl BackgroundDetector {
    pub fn new(bg_count: usize) -> Self {
        Self {
            bg_count,
            collected: 0,
            dims: None,
            sum: Vec::new(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn needs_background(&self) -> bool {
        self.collected < self.bg_count
    }

    /// Add one background frame. Returns `true` once enough were collected.
    pub fn input_background(&mut self, frame: &RgbImage) -> Result<bool> {
        if !self.needs_background() {
            return Ok(true);
        }
        let dims = frame.dimensions();
        match self.dims {
            None => {
                self.dims = Some(dims);
                self.sum = vec![0.0; frame.as_raw().len()];
            }
            Some(expected) if expected != dims => {
                return Err(TyError::InvalidFrame(format!(
                    "background frame is {:?}, expected {:?}",
                    dims, expected
                )));
            }
            Some(_) => {}
        }
        for (acc, &v) in self.sum.iter_mut().zip(frame.as_raw()) {
            *acc += v as f32;
        }
        self.collected += 1;
        Ok(!self.needs_background())
    }

    /// Mean absolute difference between `frame` and the learned background.
    pub fn difference(&self, frame: &RgbImage) -> Result<f32> {
        if self.collected == 0 {
            return Ok(f32::INFINITY);
        }
        if self.dims != Some(frame.dimensions()) {
            return Err(TyError::InvalidFrame(format!(
                "frame is {:?}, background is {:?}",
                frame.dimensions(),
                self.dims
            )));
        }
        let n = self.collected as f32;
        let total: f32 = self
            .sum
            .iter()
            .zip(frame.as_raw())
            .map(|(&acc, &v)| (acc / n - v as f32).abs())
            .sum();
        Ok(total / self.sum.len().max(1) as f32)
    }

    /// Whether `frame` differs from the background.
    pub fn judge(&self, frame: &RgbImage) -> Result<bool> {
        if self.bg_count == 0 {
            return Ok(true);
        }
        Ok(self.difference(frame)? > self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn zero_backgrounds_always_judges_true() {
        let det = BackgroundDetector::new(0);
        assert!(!det.needs_background());
        assert!(det.judge(&RgbImage::new(2, 2)).unwrap());
    }

    #[test]
    fn learned_background_separates_changes() {
        let bg = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let mut det = BackgroundDetector::new(2);
        assert!(!det.input_background(&bg).unwrap());
        assert!(det.input_background(&bg).unwrap());
        assert!(!det.needs_background());

        assert!(!det.judge(&bg).unwrap());
        let changed = RgbImage::from_pixel(4, 4, Rgb([180, 100, 100]));
        assert!(det.judge(&changed).unwrap());
        assert!(det.judge(&RgbImage::new(2, 2)).is_err());
    }
}
