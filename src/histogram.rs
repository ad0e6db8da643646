use image::{Rgb, RgbImage};

pub const HIST_WIDTH: u32 = 512;
pub const HIST_HEIGHT: u32 = 400;
const BINS: usize = 256;
const BIN_WIDTH: u32 = HIST_WIDTH / BINS as u32;

/// 256-bin histogram per channel, in RGB order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHistogram {
    pub bins: [[u32; BINS]; 3],
}

impl ChannelHistogram {
    pub fn compute(image: &RgbImage) -> Self {
        let mut bins = [[0u32; BINS]; 3];
        for px in image.pixels() {
            for (c, &v) in px.0.iter().enumerate() {
                bins[c][v as usize] += 1;
            }
        }
        Self { bins }
    }

    pub fn red(&self) -> &[u32; BINS] {
        &self.bins[0]
    }

    pub fn green(&self) -> &[u32; BINS] {
        &self.bins[1]
    }

    pub fn blue(&self) -> &[u32; BINS] {
        &self.bins[2]
    }
}

/// Draw the histogram as a 512x400 image.
///
/// All channels share one scale, twice the mean green bin count at full
/// height. A column is drawn for bins 1..=255 wherever the scaled green bar
/// is visible; each channel lights its own color plane, so overlapping bars
/// mix (white where all three reach).
pub fn render_histogram(hist: &ChannelHistogram) -> RgbImage {
    let mut out = RgbImage::from_pixel(HIST_WIDTH, HIST_HEIGHT, Rgb([0, 0, 0]));
    let green_total: u64 = hist.green().iter().map(|&v| v as u64).sum();
    let wmax = green_total as f32 / BINS as f32 * 2.0;
    if wmax <= 0.0 {
        return out;
    }
    let scale = HIST_HEIGHT as f32 / wmax;
    let bar = |count: u32| (count as f32 * scale).round() as i64;

    for i in 1..BINS {
        if bar(hist.green()[i]) <= 0 {
            continue;
        }
        let x = BIN_WIDTH * i as u32;
        for c in 0..3 {
            let h = bar(hist.bins[c][i]).clamp(0, HIST_HEIGHT as i64) as u32;
            for y in HIST_HEIGHT - h..HIST_HEIGHT {
                out.get_pixel_mut(x, y).0[c] = 0xff;
            }
        }
    }
    out
}

/// Subtract each row's minimum green value from that row's green channel.
pub fn remove_green_floor(image: &mut RgbImage) {
    let width = image.width() as usize;
    for row in image.chunks_exact_mut(width * 3) {
        let min = row.iter().skip(1).step_by(3).copied().min().unwrap_or(0);
        if min == 0 {
            continue;
        }
        for g in row.iter_mut().skip(1).step_by(3) {
            *g -= min;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_each_channel() {
        let mut img = RgbImage::from_pixel(4, 1, Rgb([10, 20, 30]));
        img.put_pixel(0, 0, Rgb([10, 21, 0]));
        let hist = ChannelHistogram::compute(&img);
        assert_eq!(hist.red()[10], 4);
        assert_eq!(hist.green()[20], 3);
        assert_eq!(hist.green()[21], 1);
        assert_eq!(hist.blue()[0], 1);
    }

    #[test]
    fn bars_are_drawn_at_twice_the_bin_index() {
        let img = RgbImage::from_pixel(16, 16, Rgb([128, 128, 128]));
        let out = render_histogram(&ChannelHistogram::compute(&img));
        assert_eq!(out.dimensions(), (HIST_WIDTH, HIST_HEIGHT));
        // a single full bin is far above the 2x-mean scale, so the bar fills the column
        assert_eq!(out.get_pixel(256, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(256, 399), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(257, 399), &Rgb([0, 0, 0]));
    }

    #[test]
    fn bin_zero_is_never_drawn() {
        let img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let out = render_histogram(&ChannelHistogram::compute(&img));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn green_floor_is_removed_per_row() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([5, 50, 5]));
        img.put_pixel(1, 0, Rgb([5, 70, 5]));
        img.put_pixel(0, 1, Rgb([5, 0, 5]));
        img.put_pixel(1, 1, Rgb([5, 9, 5]));
        remove_green_floor(&mut img);
        assert_eq!(img.get_pixel(0, 0), &Rgb([5, 0, 5]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([5, 20, 5]));
        assert_eq!(img.get_pixel(1, 1), &Rgb([5, 9, 5]));
    }
}
