//! Edge-map preprocessing of dash-cam frames.
//!
//! Every frame goes through the same fixed chain: crop the road band, resize
//! to the network input, blur, then Canny edge detection. The result is a
//! single-channel map of 0.0 / 255.0 values shaped `height x width x 1`.

use crate::types::{DatasetError, DatasetResult};
use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EDGE: u8 = 255;
// tan(22.5 deg), boundary between horizontal/diagonal/vertical gradient sectors.
const TAN_22_5: f32 = 0.414_213_57;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeMapConfig {
    /// First source row kept by the crop.
    pub crop_top: u32,
    /// Row after the last source row kept by the crop; frames must be at least this tall.
    pub crop_bottom: u32,
    /// Output width after resizing.
    pub width: u32,
    /// Output height after resizing.
    pub height: u32,
    /// Gaussian blur taps (odd).
    pub blur_kernel: usize,
    pub blur_sigma: f32,
    /// Canny hysteresis thresholds on the L1 Sobel magnitude.
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for EdgeMapConfig {
    fn default() -> Self {
        Self {
            crop_top: 64,
            crop_bottom: 128,
            width: 128,
            height: 32,
            blur_kernel: 5,
            blur_sigma: 1.0,
            canny_low: 100.0,
            canny_high: 200.0,
        }
    }
}

impl EdgeMapConfig {
    /// Number of f32 values in one edge map.
    pub fn feature_len(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn describe(&self) -> String {
        format!(
            "crop=[{},{}) size={}x{} blur={}x{} sigma={:.2} canny={}/{}",
            self.crop_top,
            self.crop_bottom,
            self.width,
            self.height,
            self.blur_kernel,
            self.blur_kernel,
            self.blur_sigma,
            self.canny_low,
            self.canny_high
        )
    }
}

/// Read one frame from disk and turn it into a flat `height * width` edge map.
pub fn load_edge_map(path: &Path, cfg: &EdgeMapConfig) -> DatasetResult<Vec<f32>> {
    let img = image::open(path)
        .map_err(|e| DatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8();
    if img.height() < cfg.crop_bottom {
        return Err(DatasetError::ImageTooSmall {
            path: path.to_path_buf(),
            height: img.height(),
            required: cfg.crop_bottom,
        });
    }
    let edges = edge_map(&img, cfg);
    Ok(edges.into_raw().into_iter().map(f32::from).collect())
}

/// Crop, resize, blur and edge-detect a frame.
///
/// The crop window is clamped to the frame; a frame with nothing inside the
/// window yields an empty (all-zero) map.
pub fn edge_map(img: &RgbImage, cfg: &EdgeMapConfig) -> GrayImage {
    let (w, h) = img.dimensions();
    let bottom = cfg.crop_bottom.min(h);
    let top = cfg.crop_top.min(bottom);
    if w == 0 || bottom == top {
        return GrayImage::new(cfg.width, cfg.height);
    }
    let cropped = image::imageops::crop_imm(img, 0, top, w, bottom - top).to_image();
    let resized = image::imageops::resize(&cropped, cfg.width, cfg.height, FilterType::CatmullRom);
    let blurred = gaussian_blur(&resized, cfg.blur_kernel, cfg.blur_sigma);
    canny_rgb(&blurred, cfg.canny_low, cfg.canny_high)
}

/// Normalized 1-D Gaussian taps, as used for a square `taps x taps` blur.
pub(crate) fn blur_taps(taps: usize, sigma: f32) -> Vec<f32> {
    let taps = taps.max(1) | 1;
    let center = (taps / 2) as f32;
    let raw: Vec<f32> = (0..taps)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

fn gaussian_blur(img: &RgbImage, taps: usize, sigma: f32) -> RgbImage {
    if sigma <= 0.0 || taps <= 1 {
        return img.clone();
    }
    imageproc::filter::separable_filter_equal(img, &blur_taps(taps, sigma))
}

/// Canny on a colour frame: per pixel, the channel with the strongest
/// gradient supplies both magnitude and direction.
fn canny_rgb(img: &RgbImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let n = (w * h) as usize;
    let mut gx = vec![0i32; n];
    let mut gy = vec![0i32; n];
    let mut best = vec![-1i32; n];

    for c in 0..3 {
        let channel = GrayImage::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y)[c]]));
        let dx = horizontal_sobel(&channel);
        let dy = vertical_sobel(&channel);
        for (i, (px, py)) in dx.pixels().zip(dy.pixels()).enumerate() {
            let (vx, vy) = (i32::from(px[0]), i32::from(py[0]));
            let mag = vx.abs() + vy.abs();
            if mag > best[i] {
                best[i] = mag;
                gx[i] = vx;
                gy[i] = vy;
            }
        }
    }

    canny_from_gradients(&gx, &gy, w, h, low, high)
}

/// Non-maximum suppression plus double-threshold hysteresis over precomputed
/// Sobel gradients (row-major, `w * h` each).
pub(crate) fn canny_from_gradients(
    gx: &[i32],
    gy: &[i32],
    w: u32,
    h: u32,
    low: f32,
    high: f32,
) -> GrayImage {
    let (wi, hi) = (w as i64, h as i64);
    let mag: Vec<f32> = gx
        .iter()
        .zip(gy)
        .map(|(x, y)| (x.abs() + y.abs()) as f32)
        .collect();
    let at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= wi || y >= hi {
            0.0
        } else {
            mag[(y * wi + x) as usize]
        }
    };

    // 0 = suppressed, 1 = weak candidate, 2 = strong edge.
    let mut class = vec![0u8; mag.len()];
    let mut stack = Vec::new();
    for y in 0..hi {
        for x in 0..wi {
            let i = (y * wi + x) as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs() as f32, gy[i].abs() as f32);
            // Axis sectors keep ties on the trailing neighbour; diagonals are strict on both.
            let is_max = if ay <= ax * TAN_22_5 {
                m > at(x - 1, y) && m >= at(x + 1, y)
            } else if ay * TAN_22_5 >= ax {
                m > at(x, y - 1) && m >= at(x, y + 1)
            } else if (gx[i] > 0) == (gy[i] > 0) {
                m > at(x - 1, y - 1) && m > at(x + 1, y + 1)
            } else {
                m > at(x + 1, y - 1) && m > at(x - 1, y + 1)
            };
            if is_max {
                if m > high {
                    class[i] = 2;
                    stack.push((x, y));
                } else {
                    class[i] = 1;
                }
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= wi || ny >= hi {
                    continue;
                }
                let j = (ny * wi + nx) as usize;
                if class[j] == 1 {
                    class[j] = 2;
                    stack.push((nx, ny));
                }
            }
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        let i = (y * w + x) as usize;
        Luma([if class[i] == 2 { EDGE } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn road_frame(w: u32, h: u32) -> RgbImage {
        // Dark road with a bright diagonal lane marking in the lower half.
        RgbImage::from_fn(w, h, |x, y| {
            let lane = (x as i64 - 2 * y as i64).abs() < 6;
            if y >= h / 2 && lane {
                Rgb([240, 240, 240])
            } else {
                Rgb([40, 40, 45])
            }
        })
    }

    #[test]
    fn blur_taps_are_normalized_and_symmetric() {
        let taps = blur_taps(5, 1.0);
        assert_eq!(taps.len(), 5);
        assert!((taps.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(taps[0], taps[4]);
        assert!(taps[2] > taps[1]);
    }

    #[test]
    fn output_shape_is_fixed() {
        let cfg = EdgeMapConfig::default();
        for (w, h) in [(320, 160), (128, 128), (640, 480)] {
            let edges = edge_map(&road_frame(w, h), &cfg);
            assert_eq!(edges.dimensions(), (128, 32));
        }
    }

    #[test]
    fn edge_map_is_binary_and_deterministic() {
        let cfg = EdgeMapConfig::default();
        let frame = road_frame(320, 160);
        let a = edge_map(&frame, &cfg);
        let b = edge_map(&frame, &cfg);
        assert_eq!(a, b);
        assert!(a.pixels().all(|p| p[0] == 0 || p[0] == EDGE));
        assert!(a.pixels().any(|p| p[0] == EDGE), "lane marking should produce edges");
    }

    #[test]
    fn flat_frame_has_no_edges() {
        let cfg = EdgeMapConfig::default();
        let flat = RgbImage::from_pixel(320, 160, Rgb([90, 90, 90]));
        assert!(edge_map(&flat, &cfg).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn weak_pixels_survive_only_when_connected_to_strong() {
        // Vertical step: a column of horizontal gradients. Left half of the
        // column is strong, right half weak; an isolated weak pixel sits apart.
        let (w, h) = (8u32, 8u32);
        let mut gx = vec![0i32; 64];
        let gy = vec![0i32; 64];
        for y in 0..4 {
            gx[(y * w + 3) as usize] = 300;
        }
        for y in 4..8 {
            gx[(y * w + 3) as usize] = 150;
        }
        gx[(w + 6) as usize] = 150;
        let edges = canny_from_gradients(&gx, &gy, w, h, 100.0, 200.0);
        for y in 0..8 {
            assert_eq!(edges.get_pixel(3, y)[0], EDGE, "row {y}");
        }
        assert_eq!(edges.get_pixel(6, 1)[0], 0);
    }

    #[test]
    fn equal_neighbours_keep_one_pixel_on_axes_and_none_on_diagonals() {
        let (w, h) = (8u32, 8u32);
        let idx = |x: u32, y: u32| (y * w + x) as usize;

        // Two equal horizontal gradients side by side: the leading one survives.
        let mut gx = vec![0i32; 64];
        let gy = vec![0i32; 64];
        gx[idx(3, 3)] = 300;
        gx[idx(4, 3)] = 300;
        let edges = canny_from_gradients(&gx, &gy, w, h, 100.0, 200.0);
        assert_eq!(edges.get_pixel(3, 3)[0], EDGE);
        assert_eq!(edges.get_pixel(4, 3)[0], 0);

        // The same tie along a diagonal ridge suppresses both.
        let mut gx = vec![0i32; 64];
        let mut gy = vec![0i32; 64];
        for (x, y) in [(3, 3), (4, 4)] {
            gx[idx(x, y)] = 300;
            gy[idx(x, y)] = 300;
        }
        let edges = canny_from_gradients(&gx, &gy, w, h, 100.0, 200.0);
        assert!(edges.pixels().all(|p| p[0] == 0));
    }
}
