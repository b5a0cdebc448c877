//! Grayscale image filters used by the preprocessing pipeline.
//!
//! Every filter is a pure function from one buffer to a freshly allocated
//! one with the same dimensions. Border handling follows the conventions of
//! the classic OpenCV operators these mirror, so thresholds tuned against
//! that toolchain carry over. Median and dilation come from `imageproc`,
//! whose clamped borders already agree with OpenCV.

use image::{GrayImage, Luma, RgbImage};

/// How out-of-image neighbours are synthesised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

impl Border {
    #[inline]
    fn index(self, i: i64, len: i64) -> usize {
        if len == 1 {
            return 0;
        }
        match self {
            Border::Replicate => i.clamp(0, len - 1) as usize,
            Border::Reflect101 => {
                let mut i = i;
                // Kernels are small next to the image, but loop to stay correct
                // when a kernel is wider than the image itself.
                while i < 0 || i >= len {
                    if i < 0 {
                        i = -i;
                    }
                    if i >= len {
                        i = 2 * (len - 1) - i;
                    }
                }
                i as usize
            }
        }
    }
}

/// BT.601 luma with 14-bit fixed-point rounding.
pub fn grayscale(frame: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    let (width, height) = frame.dimensions();
    let mut out = GrayImage::new(width, height);
    for (src, dst) in frame.pixels().zip(out.pixels_mut()) {
        let [r, g, b] = src.0;
        let y = (R * r as u32 + G * g as u32 + B * b as u32 + (1 << (SHIFT - 1))) >> SHIFT;
        *dst = Luma([y.min(255) as u8]);
    }
    out
}

/// Sigma picked for a kernel size when none is given.
pub fn auto_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D Gaussian kernel of odd length `ksize`.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let sigma = if sigma > 0.0 { sigma } else { auto_sigma(ksize) };
    let half = (ksize as i64 - 1) / 2;
    let scale = -0.5 / (sigma as f64 * sigma as f64);

    let raw: Vec<f64> = (-half..=half)
        .map(|x| (scale * (x * x) as f64).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Separable Gaussian blur with a `ksize` x `ksize` kernel.
pub fn gaussian_blur(src: &GrayImage, ksize: u32, sigma: f32, border: Border) -> GrayImage {
    let kernel = gaussian_kernel(ksize, sigma);
    separable_convolve(src, &kernel, border)
}

fn separable_convolve(src: &GrayImage, kernel: &[f32], border: Border) -> GrayImage {
    let (width, height) = src.dimensions();
    let (w, h) = (width as i64, height as i64);
    let half = (kernel.len() as i64 - 1) / 2;
    let raw = src.as_raw();

    let mut horizontal = vec![0f32; raw.len()];
    for y in 0..h {
        let row = &raw[(y * w) as usize..((y + 1) * w) as usize];
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = border.index(x + k as i64 - half, w);
                acc += row[sx] as f32 * weight;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = border.index(y + k as i64 - half, h);
                acc += horizontal[(sy as i64 * w + x) as usize] * weight;
            }
            out.put_pixel(x as u32, y as u32, Luma([saturate(acc)]));
        }
    }
    out
}

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Inverted binary threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes `max_value` when it is at least `c` darker than its
/// `block_size` neighbourhood, and 0 otherwise.
pub fn adaptive_threshold_inv(src: &GrayImage, max_value: u8, block_size: u32, c: f32) -> GrayImage {
    let mean = gaussian_blur(src, block_size, 0.0, Border::Replicate);
    let delta = c.floor() as i32;

    let mut out = GrayImage::new(src.width(), src.height());
    for ((s, m), d) in src.pixels().zip(mean.pixels()).zip(out.pixels_mut()) {
        let diff = s.0[0] as i32 - m.0[0] as i32;
        *d = Luma([if diff <= -delta { max_value } else { 0 }]);
    }
    out
}
