//! Overlay rendering: draw calls produced by the evaluator, the bitmap font
//! used for labels, and the sinks annotated frames are handed to.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::evaluator::FrameResult;

/// One draw instruction, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Outline of a `width` x `height` box whose top-left is `(x, y)`.
    Rectangle {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        color: [u8; 3],
        thickness: u32,
    },
    /// Text on a filled box. `(x, y)` is the bottom-left of the text.
    Label {
        text: String,
        x: i32,
        y: i32,
        scale: u32,
        color: [u8; 3],
        padding: u32,
    },
}

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0x00; 7],
    }
}

/// Pixel size of `text` rendered at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    let width = if chars == 0 {
        0
    } else {
        (chars * GLYPH_ADVANCE - 1) * scale
    };
    (width, GLYPH_HEIGHT * scale)
}

fn rect(x: i32, y: i32, width: i64, height: i64) -> Option<Rect> {
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Rect::at(x, y).of_size(width as u32, height as u32))
}

fn draw_text(canvas: &mut RgbImage, text: &str, left: i32, top: i32, scale: u32, color: [u8; 3]) {
    let scale_i = scale as i32;
    for (i, c) in text.chars().enumerate() {
        let origin_x = left + (i as u32 * GLYPH_ADVANCE * scale) as i32;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let px = origin_x + col as i32 * scale_i;
                let py = top + row as i32 * scale_i;
                if let Some(cell) = rect(px, py, scale as i64, scale as i64) {
                    draw_filled_rect_mut(canvas, cell, Rgb(color));
                }
            }
        }
    }
}

/// Apply annotations to a frame in order. Anything outside the frame is
/// clipped.
pub fn draw_annotations(canvas: &mut RgbImage, annotations: &[Annotation]) {
    for annotation in annotations {
        match annotation {
            Annotation::Rectangle {
                x,
                y,
                width,
                height,
                color,
                thickness,
            } => {
                // Strokes straddle the outline, like a thick pen drawn along it.
                let half = (*thickness / 2) as i32;
                for i in 0..*thickness as i32 {
                    let inset = i - half;
                    let w = *width as i64 - 2 * inset as i64;
                    let h = *height as i64 - 2 * inset as i64;
                    if let Some(r) = rect(x + inset, y + inset, w, h) {
                        draw_hollow_rect_mut(canvas, r, Rgb(*color));
                    }
                }
            }
            Annotation::Label {
                text,
                x,
                y,
                scale,
                color,
                padding,
            } => {
                let scale = (*scale).max(1);
                let (tw, th) = text_size(text, scale);
                let pad = *padding as i32;
                let top = y - th as i32;
                if let Some(bg) = rect(
                    x - pad,
                    top - pad,
                    tw as i64 + 2 * pad as i64,
                    th as i64 + 2 * pad as i64,
                ) {
                    draw_filled_rect_mut(canvas, bg, Rgb(*color));
                }
                draw_text(canvas, text, *x, top, scale, TEXT_COLOR);
            }
        }
    }
}

/// Consumer of annotated frames and their occupancy results.
pub trait FrameSink {
    fn publish(&mut self, index: u64, frame: &RgbImage, result: &FrameResult) -> Result<()>;
}

/// Discards frames; the pipeline still logs the live count.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn publish(&mut self, index: u64, _frame: &RgbImage, result: &FrameResult) -> Result<()> {
        debug!(
            "Frame {}: {}/{} free (not written)",
            index, result.free_count, result.total_count
        );
        Ok(())
    }
}

/// Writes every annotated frame as `frame_NNNNN.png`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn create<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        info!("Writing annotated frames to {}", dir.display());
        Ok(Self { dir })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:05}.png", index))
    }
}

impl FrameSink for DirectorySink {
    fn publish(&mut self, index: u64, frame: &RgbImage, _result: &FrameResult) -> Result<()> {
        let path = self.frame_path(index);
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thick_rectangle_straddles_outline() {
        let mut canvas = RgbImage::new(40, 40);
        draw_annotations(
            &mut canvas,
            &[Annotation::Rectangle {
                x: 10,
                y: 10,
                width: 20,
                height: 20,
                color: [0, 255, 0],
                thickness: 3,
            }],
        );
        assert_eq!(canvas.get_pixel(9, 20).0, [0, 255, 0]);
        assert_eq!(canvas.get_pixel(10, 20).0, [0, 255, 0]);
        assert_eq!(canvas.get_pixel(11, 20).0, [0, 255, 0]);
        assert_eq!(canvas.get_pixel(12, 20).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(20, 20).0, [0, 0, 0]);
    }

    #[test]
    fn annotations_off_canvas_are_clipped() {
        let mut canvas = RgbImage::new(10, 10);
        draw_annotations(
            &mut canvas,
            &[
                Annotation::Rectangle {
                    x: -50,
                    y: 5,
                    width: 500,
                    height: 500,
                    color: [255, 0, 0],
                    thickness: 5,
                },
                Annotation::Label {
                    text: "Free: 3/3".to_string(),
                    x: 8,
                    y: 200,
                    scale: 3,
                    color: [0, 200, 0],
                    padding: 20,
                },
            ],
        );
        assert_eq!(canvas.get_pixel(0, 5).0, [255, 0, 0]);
    }

    #[test]
    fn label_sits_above_its_anchor() {
        let mut canvas = RgbImage::new(60, 30);
        draw_annotations(
            &mut canvas,
            &[Annotation::Label {
                text: "1".to_string(),
                x: 5,
                y: 20,
                scale: 2,
                color: [0, 0, 255],
                padding: 1,
            }],
        );
        // Background box spans rows 5..=20 and leaves the rest untouched.
        assert_eq!(canvas.get_pixel(4, 5).0, [0, 0, 255]);
        assert_eq!(canvas.get_pixel(4, 3).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(4, 22).0, [0, 0, 0]);
        assert!(canvas.pixels().any(|p| p.0 == TEXT_COLOR));
        assert_eq!(text_size("12", 2), (22, 14));
    }
}
