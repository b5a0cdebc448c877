use tracing::debug;

use crate::annotate::Annotation;
use crate::config::{DetectionConfig, RenderConfig};
use crate::preprocess::BinaryMap;
use crate::slots::{Slot, SlotLayout};

/// Colors and sizes of the overlay the evaluator asks the renderer to draw.
#[derive(Debug, Clone)]
pub struct Style {
    pub free_color: [u8; 3],
    pub occupied_color: [u8; 3],
    pub summary_color: [u8; 3],
    pub free_thickness: u32,
    pub occupied_thickness: u32,
    pub label_scale: u32,
    pub summary_position: (i32, i32),
    pub summary_scale: u32,
    pub summary_padding: u32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            free_color: [0, 255, 0],
            occupied_color: [255, 0, 0],
            summary_color: [0, 200, 0],
            free_thickness: 5,
            occupied_thickness: 2,
            label_scale: 2,
            summary_position: (100, 50),
            summary_scale: 3,
            summary_padding: 20,
        }
    }
}

impl Style {
    pub fn from_config(detection: &DetectionConfig, render: &RenderConfig) -> Self {
        Self {
            free_color: render.free_color,
            occupied_color: render.occupied_color,
            summary_color: render.summary_color,
            summary_position: detection.summary_position,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClassification {
    pub slot: Slot,
    pub foreground_count: u32,
    pub is_free: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResult {
    pub free_count: usize,
    pub total_count: usize,
    pub per_slot: Vec<SlotClassification>,
    pub annotations: Vec<Annotation>,
}

impl FrameResult {
    pub fn summary(&self) -> String {
        format!("Free: {}/{}", self.free_count, self.total_count)
    }
}

/// Free strictly below the threshold; a count equal to it is occupied.
#[inline]
pub fn is_free(foreground_count: u32, threshold: u32) -> bool {
    foreground_count < threshold
}

/// Non-zero pixels inside `[x, x + width) x [y, y + height)`, clipped to the
/// map. A rectangle entirely outside the map counts zero.
pub fn count_foreground(map: &BinaryMap, x: u32, y: u32, width: u32, height: u32) -> u32 {
    let x_end = x.saturating_add(width).min(map.width());
    let y_end = y.saturating_add(height).min(map.height());
    if x >= x_end || y >= y_end {
        return 0;
    }

    let stride = map.width() as usize;
    let raw = map.as_raw();
    let mut count = 0u32;
    for row in y..y_end {
        let start = row as usize * stride;
        count += raw[start + x as usize..start + x_end as usize]
            .iter()
            .filter(|&&p| p != 0)
            .count() as u32;
    }
    count
}

/// Classifies every slot of a layout against one binary map.
#[derive(Debug, Clone)]
pub struct SlotEvaluator {
    threshold: u32,
    style: Style,
}

impl SlotEvaluator {
    pub fn new(threshold: u32, style: Style) -> Self {
        Self { threshold, style }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn evaluate(&self, map: &BinaryMap, layout: &SlotLayout) -> FrameResult {
        let (w, h) = (layout.slot_width, layout.slot_height);
        let mut per_slot = Vec::with_capacity(layout.len());
        let mut annotations = Vec::with_capacity(layout.len() * 2 + 1);
        let mut free_count = 0;

        for slot in &layout.slots {
            let foreground_count = count_foreground(map, slot.x, slot.y, w, h);
            let free = is_free(foreground_count, self.threshold);
            let (color, thickness) = if free {
                free_count += 1;
                (self.style.free_color, self.style.free_thickness)
            } else {
                (self.style.occupied_color, self.style.occupied_thickness)
            };

            annotations.push(Annotation::Rectangle {
                x: slot.x as i32,
                y: slot.y as i32,
                width: w,
                height: h,
                color,
                thickness,
            });
            annotations.push(Annotation::Label {
                text: foreground_count.to_string(),
                x: slot.x as i32,
                y: (slot.y as i64 + h as i64 - 3) as i32,
                scale: self.style.label_scale,
                color,
                padding: 0,
            });

            per_slot.push(SlotClassification {
                slot: *slot,
                foreground_count,
                is_free: free,
            });
        }

        let total_count = layout.len();
        let (sx, sy) = self.style.summary_position;
        annotations.push(Annotation::Label {
            text: format!("Free: {}/{}", free_count, total_count),
            x: sx,
            y: sy,
            scale: self.style.summary_scale,
            color: self.style.summary_color,
            padding: self.style.summary_padding,
        });

        debug!("Evaluated {} slots: {} free", total_count, free_count);

        FrameResult {
            free_count,
            total_count,
            per_slot,
            annotations,
        }
    }
}

impl Default for SlotEvaluator {
    fn default() -> Self {
        Self::new(DetectionConfig::default().occupancy_threshold, Style::default())
    }
}
