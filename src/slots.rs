//! Slot geometry, the persisted slot layout and the slot picker.
//!
//! A layout is always replaced wholesale: the picker builds a new one, the
//! store swaps it in atomically, and a detection session reads it once.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::annotate::{draw_annotations, Annotation};
use crate::error::DetectError;

/// Top-left corner of one parking slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Slot {
    pub x: u32,
    pub y: u32,
}

impl Slot {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for Slot {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl From<Slot> for (u32, u32) {
    fn from(slot: Slot) -> Self {
        (slot.x, slot.y)
    }
}

/// The persisted unit: ordered slots plus the geometry they were drawn with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    /// Width of the reference image the slots were drawn on (0 = unknown)
    #[serde(default)]
    pub image_width: u32,
    /// Height of the reference image the slots were drawn on (0 = unknown)
    #[serde(default)]
    pub image_height: u32,
    pub slot_width: u32,
    pub slot_height: u32,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl SlotLayout {
    /// A layout with no slots and no recorded reference image.
    pub fn empty(slot_width: u32, slot_height: u32) -> Self {
        Self {
            image_width: 0,
            image_height: 0,
            slot_width,
            slot_height,
            slots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the layout knows which image size it was drawn for.
    pub fn has_reference_dimensions(&self) -> bool {
        self.image_width > 0 && self.image_height > 0
    }

    /// Draw the layout's rectangles, numbered in order, over an image.
    pub fn preview(&self, reference: &RgbImage) -> RgbImage {
        draw_slots(&self.slots, self.slot_width, self.slot_height, reference)
    }

    fn check(&self) -> Result<()> {
        if self.slot_width == 0 || self.slot_height == 0 {
            return Err(anyhow!(
                "slot size must be positive, got {}x{}",
                self.slot_width,
                self.slot_height
            ));
        }
        Ok(())
    }
}

fn draw_slots(slots: &[Slot], slot_width: u32, slot_height: u32, reference: &RgbImage) -> RgbImage {
    const OUTLINE: [u8; 3] = [255, 0, 255];

    let mut canvas = reference.clone();
    let mut annotations = Vec::with_capacity(slots.len() * 2);
    for (i, slot) in slots.iter().enumerate() {
        annotations.push(Annotation::Rectangle {
            x: slot.x as i32,
            y: slot.y as i32,
            width: slot_width,
            height: slot_height,
            color: OUTLINE,
            thickness: 2,
        });
        annotations.push(Annotation::Label {
            text: format!("{}", i + 1),
            x: slot.x as i32 + 4,
            y: slot.y as i32 + 18,
            scale: 2,
            color: OUTLINE,
            padding: 2,
        });
    }
    draw_annotations(&mut canvas, &annotations);
    canvas
}

/// Parse a layout file. Accepts the current document format and the legacy
/// flat `[[x, y], ...]` list, which gets the given default slot size.
pub fn parse_layout(bytes: &[u8], default_width: u32, default_height: u32) -> Result<SlotLayout> {
    let layout = match serde_json::from_slice::<SlotLayout>(bytes) {
        Ok(layout) => layout,
        Err(err) => {
            let slots: Vec<Slot> = serde_json::from_slice(bytes)
                .map_err(|_| anyhow!("not a slot layout: {}", err))?;
            debug!("Read legacy slot list with {} entries", slots.len());
            SlotLayout {
                slots,
                ..SlotLayout::empty(default_width, default_height)
            }
        }
    };
    layout.check()?;
    Ok(layout)
}

/// File-backed home of the active slot layout.
#[derive(Debug, Clone)]
pub struct SlotStore {
    path: PathBuf,
    default_width: u32,
    default_height: u32,
}

impl SlotStore {
    pub fn new<P: Into<PathBuf>>(path: P, default_width: u32, default_height: u32) -> Self {
        Self {
            path: path.into(),
            default_width,
            default_height,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the active layout. A missing or unreadable file yields an empty
    /// layout so a detection run can still start.
    pub fn load(&self) -> SlotLayout {
        let empty = SlotLayout::empty(self.default_width, self.default_height);

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "No slot layout at {} ({}), starting with zero slots",
                    self.path.display(),
                    e
                );
                return empty;
            }
        };

        match parse_layout(&bytes, self.default_width, self.default_height) {
            Ok(layout) => {
                info!(
                    "Loaded {} slots ({}x{}) from {}",
                    layout.len(),
                    layout.slot_width,
                    layout.slot_height,
                    self.path.display()
                );
                layout
            }
            Err(e) => {
                warn!(
                    "Slot layout at {} is corrupt ({}), starting with zero slots",
                    self.path.display(),
                    e
                );
                empty
            }
        }
    }

    /// Replace the persisted layout. Readers see either the old or the new
    /// file, never a partial write.
    pub fn save(&self, layout: &SlotLayout) -> Result<()> {
        layout.check()?;
        write_atomically(&self.path, layout)?;
        info!("Saved {} slots to {}", layout.len(), self.path.display());
        Ok(())
    }

    /// Write the active layout to a transfer file.
    ///
    /// A missing store exports an empty layout; a store that exists but
    /// cannot be read or parsed is an error, and nothing is written.
    pub fn export<P: AsRef<Path>>(&self, dest: P) -> Result<SlotLayout> {
        let dest = dest.as_ref();
        let layout = match fs::read(&self.path) {
            Ok(bytes) => parse_layout(&bytes, self.default_width, self.default_height)
                .with_context(|| format!("Slot layout at {} is corrupt", self.path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                SlotLayout::empty(self.default_width, self.default_height)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        write_atomically(dest, &layout)?;
        info!("Exported {} slots to {}", layout.len(), dest.display());
        Ok(layout)
    }

    /// Replace the active layout with the contents of a transfer file.
    ///
    /// An unreadable file is an error and leaves the active layout alone.
    pub fn import<P: AsRef<Path>>(&self, src: P) -> Result<SlotLayout> {
        let src = src.as_ref();
        let bytes = fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
        let layout = parse_layout(&bytes, self.default_width, self.default_height)
            .with_context(|| format!("Failed to parse {}", src.display()))?;
        self.save(&layout)?;
        info!("Imported {} slots from {}", layout.len(), src.display());
        Ok(layout)
    }
}

fn write_atomically(path: &Path, layout: &SlotLayout) -> Result<()> {
    let content = serde_json::to_vec_pretty(layout)?;

    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file path", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CanvasExport {
    #[serde(default)]
    objects: Vec<CanvasObject>,
}

#[derive(Debug, Deserialize)]
struct CanvasObject {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    left: f64,
    top: f64,
}

/// Builds a slot list by marking rectangles on a reference image.
#[derive(Debug, Clone)]
pub struct SlotPicker {
    image_width: u32,
    image_height: u32,
    slot_width: u32,
    slot_height: u32,
    slots: Vec<Slot>,
}

impl SlotPicker {
    pub fn new(reference: (u32, u32), slot_width: u32, slot_height: u32) -> Result<Self, DetectError> {
        if slot_width == 0 || slot_height == 0 {
            return Err(DetectError::InvalidConfig(format!(
                "slot size must be positive, got {}x{}",
                slot_width, slot_height
            )));
        }
        Ok(Self {
            image_width: reference.0,
            image_height: reference.1,
            slot_width,
            slot_height,
            slots: Vec::new(),
        })
    }

    /// Continue editing an existing layout against a reference image.
    pub fn resume(layout: &SlotLayout, reference: (u32, u32)) -> Result<Self, DetectError> {
        let mut picker = Self::new(reference, layout.slot_width, layout.slot_height)?;
        for slot in &layout.slots {
            picker.add(slot.x, slot.y)?;
        }
        Ok(picker)
    }

    /// Rebuild the slot list from a drawing-canvas export
    /// (`{"objects": [{"left": .., "top": ..}, ...]}`).
    pub fn from_canvas_json(
        json: &str,
        reference: (u32, u32),
        slot_width: u32,
        slot_height: u32,
    ) -> Result<Self> {
        let export: CanvasExport = serde_json::from_str(json).context("Invalid canvas export")?;
        let mut picker = Self::new(reference, slot_width, slot_height)?;

        for (i, object) in export.objects.iter().enumerate() {
            if let Some(kind) = &object.kind {
                if kind != "rect" {
                    debug!("Skipping canvas object {} of type {}", i, kind);
                    continue;
                }
            }
            // Canvas coordinates are fractional; slots are whole pixels.
            let (left, top) = (object.left.trunc(), object.top.trunc());
            if !(left >= 0.0 && top >= 0.0) {
                return Err(anyhow!(
                    "canvas object {} has negative position ({}, {})",
                    i,
                    object.left,
                    object.top
                ));
            }
            picker.add(left as u32, top as u32)?;
        }
        Ok(picker)
    }

    pub fn add(&mut self, x: u32, y: u32) -> Result<(), DetectError> {
        if x >= self.image_width || y >= self.image_height {
            return Err(DetectError::SlotOutOfBounds {
                x,
                y,
                width: self.image_width,
                height: self.image_height,
            });
        }
        self.slots.push(Slot::new(x, y));
        Ok(())
    }

    pub fn remove_last(&mut self) -> Option<Slot> {
        self.slots.pop()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Draw the picked rectangles, numbered in order, over the reference image.
    pub fn preview(&self, reference: &RgbImage) -> RgbImage {
        draw_slots(&self.slots, self.slot_width, self.slot_height, reference)
    }

    pub fn into_layout(self) -> SlotLayout {
        SlotLayout {
            image_width: self.image_width,
            image_height: self.image_height,
            slot_width: self.slot_width,
            slot_height: self.slot_height,
            slots: self.slots,
        }
    }
}
