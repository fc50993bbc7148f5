use std::collections::HashSet;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::history::{CommandChain, Edit, EditTarget};
use crate::error::{EditError, EditResult};
use crate::tilemap::{Tile, TileCoord};

/// RGBA color, 8 bits per channel.
pub type Color = Rgba<u8>;

/// A pixel with zero alpha.
pub const TRANSPARENT: Color = Rgba([0, 0, 0, 0]);

/// Largest canvas side, in pixels, that documents can store and load.
pub const MAX_CANVAS_DIM: u32 = 32_768;

// ============================================================================
// PIXEL RECT – inclusive integer bounds with an explicit empty sentinel
// ============================================================================

/// Inclusive pixel-space rectangle. `PixelRect::EMPTY` has `min > max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect {
        min_x: u32::MAX,
        min_y: u32::MAX,
        max_x: 0,
        max_y: 0,
    };

    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> u32 {
        if self.is_empty() { 0 } else { self.max_x - self.min_x + 1 }
    }

    pub fn height(&self) -> u32 {
        if self.is_empty() { 0 } else { self.max_y - self.min_y + 1 }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        !self.is_empty() && x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Smallest rectangle covering both.
    pub fn union(self, other: PixelRect) -> PixelRect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        PixelRect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

// ============================================================================
// CANVAS – flat RGBA buffer with change tracking
// ============================================================================

/// Rectangular RGBA pixel buffer.
///
/// Every mutation is a single-cell write. Writes land in a `changed` set which
/// the display side drains once per frame with [`Canvas::take_changed`].
/// Serializes through [`crate::io::CanvasData`]; encoding failures surface as
/// serializer errors.
#[derive(Clone, Deserialize)]
#[serde(try_from = "crate::io::CanvasData")]
pub struct Canvas {
    pixels: RgbaImage,
    changed: HashSet<(u32, u32)>,
}

impl Canvas {
    // ---- construction -------------------------------------------------------

    /// Create a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            changed: HashSet::new(),
        }
    }

    pub fn new_filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, color),
            changed: HashSet::new(),
        }
    }

    pub fn from_rgba_image(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            changed: HashSet::new(),
        }
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    // ---- pixel access -------------------------------------------------------

    fn check_bounds(&self, x: u32, y: u32) -> EditResult<()> {
        if x < self.width() && y < self.height() {
            Ok(())
        } else {
            Err(EditError::OutOfBounds {
                x: x as i64,
                y: y as i64,
                width: self.width(),
                height: self.height(),
            })
        }
    }

    pub fn get(&self, x: u32, y: u32) -> EditResult<Color> {
        self.check_bounds(x, y)?;
        Ok(*self.pixels.get_pixel(x, y))
    }

    /// Overwrite one cell. When a chain is supplied the previous color is
    /// recorded first; writes that change nothing are not recorded.
    pub fn set(
        &mut self,
        x: u32,
        y: u32,
        color: Color,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<()> {
        self.check_bounds(x, y)?;
        let before = *self.pixels.get_pixel(x, y);
        if let Some(chain) = chain {
            if before != color {
                chain.record(Edit::Pixel {
                    x,
                    y,
                    before,
                    after: color,
                });
            }
        }
        self.pixels.put_pixel(x, y, color);
        self.changed.insert((x, y));
        Ok(())
    }

    /// `lerp(current, color, opacity)` per channel, then [`Canvas::set`].
    pub fn blend(
        &mut self,
        x: u32,
        y: u32,
        color: Color,
        opacity: f32,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<()> {
        let current = self.get(x, y)?;
        self.set(x, y, lerp_color(current, color, opacity), chain)
    }

    /// Copy a `w × h` block from `src` to `dst` through [`Canvas::set`].
    /// The source is read completely before the first write, so overlapping
    /// blocks copy correctly.
    pub fn copy_region(
        &mut self,
        src: (u32, u32),
        dst: (u32, u32),
        w: u32,
        h: u32,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<()> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        self.check_bounds(src.0 + w - 1, src.1 + h - 1)?;
        self.check_bounds(dst.0 + w - 1, dst.1 + h - 1)?;

        let mut block = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                block.push(*self.pixels.get_pixel(src.0 + x, src.1 + y));
            }
        }
        for (i, color) in block.into_iter().enumerate() {
            let x = dst.0 + i as u32 % w;
            let y = dst.1 + i as u32 / w;
            self.set(x, y, color, chain.as_deref_mut())?;
        }
        Ok(())
    }

    /// Grow the canvas downward by `extra` transparent rows.
    /// Existing cells keep their coordinates.
    pub fn extend_rows(&mut self, extra: u32) {
        if extra == 0 {
            return;
        }
        let width = self.width();
        let height = self.height() + extra;
        let mut raw = std::mem::replace(&mut self.pixels, RgbaImage::new(0, 0)).into_raw();
        raw.resize(width as usize * height as usize * 4, 0);
        self.pixels = RgbaImage::from_raw(width, height, raw)
            .unwrap_or_else(|| RgbaImage::new(width, height));
    }

    // ---- queries ------------------------------------------------------------

    /// Minimal rectangle containing every pixel with nonzero alpha, or
    /// `PixelRect::EMPTY`. Scans the whole buffer, rows in parallel.
    pub fn bounds_of_opaque_region(&self) -> PixelRect {
        let width = self.width() as usize;
        if width == 0 || self.height() == 0 {
            return PixelRect::EMPTY;
        }
        self.pixels
            .as_raw()
            .par_chunks(width * 4)
            .enumerate()
            .filter_map(|(y, row)| {
                let mut span: Option<(u32, u32)> = None;
                for (x, px) in row.chunks_exact(4).enumerate() {
                    if px[3] != 0 {
                        let x = x as u32;
                        span = Some(match span {
                            Some((lo, _)) => (lo, x),
                            None => (x, x),
                        });
                    }
                }
                span.map(|(lo, hi)| PixelRect::new(lo, y as u32, hi, y as u32))
            })
            .reduce(|| PixelRect::EMPTY, PixelRect::union)
    }

    // ---- change tracking ----------------------------------------------------

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Drain the cells written since the last call, row-major.
    pub fn take_changed(&mut self) -> Vec<(u32, u32)> {
        let mut cells: Vec<(u32, u32)> = self.changed.drain().collect();
        cells.sort_unstable_by_key(|&(x, y)| (y, x));
        cells
    }
}

impl PartialEq for Canvas {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.pixels.as_raw() == other.pixels.as_raw()
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("changed", &self.changed.len())
            .finish()
    }
}

impl EditTarget for Canvas {
    fn apply_pixel(&mut self, x: u32, y: u32, color: Color) {
        if let Err(e) = self.set(x, y, color, None) {
            log::warn!("Canvas: dropped replayed pixel edit: {}", e);
        }
    }

    fn apply_tile(&mut self, layer: usize, coord: TileCoord, _tile: Option<&Tile>) {
        log::warn!(
            "Canvas: tile edit for layer {} at {:?} replayed against a bare canvas, skipped",
            layer,
            coord
        );
    }
}

/// Per-channel linear interpolation from `current` toward `color`.
/// `opacity` is clamped to [0, 1]; 1 returns `color` exactly.
pub fn lerp_color(current: Color, color: Color, opacity: f32) -> Color {
    let t = opacity.clamp(0.0, 1.0);
    if t >= 1.0 {
        return color;
    }
    let mut out = [0u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        let a = current[i] as f32;
        let b = color[i] as f32;
        *channel = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
