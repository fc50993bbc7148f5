//! Multi-tile stamping patterns and their phase.
//!
//! A pattern is indexed by world tile coordinate relative to an anchor, so a
//! stroke split into several segments stays seamless as long as every segment
//! uses the same anchor. The anchor is caller state: after a segment the
//! caller keeps `offset_after(end)` and rebuilds the phase with `resume`.

use crate::ops::raster::Point;
use crate::tilemap::Tile;

/// What a pattern cell places.
#[derive(Clone, Debug, PartialEq)]
pub enum TileSource {
    /// An existing tile reference, stamped as-is.
    Stamp(Tile),
    /// A new tile on a freshly allocated transparent frame.
    Fresh,
}

/// `width × height` grid of tile sources, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePattern {
    width: u32,
    height: u32,
    cells: Vec<TileSource>,
}

impl TilePattern {
    /// Build from row-major cells. Returns `None` for an empty pattern or a
    /// cell count other than `width * height`.
    pub fn new(width: u32, height: u32, cells: Vec<TileSource>) -> Option<Self> {
        let count = width.checked_mul(height).filter(|&n| n > 0)?;
        if cells.len() != count as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            cells,
        })
    }

    /// 1×1 pattern.
    pub fn single(source: TileSource) -> Self {
        Self {
            width: 1,
            height: 1,
            cells: vec![source],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pattern cell for `coord` under `phase`.
    pub fn source_at(&self, coord: Point, phase: PatternPhase) -> &TileSource {
        let (ix, iy) = phase.index(coord, self.width, self.height);
        &self.cells[(iy * self.width + ix) as usize]
    }
}

/// Pattern alignment: the world tile coordinate where cell `[0, 0]` lands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatternPhase {
    pub anchor: Point,
}

impl PatternPhase {
    pub fn at(anchor: Point) -> Self {
        Self { anchor }
    }

    /// Re-derive the anchor for a stroke that continues from `last_end`, given
    /// the offset saved when the previous segment finished.
    pub fn resume(last_end: Point, offset: Point) -> Self {
        Self {
            anchor: (
                last_end.0.wrapping_sub(offset.0),
                last_end.1.wrapping_sub(offset.1),
            ),
        }
    }

    /// `(coord - anchor) mod (width, height)`, always non-negative.
    pub fn index(&self, coord: Point, width: u32, height: u32) -> (u32, u32) {
        let wrap = |c: i32, a: i32, n: u32| {
            (i64::from(c) - i64::from(a)).rem_euclid(i64::from(n)) as u32
        };
        (
            wrap(coord.0, self.anchor.0, width),
            wrap(coord.1, self.anchor.1, height),
        )
    }

    /// Offset to carry into the next segment: `end - anchor`, wrapping, so
    /// [`PatternPhase::resume`] always recovers the anchor exactly.
    pub fn offset_after(&self, end: Point) -> Point {
        (
            end.0.wrapping_sub(self.anchor.0),
            end.1.wrapping_sub(self.anchor.1),
        )
    }
}
