//! Level editing: tile layers over a shared tile sheet.
//!
//! `LevelState` owns the sheet canvas, the ordered layers and a registry of
//! which slots reference each sheet frame. Every tile and pixel edit of the
//! editor goes through here so the registry never drifts from the layers.

use std::collections::{HashMap, HashSet};

use crate::canvas::{Canvas, Color, MAX_CANVAS_DIM, PixelRect, lerp_color};
use crate::components::history::{CommandChain, Edit, EditTarget};
use crate::error::{EditError, EditResult};
use crate::ops::pattern::{PatternPhase, TilePattern, TileSource};
use crate::ops::raster::{Circle, Line, Point, Rectangle, flood_fill_bounded};
use crate::settings::EditorSettings;
use crate::tilemap::{FrameId, Tile, TileCoord, TileLayer, TileRect};

// ============================================================================
// TILE SHEET
// ============================================================================

/// The shared sprite sheet: a canvas cut into `tile_size`² frames, `columns`
/// per row. Frames are allocated in order and never reused.
#[derive(Clone, Debug, PartialEq)]
pub struct TileSheet {
    canvas: Canvas,
    tile_size: u32,
    columns: u32,
    next_frame: u32,
}

impl TileSheet {
    /// Empty sheet; rows are added as frames are allocated.
    pub fn new(tile_size: u32, columns: u32) -> EditResult<Self> {
        let width = tile_size
            .checked_mul(columns)
            .filter(|&w| w > 0 && w <= MAX_CANVAS_DIM);
        let Some(width) = width else {
            return Err(EditError::InvalidGeometry(format!(
                "tile size {} with {} columns (sheet width must be 1..={})",
                tile_size, columns, MAX_CANVAS_DIM
            )));
        };
        Ok(Self {
            canvas: Canvas::new(width, 0),
            tile_size,
            columns,
            next_frame: 0,
        })
    }

    /// Rebuild a sheet from stored parts, checking that the canvas can hold
    /// `frame_count` frames of the given geometry.
    pub fn from_parts(
        canvas: Canvas,
        tile_size: u32,
        columns: u32,
        frame_count: u32,
    ) -> EditResult<Self> {
        let mut sheet = Self::new(tile_size, columns)?;
        if canvas.width() != sheet.canvas.width()
            || canvas.height() % tile_size != 0
            || canvas.height() > MAX_CANVAS_DIM
        {
            return Err(EditError::InvalidGeometry(format!(
                "{}x{} sheet cannot hold {}px tiles in {} columns",
                canvas.width(),
                canvas.height(),
                tile_size,
                columns
            )));
        }
        sheet.canvas = canvas;
        if frame_count > sheet.capacity() {
            return Err(EditError::InvalidGeometry(format!(
                "{} frames exceed sheet capacity {}",
                frame_count,
                sheet.capacity()
            )));
        }
        sheet.next_frame = frame_count;
        Ok(sheet)
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Frames allocated so far.
    pub fn frame_count(&self) -> u32 {
        self.next_frame
    }

    /// Frames that fit without growing the canvas.
    pub fn capacity(&self) -> u32 {
        self.columns * (self.canvas.height() / self.tile_size)
    }

    /// Hand out the next frame, growing the canvas when full. New frames are
    /// transparent because ids are never reused. Growth doubles the row count
    /// but stops at [`MAX_CANVAS_DIM`]; past that the sheet is full.
    pub fn allocate_frame(&mut self) -> EditResult<FrameId> {
        if self.next_frame >= self.capacity() {
            let rows = self.canvas.height() / self.tile_size;
            let max_rows = MAX_CANVAS_DIM / self.tile_size;
            if rows >= max_rows {
                return Err(EditError::InvalidGeometry(format!(
                    "tile sheet is full ({} frames in {}x{})",
                    self.next_frame,
                    self.canvas.width(),
                    self.canvas.height()
                )));
            }
            let extra = rows.max(1).min(max_rows - rows);
            self.canvas.extend_rows(extra * self.tile_size);
            log::debug!(
                "tile sheet: grew to {}x{} ({} frames)",
                self.canvas.width(),
                self.canvas.height(),
                self.capacity()
            );
        }
        let id = FrameId(self.next_frame);
        self.next_frame += 1;
        Ok(id)
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        frame.0 < self.next_frame
    }

    /// Top-left sheet pixel of `frame`.
    pub fn frame_origin(&self, frame: FrameId) -> EditResult<(u32, u32)> {
        if !self.contains(frame) {
            return Err(EditError::NoSuchFrame(frame));
        }
        Ok((
            (frame.0 % self.columns) * self.tile_size,
            (frame.0 / self.columns) * self.tile_size,
        ))
    }
}

// ============================================================================
// STROKE PARAMETERS
// ============================================================================

/// How a tile stroke treats slots it passes over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlacementMode {
    /// Place only into empty slots
    #[default]
    OnlyEmpty,
    /// Place everywhere, replacing existing tiles
    Overwrite,
    /// Clear occupied slots, ignore the pattern
    Erase,
}

/// Everything a tile stroke needs besides the shape.
#[derive(Clone, Copy, Debug)]
pub struct TileStroke<'a> {
    pub pattern: &'a TilePattern,
    pub placement: PlacementMode,
    pub phase: PatternPhase,
    /// Report what would change without changing it
    pub preview: bool,
}

/// A slot a tile stroke touched (or would touch, in preview).
/// `source == None` means the slot is erased.
#[derive(Clone, Debug, PartialEq)]
pub struct Ghost {
    pub coord: TileCoord,
    pub source: Option<TileSource>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelBrush {
    pub color: Color,
    /// Blend factor toward `color`, clamped to [0, 1]
    pub opacity: f32,
    /// Edit the shared frame (all instances change) instead of detaching
    pub sync_identical: bool,
}

impl PixelBrush {
    pub fn solid(color: Color) -> Self {
        Self {
            color,
            opacity: 1.0,
            sync_identical: true,
        }
    }

    /// Opaque brush whose sync behavior follows the editor settings.
    pub fn from_settings(color: Color, settings: &EditorSettings) -> Self {
        Self {
            sync_identical: settings.sync_identical,
            ..Self::solid(color)
        }
    }
}

// ============================================================================
// LEVEL STATE
// ============================================================================

pub struct LevelState {
    sheet: TileSheet,
    layers: Vec<TileLayer>,
    /// frame -> every (layer, coord) slot currently holding it
    frame_refs: HashMap<FrameId, HashSet<(usize, TileCoord)>>,
}

impl LevelState {
    pub fn new(tile_size: u32, columns: u32) -> EditResult<Self> {
        Ok(Self {
            sheet: TileSheet::new(tile_size, columns)?,
            layers: Vec::new(),
            frame_refs: HashMap::new(),
        })
    }

    /// Assemble from loaded parts. Fails if a layer disagrees with the sheet
    /// tile size or references a frame the sheet never allocated.
    pub fn from_parts(sheet: TileSheet, layers: Vec<TileLayer>) -> EditResult<Self> {
        let mut level = Self {
            sheet,
            layers: Vec::with_capacity(layers.len()),
            frame_refs: HashMap::new(),
        };
        for layer in layers {
            let idx = level.add_layer(layer)?;
            let refs: Vec<(TileCoord, FrameId)> = level.layers[idx]
                .tiles()
                .map(|(coord, tile)| (coord, tile.frame))
                .collect();
            for (coord, frame) in refs {
                if !level.sheet.contains(frame) {
                    return Err(EditError::NoSuchFrame(frame));
                }
                level.register(frame, idx, coord);
            }
        }
        Ok(level)
    }

    pub fn into_parts(self) -> (TileSheet, Vec<TileLayer>) {
        (self.sheet, self.layers)
    }

    // ---- layers -------------------------------------------------------------

    /// Append a layer and return its index.
    pub fn add_layer(&mut self, layer: TileLayer) -> EditResult<usize> {
        if layer.tile_size() != self.sheet.tile_size() {
            return Err(EditError::TileSizeMismatch {
                layer: layer.tile_size(),
                sheet: self.sheet.tile_size(),
            });
        }
        self.layers.push(layer);
        Ok(self.layers.len() - 1)
    }

    pub fn layer(&self, layer: usize) -> EditResult<&TileLayer> {
        self.layers.get(layer).ok_or(EditError::NoSuchLayer(layer))
    }

    pub fn layers(&self) -> &[TileLayer] {
        &self.layers
    }

    pub fn set_layer_visible(&mut self, layer: usize, visible: bool) -> EditResult<()> {
        self.layers
            .get_mut(layer)
            .ok_or(EditError::NoSuchLayer(layer))?
            .visible = visible;
        Ok(())
    }

    pub fn sheet(&self) -> &TileSheet {
        &self.sheet
    }

    fn check_layer(&self, layer: usize) -> EditResult<()> {
        self.layer(layer).map(|_| ())
    }

    /// Drop empty chunks in every layer. Returns the number removed.
    pub fn compact(&mut self) -> usize {
        self.layers.iter_mut().map(TileLayer::compact).sum()
    }

    // ---- instance registry --------------------------------------------------

    fn register(&mut self, frame: FrameId, layer: usize, coord: TileCoord) {
        self.frame_refs.entry(frame).or_default().insert((layer, coord));
    }

    fn unregister(&mut self, frame: FrameId, layer: usize, coord: TileCoord) {
        if let Some(refs) = self.frame_refs.get_mut(&frame) {
            refs.remove(&(layer, coord));
            if refs.is_empty() {
                self.frame_refs.remove(&frame);
            }
        }
    }

    /// Slots referencing `frame`, sorted by layer then row-major coordinate.
    pub fn frame_instances(&self, frame: FrameId) -> Vec<(usize, TileCoord)> {
        let mut out: Vec<(usize, TileCoord)> = self
            .frame_refs
            .get(&frame)
            .map(|refs| refs.iter().copied().collect())
            .unwrap_or_default();
        out.sort_unstable_by_key(|&(layer, (x, y))| (layer, y, x));
        out
    }

    pub fn instance_count(&self, frame: FrameId) -> usize {
        self.frame_refs.get(&frame).map_or(0, HashSet::len)
    }

    /// Raw slot write keeping the registry in step. Layer must exist.
    fn write_slot(&mut self, layer: usize, coord: TileCoord, tile: Option<Tile>) -> Option<Tile> {
        let new_frame = tile.as_ref().map(|t| t.frame);
        let before = self.layers[layer].replace_slot(coord, tile);
        if let Some(old) = &before {
            self.unregister(old.frame, layer, coord);
        }
        if let Some(frame) = new_frame {
            self.register(frame, layer, coord);
        }
        before
    }

    // ---- tile edits ---------------------------------------------------------

    /// A tile on a freshly allocated, transparent frame.
    pub fn new_tile(&mut self) -> EditResult<Tile> {
        Ok(Tile::new(self.sheet.allocate_frame()?))
    }

    pub fn get_tile(&self, layer: usize, coord: TileCoord) -> EditResult<Option<&Tile>> {
        Ok(self.layer(layer)?.get_tile(coord))
    }

    /// Put `tile` (or nothing) in one slot, recording the previous content.
    pub fn set_tile(
        &mut self,
        layer: usize,
        coord: TileCoord,
        tile: Option<Tile>,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<()> {
        self.check_layer(layer)?;
        if let Some(t) = &tile {
            if !self.sheet.contains(t.frame) {
                return Err(EditError::NoSuchFrame(t.frame));
            }
        }
        let after = tile.clone();
        let before = self.write_slot(layer, coord, tile);
        if let Some(chain) = chain {
            if before != after {
                chain.record(Edit::Tile {
                    layer,
                    coord,
                    before,
                    after,
                });
            }
        }
        Ok(())
    }

    pub fn set_line(
        &mut self,
        layer: usize,
        line: Line,
        stroke: &TileStroke,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<Vec<Ghost>> {
        self.set_points(layer, line.points(), stroke, chain)
    }

    pub fn set_rectangle(
        &mut self,
        layer: usize,
        rect: Rectangle,
        filled: bool,
        stroke: &TileStroke,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<Vec<Ghost>> {
        if filled {
            self.set_points(layer, rect.points(), stroke, chain)
        } else {
            self.set_points(layer, rect.outline(), stroke, chain)
        }
    }

    pub fn set_circle(
        &mut self,
        layer: usize,
        circle: Circle,
        stroke: &TileStroke,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<Vec<Ghost>> {
        self.set_points(layer, circle.points(), stroke, chain)
    }

    /// Flood the 4-connected region of slots whose content equals the seed
    /// slot's, limited to `bounds`.
    pub fn set_fill(
        &mut self,
        layer: usize,
        seed: TileCoord,
        bounds: TileRect,
        stroke: &TileStroke,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<Vec<Ghost>> {
        let grid = self.layer(layer)?;
        let target = grid.get_tile(seed).cloned();
        let region = flood_fill_bounded(seed, bounds, |p| grid.get_tile(p) == target.as_ref());
        log::debug!("tile fill from {:?}: {} slots", seed, region.len());
        self.set_points(layer, region, stroke, chain)
    }

    fn check_pattern(&self, pattern: &TilePattern) -> EditResult<()> {
        for y in 0..pattern.height() as i32 {
            for x in 0..pattern.width() as i32 {
                if let TileSource::Stamp(tile) = pattern.source_at((x, y), PatternPhase::default()) {
                    if !self.sheet.contains(tile.frame) {
                        return Err(EditError::NoSuchFrame(tile.frame));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a tile stroke to arbitrary coordinates, in iteration order.
    pub fn set_points<I>(
        &mut self,
        layer: usize,
        coords: I,
        stroke: &TileStroke,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<Vec<Ghost>>
    where
        I: IntoIterator<Item = Point>,
    {
        self.check_layer(layer)?;
        self.check_pattern(stroke.pattern)?;
        let mut ghosts = Vec::new();
        for coord in coords {
            let occupied = self.layers[layer].get_tile(coord).is_some();
            let source = match stroke.placement {
                PlacementMode::OnlyEmpty if occupied => continue,
                PlacementMode::Erase if !occupied => continue,
                PlacementMode::Erase => None,
                _ => Some(stroke.pattern.source_at(coord, stroke.phase).clone()),
            };
            if !stroke.preview {
                let tile = match &source {
                    None => None,
                    Some(TileSource::Stamp(tile)) => Some(tile.clone()),
                    Some(TileSource::Fresh) => Some(self.new_tile()?),
                };
                self.set_tile(layer, coord, tile, chain.as_deref_mut())?;
            }
            ghosts.push(Ghost { coord, source });
        }
        Ok(ghosts)
    }

    // ---- pixel edits --------------------------------------------------------

    /// Sheet pixel under a world pixel, or `None` over an empty slot.
    pub fn get_pixel(&self, layer: usize, world: (i32, i32)) -> EditResult<Option<Color>> {
        let grid = self.layer(layer)?;
        let (coord, (px, py)) = grid.world_to_tile(world);
        let Some(tile) = grid.get_tile(coord) else {
            return Ok(None);
        };
        let (ox, oy) = self.sheet.frame_origin(tile.frame)?;
        self.sheet.canvas.get(ox + px, oy + py).map(Some)
    }

    /// Give the tile at `coord` a private copy of its frame. The copy and the
    /// slot swap are both recorded.
    fn detach(
        &mut self,
        layer: usize,
        coord: TileCoord,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<FrameId> {
        let tile = self.layers[layer]
            .get_tile(coord)
            .cloned()
            .ok_or_else(|| {
                EditError::InvalidGeometry(format!("no tile to detach at {:?}", coord))
            })?;
        let frame = self.sheet.allocate_frame()?;
        let src = self.sheet.frame_origin(tile.frame)?;
        let dst = self.sheet.frame_origin(frame)?;
        let ts = self.sheet.tile_size;
        self.sheet
            .canvas
            .copy_region(src, dst, ts, ts, chain.as_deref_mut())?;
        log::debug!(
            "detached layer {} tile {:?}: frame {} -> {}",
            layer,
            coord,
            tile.frame.0,
            frame.0
        );
        self.set_tile(layer, coord, Some(Tile { frame, ..tile }), chain)?;
        Ok(frame)
    }

    /// Whether a pixel edit on `frame` must first give the tile its own copy.
    fn must_detach(&self, frame: FrameId, brush: &PixelBrush) -> bool {
        !brush.sync_identical && self.instance_count(frame) > 1
    }

    fn paint_world(
        &mut self,
        layer: usize,
        world: (i32, i32),
        brush: &PixelBrush,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<bool> {
        let (coord, (px, py)) = self.layers[layer].world_to_tile(world);
        let Some(mut frame) = self.layers[layer].get_tile(coord).map(|t| t.frame) else {
            return Ok(false);
        };
        if self.must_detach(frame, brush) {
            let (ox, oy) = self.sheet.frame_origin(frame)?;
            let current = self.sheet.canvas.get(ox + px, oy + py)?;
            // Unchanged pixel: keep sharing the frame
            if lerp_color(current, brush.color, brush.opacity) == current {
                return Ok(true);
            }
            frame = self.detach(layer, coord, chain.as_deref_mut())?;
        }
        let (ox, oy) = self.sheet.frame_origin(frame)?;
        self.sheet
            .canvas
            .blend(ox + px, oy + py, brush.color, brush.opacity, chain)?;
        Ok(true)
    }

    /// Paint arbitrary world pixels. Returns how many landed on a tile.
    pub fn paint_points<I>(
        &mut self,
        layer: usize,
        points: I,
        brush: &PixelBrush,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<usize>
    where
        I: IntoIterator<Item = Point>,
    {
        self.check_layer(layer)?;
        let mut painted = 0;
        for p in points {
            if self.paint_world(layer, p, brush, chain.as_deref_mut())? {
                painted += 1;
            }
        }
        Ok(painted)
    }

    /// Paint one world pixel. Returns false over an empty slot.
    pub fn paint_pixel(
        &mut self,
        layer: usize,
        world: (i32, i32),
        brush: &PixelBrush,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<bool> {
        self.check_layer(layer)?;
        self.paint_world(layer, world, brush, chain)
    }

    /// Returns the number of pixels painted.
    pub fn paint_line(
        &mut self,
        layer: usize,
        line: Line,
        brush: &PixelBrush,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<usize> {
        self.paint_points(layer, line.points(), brush, chain)
    }

    pub fn paint_rectangle(
        &mut self,
        layer: usize,
        rect: Rectangle,
        filled: bool,
        brush: &PixelBrush,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<usize> {
        if filled {
            self.paint_points(layer, rect.points(), brush, chain)
        } else {
            self.paint_points(layer, rect.outline(), brush, chain)
        }
    }

    pub fn paint_circle(
        &mut self,
        layer: usize,
        circle: Circle,
        brush: &PixelBrush,
        chain: Option<&mut CommandChain>,
    ) -> EditResult<usize> {
        self.paint_points(layer, circle.points(), brush, chain)
    }

    /// Fill the 4-connected region of pixels matching the seed pixel's color.
    /// The region never leaves the seed tile's frame.
    pub fn paint_fill(
        &mut self,
        layer: usize,
        seed: (i32, i32),
        brush: &PixelBrush,
        mut chain: Option<&mut CommandChain>,
    ) -> EditResult<usize> {
        self.check_layer(layer)?;
        let (coord, (px, py)) = self.layers[layer].world_to_tile(seed);
        let Some(mut frame) = self.layers[layer].get_tile(coord).map(|t| t.frame) else {
            return Ok(0);
        };
        let (ox, oy) = self.sheet.frame_origin(frame)?;
        let ts = self.sheet.tile_size as i32;
        let canvas = &self.sheet.canvas;
        let target = canvas.get(ox + px, oy + py)?;
        let region = flood_fill_bounded(
            (px as i32, py as i32),
            Rectangle::new((0, 0), (ts - 1, ts - 1)),
            |(x, y)| canvas.get(ox + x as u32, oy + y as u32).ok() == Some(target),
        );
        // Every cell in the region holds `target`, so one comparison decides
        // whether the fill changes anything at all.
        if lerp_color(target, brush.color, brush.opacity) == target {
            return Ok(region.len());
        }
        if self.must_detach(frame, brush) {
            frame = self.detach(layer, coord, chain.as_deref_mut())?;
        }
        let (ox, oy) = self.sheet.frame_origin(frame)?;
        for &(x, y) in &region {
            self.sheet.canvas.blend(
                ox + x as u32,
                oy + y as u32,
                brush.color,
                brush.opacity,
                chain.as_deref_mut(),
            )?;
        }
        Ok(region.len())
    }

    // ---- queries ------------------------------------------------------------

    /// Opaque bounds of the whole sheet canvas.
    pub fn opaque_bounds(&self) -> PixelRect {
        self.sheet.canvas.bounds_of_opaque_region()
    }

    pub fn tile_bounds_for_world_rect(
        &self,
        layer: usize,
        min: (i32, i32),
        max: (i32, i32),
    ) -> EditResult<TileRect> {
        Ok(self.layer(layer)?.tile_bounds_for_world_rect(min, max))
    }

    /// Sheet cells written since the last call, for texture upload.
    pub fn take_changed_pixels(&mut self) -> Vec<(u32, u32)> {
        self.sheet.canvas.take_changed()
    }
}

impl EditTarget for LevelState {
    fn apply_pixel(&mut self, x: u32, y: u32, color: Color) {
        if let Err(e) = self.sheet.canvas.set(x, y, color, None) {
            log::warn!("Level: dropped replayed pixel edit: {}", e);
        }
    }

    fn apply_tile(&mut self, layer: usize, coord: TileCoord, tile: Option<&Tile>) {
        if layer >= self.layers.len() {
            log::warn!("Level: replayed tile edit for missing layer {}", layer);
            return;
        }
        self.write_slot(layer, coord, tile.cloned());
    }
}

impl std::fmt::Debug for LevelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelState")
            .field("sheet", &self.sheet)
            .field("layers", &self.layers.len())
            .field("frames_in_use", &self.frame_refs.len())
            .finish()
    }
}
