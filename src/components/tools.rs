use std::collections::HashSet;

use crate::canvas::TRANSPARENT;
use crate::components::history::CommandChain;
use crate::error::EditResult;
use crate::level::{Ghost, PixelBrush, PlacementMode, TileStroke};
use crate::ops::pattern::{PatternPhase, TilePattern};
use crate::ops::raster::{BrushTip, Circle, Line, Point, Rectangle};
use crate::project::Project;
use crate::tilemap::TileRect;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    Pencil,
    Eraser,
    Line,
    Rectangle {
        filled: bool,
    },
    Circle {
        filled: bool,
    },
    Fill,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Pencil => "Pencil",
            ToolKind::Eraser => "Eraser",
            ToolKind::Line => "Line",
            ToolKind::Rectangle { .. } => "Rectangle",
            ToolKind::Circle { .. } => "Circle",
            ToolKind::Fill => "Fill",
        }
    }

    /// Freehand tools paint along the pointer path.
    fn is_freehand(&self) -> bool {
        matches!(self, ToolKind::Pencil | ToolKind::Eraser)
    }
}

/// Tile placement options for tile-granularity tools.
#[derive(Clone, Debug)]
pub struct TileBrush {
    pub pattern: TilePattern,
    pub placement: PlacementMode,
    /// Tile fills never leave this rectangle
    pub fill_bounds: TileRect,
}

/// What a tool writes: pixels inside tiles, or tiles in the grid.
#[derive(Clone, Debug)]
pub enum ToolTarget {
    Pixels(PixelBrush),
    Tiles(TileBrush),
}

#[derive(Clone, Debug)]
pub struct ToolSettings {
    pub tool: ToolKind,
    pub target: ToolTarget,
    pub layer: usize,
    /// Line and freehand width, in pixels or tiles
    pub width: u32,
    pub tip: BrushTip,
}

impl ToolSettings {
    fn description(&self) -> String {
        match self.target {
            ToolTarget::Pixels(_) => format!("{} Stroke", self.tool.label()),
            ToolTarget::Tiles(_) => format!("Tile {}", self.tool.label()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputPhase {
    Pressed,
    Held,
    Released,
}

/// One pointer sample in world pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeInput {
    pub pos: (i32, i32),
    pub phase: InputPhase,
}

/// Tracks one gesture from press to release and routes it into the level.
///
/// The gesture's [`CommandChain`] is opened on press and committed on
/// release, so a whole stroke undoes as one step. Tile line strokes remember
/// their pattern offset so the next line started at the previous end
/// continues the pattern without a seam.
#[derive(Default)]
pub struct StrokeTracker {
    chain: Option<CommandChain>,
    /// Press position (tile or pixel space, per target)
    start: Option<Point>,
    /// Most recent sample
    last: Option<Point>,
    phase: PatternPhase,
    /// Coordinates a freehand gesture already covered
    visited: HashSet<Point>,
    /// (end, offset) of the last finished tile line
    continuation: Option<(Point, Point)>,
    finishing_tile_line: bool,
}

impl StrokeTracker {
    pub fn is_active(&self) -> bool {
        self.chain.is_some()
    }

    /// Feed one input sample. Returns ghosts for tile targets: placements made
    /// by this sample, or the would-be placements of a shape being dragged.
    ///
    /// An error ends the gesture; edits made before it are still committed.
    pub fn handle(
        &mut self,
        project: &mut Project,
        settings: &ToolSettings,
        input: StrokeInput,
    ) -> EditResult<Vec<Ghost>> {
        let result = self.dispatch(project, settings, input);
        if let Err(e) = &result {
            log::warn!("{}: {}", settings.description(), e);
            self.finish(project);
        }
        result
    }

    /// Abort the gesture, reverting whatever it already changed.
    pub fn cancel(&mut self, project: &mut Project) {
        if let Some(chain) = self.chain.take() {
            chain.revert(&mut project.level);
            project.history.discard(chain);
        }
        self.reset();
    }

    fn dispatch(
        &mut self,
        project: &mut Project,
        settings: &ToolSettings,
        input: StrokeInput,
    ) -> EditResult<Vec<Ghost>> {
        let pos = match settings.target {
            ToolTarget::Pixels(_) => input.pos,
            ToolTarget::Tiles(_) => project.level.layer(settings.layer)?.world_to_tile(input.pos).0,
        };

        match input.phase {
            InputPhase::Pressed => {
                if self.is_active() {
                    log::warn!("{}: press without release, closing previous stroke", settings.description());
                    self.finish(project);
                }
                self.chain = Some(project.history.begin_chain(&settings.description()));
                self.phase = self.phase_for_press(settings, pos);
                self.start = Some(pos);
                self.last = Some(pos);
                self.finishing_tile_line =
                    settings.tool == ToolKind::Line && matches!(settings.target, ToolTarget::Tiles(_));

                match settings.tool {
                    ToolKind::Pencil | ToolKind::Eraser => self.draw_segment(project, settings, pos, pos),
                    ToolKind::Fill => {
                        let ghosts = self.fill(project, settings, pos);
                        self.finish(project);
                        ghosts
                    }
                    _ => self.shape(project, settings, pos, true),
                }
            }
            InputPhase::Held => {
                let Some(last) = self.last else {
                    return Ok(Vec::new());
                };
                if pos == last {
                    return Ok(Vec::new());
                }
                self.last = Some(pos);
                match settings.tool {
                    ToolKind::Pencil | ToolKind::Eraser => self.draw_segment(project, settings, last, pos),
                    ToolKind::Fill => Ok(Vec::new()),
                    _ => self.shape(project, settings, pos, true),
                }
            }
            InputPhase::Released => {
                if !self.is_active() {
                    return Ok(Vec::new());
                }
                let last = self.last.unwrap_or(pos);
                self.last = Some(pos);
                let ghosts = match settings.tool {
                    tool if tool.is_freehand() => self.draw_segment(project, settings, last, pos),
                    ToolKind::Fill => Ok(Vec::new()),
                    _ => self.shape(project, settings, pos, false),
                };
                self.finish(project);
                ghosts
            }
        }
    }

    /// A tile line pressed exactly where the previous one ended keeps its
    /// pattern alignment; every other gesture anchors at the press point.
    fn phase_for_press(&self, settings: &ToolSettings, pos: Point) -> PatternPhase {
        match (settings.tool, &settings.target, self.continuation) {
            (ToolKind::Line, ToolTarget::Tiles(_), Some((end, offset))) if end == pos => {
                PatternPhase::resume(end, offset)
            }
            _ => PatternPhase::at(pos),
        }
    }

    fn tile_stroke<'a>(&self, settings: &ToolSettings, brush: &'a TileBrush, preview: bool) -> TileStroke<'a> {
        TileStroke {
            pattern: &brush.pattern,
            placement: if settings.tool == ToolKind::Eraser {
                PlacementMode::Erase
            } else {
                brush.placement
            },
            phase: self.phase,
            preview,
        }
    }

    fn pixel_brush(settings: &ToolSettings, brush: &PixelBrush) -> PixelBrush {
        if settings.tool == ToolKind::Eraser {
            PixelBrush {
                color: TRANSPARENT,
                opacity: 1.0,
                sync_identical: brush.sync_identical,
            }
        } else {
            *brush
        }
    }

    /// Freehand segment. Cells the gesture already covered are skipped so a
    /// translucent brush does not stack and fresh tiles are not reallocated.
    fn draw_segment(
        &mut self,
        project: &mut Project,
        settings: &ToolSettings,
        from: Point,
        to: Point,
    ) -> EditResult<Vec<Ghost>> {
        let line = Line::new(from, to, settings.width).with_tip(settings.tip);
        let points: Vec<Point> = line.points().filter(|p| self.visited.insert(*p)).collect();
        match &settings.target {
            ToolTarget::Pixels(brush) => {
                let brush = Self::pixel_brush(settings, brush);
                project
                    .level
                    .paint_points(settings.layer, points, &brush, self.chain.as_mut())?;
                Ok(Vec::new())
            }
            ToolTarget::Tiles(brush) => {
                let stroke = self.tile_stroke(settings, brush, false);
                project.level.set_points(settings.layer, points, &stroke, self.chain.as_mut())
            }
        }
    }

    fn shape(
        &mut self,
        project: &mut Project,
        settings: &ToolSettings,
        end: Point,
        preview: bool,
    ) -> EditResult<Vec<Ghost>> {
        let start = self.start.unwrap_or(end);
        let layer = settings.layer;
        let level = &mut project.level;
        match &settings.target {
            ToolTarget::Tiles(brush) => {
                let stroke = self.tile_stroke(settings, brush, preview);
                let chain = if preview { None } else { self.chain.as_mut() };
                match settings.tool {
                    ToolKind::Line => {
                        let line = Line::new(start, end, settings.width).with_tip(settings.tip);
                        level.set_line(layer, line, &stroke, chain)
                    }
                    ToolKind::Rectangle { filled } => {
                        level.set_rectangle(layer, Rectangle::new(start, end), filled, &stroke, chain)
                    }
                    ToolKind::Circle { filled } => {
                        level.set_circle(layer, Circle::new(start, radius(start, end), filled), &stroke, chain)
                    }
                    _ => Ok(Vec::new()),
                }
            }
            // pixel shapes are previewed by the renderer from start/end alone
            ToolTarget::Pixels(_) if preview => Ok(Vec::new()),
            ToolTarget::Pixels(brush) => {
                let brush = Self::pixel_brush(settings, brush);
                let chain = self.chain.as_mut();
                match settings.tool {
                    ToolKind::Line => {
                        let line = Line::new(start, end, settings.width).with_tip(settings.tip);
                        level.paint_line(layer, line, &brush, chain)?;
                    }
                    ToolKind::Rectangle { filled } => {
                        level.paint_rectangle(layer, Rectangle::new(start, end), filled, &brush, chain)?;
                    }
                    ToolKind::Circle { filled } => {
                        level.paint_circle(layer, Circle::new(start, radius(start, end), filled), &brush, chain)?;
                    }
                    _ => {}
                }
                Ok(Vec::new())
            }
        }
    }

    fn fill(&mut self, project: &mut Project, settings: &ToolSettings, seed: Point) -> EditResult<Vec<Ghost>> {
        match &settings.target {
            ToolTarget::Tiles(brush) => {
                let stroke = self.tile_stroke(settings, brush, false);
                project
                    .level
                    .set_fill(settings.layer, seed, brush.fill_bounds, &stroke, self.chain.as_mut())
            }
            ToolTarget::Pixels(brush) => {
                project
                    .level
                    .paint_fill(settings.layer, seed, brush, self.chain.as_mut())?;
                Ok(Vec::new())
            }
        }
    }

    /// Commit the open chain (or discard it if empty) and reset.
    fn finish(&mut self, project: &mut Project) {
        if let Some(chain) = self.chain.take() {
            if self.finishing_tile_line {
                if let Some(end) = self.last {
                    self.continuation = Some((end, self.phase.offset_after(end)));
                }
            }
            project.commit(chain);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.start = None;
        self.last = None;
        self.visited.clear();
        self.finishing_tile_line = false;
    }
}

/// Euclidean distance between press and drag point, rounded.
fn radius(a: Point, b: Point) -> u32 {
    let dx = (b.0 - a.0) as f64;
    let dy = (b.1 - a.1) as f64;
    (dx * dx + dy * dy).sqrt().round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Color;
    use crate::ops::pattern::TileSource;
    use crate::settings::EditorSettings;
    use crate::tilemap::{FrameId, Tile};
    use image::Rgba;

    const RED: Color = Rgba([255, 0, 0, 255]);

    fn project() -> Project {
        Project::new_untitled(1, 4, &EditorSettings::default()).unwrap()
    }

    fn input(pos: (i32, i32), phase: InputPhase) -> StrokeInput {
        StrokeInput { pos, phase }
    }

    fn pixel_tool(tool: ToolKind) -> ToolSettings {
        ToolSettings {
            tool,
            target: ToolTarget::Pixels(PixelBrush::solid(RED)),
            layer: 0,
            width: 1,
            tip: BrushTip::Square,
        }
    }

    fn tile_tool(tool: ToolKind, pattern: TilePattern) -> ToolSettings {
        ToolSettings {
            tool,
            target: ToolTarget::Tiles(TileBrush {
                pattern,
                placement: PlacementMode::Overwrite,
                fill_bounds: TileRect::new((0, 0), (7, 7)),
            }),
            layer: 0,
            width: 1,
            tip: BrushTip::Square,
        }
    }

    /// Cover world pixels (0..8, 0..4) with two tiles.
    fn with_tiles(project: &mut Project) {
        for x in 0..2 {
            let tile = project.level.new_tile().unwrap();
            project.level.set_tile(0, (x, 0), Some(tile), None).unwrap();
        }
    }

    #[test]
    fn test_pencil_stroke_is_gap_free_and_one_undo_step() {
        let mut project = project();
        with_tiles(&mut project);
        let mut tracker = StrokeTracker::default();
        let settings = pixel_tool(ToolKind::Pencil);

        tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).unwrap();
        tracker.handle(&mut project, &settings, input((6, 0), InputPhase::Held)).unwrap();
        tracker.handle(&mut project, &settings, input((6, 2), InputPhase::Released)).unwrap();
        assert!(!tracker.is_active());

        for x in 0..=6 {
            assert_eq!(project.level.get_pixel(0, (x, 0)).unwrap(), Some(RED));
        }
        assert_eq!(project.level.get_pixel(0, (6, 1)).unwrap(), Some(RED));
        assert_eq!(project.history.undo_count(), 1);

        project.undo();
        assert_eq!(project.level.get_pixel(0, (3, 0)).unwrap(), Some(TRANSPARENT));
    }

    #[test]
    fn test_stroke_over_empty_slots_leaves_no_history() {
        let mut project = project();
        let mut tracker = StrokeTracker::default();
        let settings = pixel_tool(ToolKind::Pencil);
        tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).unwrap();
        tracker.handle(&mut project, &settings, input((3, 3), InputPhase::Released)).unwrap();
        assert!(!project.history.can_undo());
        assert!(!project.history.is_recording());
    }

    #[test]
    fn test_shape_previews_then_commits_on_release() {
        let mut project = project();
        let mut tracker = StrokeTracker::default();
        let settings = tile_tool(
            ToolKind::Rectangle { filled: true },
            TilePattern::single(TileSource::Fresh),
        );

        tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).unwrap();
        let ghosts = tracker.handle(&mut project, &settings, input((11, 7), InputPhase::Held)).unwrap();
        assert_eq!(ghosts.len(), 3 * 2);
        assert_eq!(project.level.layer(0).unwrap().tile_count(), 0);

        tracker.handle(&mut project, &settings, input((8, 4), InputPhase::Released)).unwrap();
        assert_eq!(project.level.layer(0).unwrap().tile_count(), 3 * 2);
        assert_eq!(project.history.undo_description().as_deref(), Some("Tile Rectangle"));

        project.undo();
        assert_eq!(project.level.layer(0).unwrap().tile_count(), 0);
    }

    #[test]
    fn test_fill_commits_on_press() {
        let mut project = project();
        let stamp = project.level.new_tile().unwrap();
        let mut tracker = StrokeTracker::default();
        let settings = tile_tool(ToolKind::Fill, TilePattern::single(TileSource::Stamp(stamp)));

        tracker.handle(&mut project, &settings, input((5, 5), InputPhase::Pressed)).unwrap();
        assert!(!tracker.is_active());
        assert_eq!(project.level.layer(0).unwrap().tile_count(), 64);
        assert_eq!(project.history.undo_count(), 1);
        // release after a committed fill is ignored
        tracker.handle(&mut project, &settings, input((5, 5), InputPhase::Released)).unwrap();
        assert_eq!(project.history.undo_count(), 1);
    }

    #[test]
    fn test_tile_eraser() {
        let mut project = project();
        with_tiles(&mut project);
        let mut tracker = StrokeTracker::default();
        let settings = tile_tool(ToolKind::Eraser, TilePattern::single(TileSource::Fresh));
        tracker.handle(&mut project, &settings, input((1, 1), InputPhase::Pressed)).unwrap();
        let ghosts = tracker.handle(&mut project, &settings, input((7, 1), InputPhase::Released)).unwrap();
        assert_eq!(ghosts.len(), 1);
        assert_eq!(project.level.layer(0).unwrap().tile_count(), 0);
        assert_eq!(project.level.sheet().frame_count(), 2);
    }

    #[test]
    fn test_line_continuation_keeps_pattern_phase() {
        let mut project = project();
        let a = project.level.new_tile().unwrap();
        let b = project.level.new_tile().unwrap();
        let pattern = TilePattern::new(
            2,
            1,
            vec![TileSource::Stamp(a.clone()), TileSource::Stamp(b.clone())],
        )
        .unwrap();
        let settings = tile_tool(ToolKind::Line, pattern);
        let mut tracker = StrokeTracker::default();

        // tiles are 4px: world x 4 -> tile 1, x 12 -> tile 3
        tracker.handle(&mut project, &settings, input((4, 0), InputPhase::Pressed)).unwrap();
        tracker.handle(&mut project, &settings, input((12, 0), InputPhase::Released)).unwrap();
        tracker.handle(&mut project, &settings, input((12, 0), InputPhase::Pressed)).unwrap();
        tracker.handle(&mut project, &settings, input((28, 0), InputPhase::Released)).unwrap();

        let frames: Vec<FrameId> = (1..=7)
            .map(|x| project.level.get_tile(0, (x, 0)).unwrap().unwrap().frame)
            .collect();
        for pair in frames.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(frames[0], a.frame);
        assert_eq!(project.history.undo_count(), 2);
    }

    #[test]
    fn test_cancel_reverts_stroke() {
        let mut project = project();
        with_tiles(&mut project);
        let mut tracker = StrokeTracker::default();
        let settings = pixel_tool(ToolKind::Pencil);
        tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).unwrap();
        tracker.handle(&mut project, &settings, input((5, 0), InputPhase::Held)).unwrap();
        tracker.cancel(&mut project);
        assert_eq!(project.level.get_pixel(0, (2, 0)).unwrap(), Some(TRANSPARENT));
        assert!(!project.history.can_undo());
        assert!(!project.history.is_recording());
    }

    #[test]
    fn test_error_ends_gesture() {
        let mut project = project();
        let mut tracker = StrokeTracker::default();
        let mut settings = tile_tool(
            ToolKind::Pencil,
            TilePattern::single(TileSource::Stamp(Tile::new(FrameId(99)))),
        );
        assert!(tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).is_err());
        assert!(!tracker.is_active());
        assert!(!project.history.is_recording());

        settings.layer = 5;
        assert!(tracker.handle(&mut project, &settings, input((0, 0), InputPhase::Pressed)).is_err());
    }
}
