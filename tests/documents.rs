//! Gestures through a project, saved and reopened in both document formats.

use std::path::PathBuf;

use image::Rgba;
use uuid::Uuid;

use tilecanvas::canvas::Color;
use tilecanvas::components::tools::{
    InputPhase, StrokeInput, StrokeTracker, TileBrush, ToolKind, ToolSettings, ToolTarget,
};
use tilecanvas::level::{PixelBrush, PlacementMode};
use tilecanvas::ops::pattern::{TilePattern, TileSource};
use tilecanvas::ops::raster::BrushTip;
use tilecanvas::project::Project;
use tilecanvas::settings::EditorSettings;
use tilecanvas::tilemap::TileRect;

const GREEN: Color = Rgba([0, 200, 0, 255]);

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tilecanvas-docs-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn gesture(project: &mut Project, settings: &ToolSettings, points: &[(i32, i32)]) {
    let mut tracker = StrokeTracker::default();
    let last = points.len() - 1;
    for (i, &pos) in points.iter().enumerate() {
        let phase = match i {
            0 => InputPhase::Pressed,
            i if i == last => InputPhase::Released,
            _ => InputPhase::Held,
        };
        tracker.handle(project, settings, StrokeInput { pos, phase }).unwrap();
    }
    assert!(!tracker.is_active());
}

fn painted_project() -> Project {
    let mut project = Project::new_untitled(1, 4, &EditorSettings::default()).unwrap();
    let tiles = ToolSettings {
        tool: ToolKind::Rectangle { filled: true },
        target: ToolTarget::Tiles(TileBrush {
            pattern: TilePattern::single(TileSource::Fresh),
            placement: PlacementMode::OnlyEmpty,
            fill_bounds: TileRect::new((0, 0), (15, 15)),
        }),
        layer: 0,
        width: 1,
        tip: BrushTip::Square,
    };
    gesture(&mut project, &tiles, &[(0, 0), (7, 7)]);

    let pencil = ToolSettings {
        tool: ToolKind::Pencil,
        target: ToolTarget::Pixels(PixelBrush::solid(GREEN)),
        ..tiles
    };
    gesture(&mut project, &pencil, &[(0, 0), (7, 7)]);
    project
}

#[test]
fn document_round_trips_in_both_formats() {
    let dir = scratch_dir();
    let settings = EditorSettings::default();
    let mut project = painted_project();
    assert_eq!(project.history.undo_count(), 2);
    assert!(project.is_dirty);

    for name in ["level.tcv", "level.json"] {
        let path = dir.join(name);
        project.save_as(&path, false).unwrap();
        assert!(!project.is_dirty);

        let reopened = Project::open(&path, &settings).unwrap();
        assert_eq!(reopened.id, project.id);
        assert_eq!(reopened.level.layers(), project.level.layers());
        assert_eq!(reopened.level.sheet(), project.level.sheet());
        for i in 0..8 {
            assert_eq!(reopened.level.get_pixel(0, (i, i)).unwrap(), Some(GREEN));
        }
        // History is session state and is not persisted
        assert!(!reopened.history.can_undo());
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn undo_all_then_save_keeps_allocated_frames() {
    let dir = scratch_dir();
    let mut project = painted_project();
    let frames = project.level.sheet().frame_count();
    assert_eq!(frames, 4);

    while project.undo().is_some() {}
    assert_eq!(project.level.layer(0).unwrap().tile_count(), 0);
    assert_eq!(project.level.sheet().frame_count(), frames);

    let path = dir.join("empty.tcv");
    project.save_as(&path, true).unwrap();
    let reopened = Project::open(&path, &EditorSettings::default()).unwrap();
    assert_eq!(reopened.level.layer(0).unwrap().chunk_count(), 0);
    assert_eq!(reopened.level.sheet().frame_count(), frames);
    let _ = std::fs::remove_dir_all(&dir);
}
