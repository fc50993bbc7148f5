//! End-to-end editing scenarios through the public API.

use image::Rgba;

use tilecanvas::canvas::{Canvas, Color};
use tilecanvas::components::history::HistoryManager;
use tilecanvas::level::{LevelState, PixelBrush, PlacementMode, TileStroke};
use tilecanvas::ops::pattern::{PatternPhase, TilePattern, TileSource};
use tilecanvas::ops::raster::{Line, Rectangle, flood_fill};
use tilecanvas::tilemap::{Tile, TileLayer};

const WHITE: Color = Rgba([255, 255, 255, 255]);
const RED: Color = Rgba([255, 0, 0, 255]);

fn level_with_layer(tile_size: u32) -> LevelState {
    let mut level = LevelState::new(tile_size, 4).unwrap();
    level.add_layer(TileLayer::new("Ground", tile_size)).unwrap();
    level
}

#[test]
fn canvas_survives_bincode_and_json() {
    let mut canvas = Canvas::new(5, 3);
    canvas.set(4, 2, RED, None).unwrap();
    canvas.set(0, 0, Rgba([1, 2, 3, 4]), None).unwrap();

    let bytes = bincode::serialize(&canvas).unwrap();
    let back: Canvas = bincode::deserialize(&bytes).unwrap();
    assert_eq!(back, canvas);

    let text = serde_json::to_string(&canvas).unwrap();
    let back: Canvas = serde_json::from_str(&text).unwrap();
    assert_eq!(back.get(4, 2).unwrap(), RED);
    assert_eq!(back.get(0, 0).unwrap(), Rgba([1, 2, 3, 4]));
}

#[test]
fn paint_fill_on_white_tile_undoes_to_white() {
    let mut level = level_with_layer(4);
    let mut history = HistoryManager::new(10);
    let tile = level.new_tile().unwrap();
    level.set_tile(0, (0, 0), Some(tile), None).unwrap();
    level.paint_fill(0, (2, 2), &PixelBrush::solid(WHITE), None).unwrap();

    let mut chain = history.begin_chain("Fill");
    let filled = level
        .paint_fill(0, (0, 0), &PixelBrush::solid(RED), Some(&mut chain))
        .unwrap();
    assert_eq!(filled, 16);
    assert_eq!(chain.len(), 16);
    history.push(chain);
    assert_eq!(level.get_pixel(0, (3, 3)).unwrap(), Some(RED));

    assert_eq!(history.undo(&mut level).as_deref(), Some("Fill"));
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(level.get_pixel(0, (x, y)).unwrap(), Some(WHITE));
        }
    }
}

#[test]
fn undo_restores_exact_tiles_and_redo_replays_them() {
    let mut level = level_with_layer(4);
    let mut history = HistoryManager::new(10);
    let stamp = level.new_tile().unwrap().with_collision(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]);
    let pattern = TilePattern::single(TileSource::Stamp(stamp.clone()));
    let stroke = TileStroke {
        pattern: &pattern,
        placement: PlacementMode::Overwrite,
        phase: PatternPhase::default(),
        preview: false,
    };

    let mut chain = history.begin_chain("Tile Rectangle");
    level
        .set_rectangle(0, Rectangle::new((2, 2), (0, 0)), true, &stroke, Some(&mut chain))
        .unwrap();
    history.push(chain);
    assert_eq!(level.layer(0).unwrap().tile_count(), 9);
    assert_eq!(level.instance_count(stamp.frame), 9);

    history.undo(&mut level);
    assert_eq!(level.layer(0).unwrap().tile_count(), 0);
    assert_eq!(level.instance_count(stamp.frame), 0);

    history.redo(&mut level);
    assert_eq!(level.get_tile(0, (1, 1)).unwrap(), Some(&stamp));
    assert_eq!(level.instance_count(stamp.frame), 9);
}

#[test]
fn tile_fill_twice_changes_nothing_the_second_time() {
    let mut level = level_with_layer(4);
    let mut history = HistoryManager::new(10);
    let tile = level.new_tile().unwrap();
    let pattern = TilePattern::single(TileSource::Stamp(tile));
    let stroke = TileStroke {
        pattern: &pattern,
        placement: PlacementMode::Overwrite,
        phase: PatternPhase::default(),
        preview: false,
    };
    let bounds = Rectangle::new((-3, -3), (3, 3));

    let mut first = history.begin_chain("Tile Fill");
    level.set_fill(0, (0, 0), bounds, &stroke, Some(&mut first)).unwrap();
    assert_eq!(first.len(), 49);
    history.push(first);

    let mut second = history.begin_chain("Tile Fill");
    level.set_fill(0, (0, 0), bounds, &stroke, Some(&mut second)).unwrap();
    assert!(second.is_empty());
    history.discard(second);
    assert_eq!(history.undo_count(), 1);
}

#[test]
fn flood_fill_on_open_grid_region() {
    let wall = |p: (i32, i32)| p.0 == 3 || p.1 == 3 || p.0 < 0 || p.1 < 0;
    let region = flood_fill((1, 1), |p| !wall(p));
    assert_eq!(region.len(), 9);
    assert!(region.iter().all(|&p| !wall(p)));
}

#[test]
fn line_direction_does_not_matter() {
    let forward: Vec<_> = Line::new((-2, 5), (9, -1), 1).points().collect();
    let backward: Vec<_> = Line::new((9, -1), (-2, 5), 1).points().collect();
    assert_eq!(forward, backward);
    assert_eq!(forward.first(), Some(&(-2, 5)));
    assert_eq!(forward.last(), Some(&(9, -1)));

    let a: Vec<_> = Rectangle::new((4, 0), (0, 2)).points().collect();
    let b: Vec<_> = Rectangle::new((0, 2), (4, 0)).points().collect();
    assert_eq!(a, b);
    assert_eq!(a.len(), 15);
}

#[test]
fn pattern_stays_seamless_across_segments() {
    let mut level = level_with_layer(4);
    let a = level.new_tile().unwrap();
    let b = level.new_tile().unwrap();
    let c = level.new_tile().unwrap();
    let pattern = TilePattern::new(
        3,
        1,
        vec![
            TileSource::Stamp(a.clone()),
            TileSource::Stamp(b.clone()),
            TileSource::Stamp(c.clone()),
        ],
    )
    .unwrap();

    let first = PatternPhase::at((0, 0));
    let stroke = TileStroke {
        pattern: &pattern,
        placement: PlacementMode::Overwrite,
        phase: first,
        preview: false,
    };
    level.set_line(0, Line::new((0, 0), (4, 0), 1), &stroke, None).unwrap();

    let offset = first.offset_after((4, 0));
    let stroke = TileStroke {
        phase: PatternPhase::resume((4, 0), offset),
        ..stroke
    };
    level.set_line(0, Line::new((4, 0), (8, 0), 1), &stroke, None).unwrap();

    let expected = [&a, &b, &c];
    for x in 0..=8 {
        assert_eq!(level.get_tile(0, (x, 0)).unwrap(), Some(expected[(x % 3) as usize]));
    }
}

#[test]
fn erasing_empty_space_creates_no_chunks() {
    let mut level = level_with_layer(4);
    let pattern = TilePattern::single(TileSource::Fresh);
    let stroke = TileStroke {
        pattern: &pattern,
        placement: PlacementMode::Erase,
        phase: PatternPhase::default(),
        preview: false,
    };
    level
        .set_rectangle(0, Rectangle::new((-40, -40), (40, 40)), true, &stroke, None)
        .unwrap();
    assert_eq!(level.layer(0).unwrap().chunk_count(), 0);

    let frame = level.new_tile().unwrap().frame;
    level.set_tile(0, (0, 0), Some(Tile::new(frame)), None).unwrap();
    level.set_tile(0, (0, 0), None, None).unwrap();
    assert_eq!(level.layer(0).unwrap().chunk_count(), 1);
    assert_eq!(level.compact(), 1);
    assert_eq!(level.layer(0).unwrap().chunk_count(), 0);
}
