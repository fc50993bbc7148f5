//! Sparse chunked tile storage.
//!
//! A [`TileLayer`] is an unbounded grid of tile slots, stored as a hash map of
//! fixed-size [`Chunk`]s keyed by chunk coordinate. Chunks appear on the first
//! placement inside them and stay until [`TileLayer::compact`] drops the empty
//! ones. This module is raw storage only; edits that record history or touch
//! the sheet go through [`crate::level::LevelState`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ops::raster::Rectangle;

/// Side length of a chunk in tiles.
pub const CHUNK_SIZE: usize = 16;
const CHUNK_SIDE: i32 = CHUNK_SIZE as i32;
const CHUNK_SLOTS: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Tile-space coordinate (one unit per tile).
pub type TileCoord = (i32, i32);

/// Closed tile-space rectangle, used to bound tile fills and visibility queries.
pub type TileRect = Rectangle;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Index of a `tile_size`² frame in the shared tile sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u32);

/// Chunk-space coordinate. Serialized as the string `"x,y"` so it can key a
/// map in text formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The chunk owning `tile`, by floor division.
    pub fn of(tile: TileCoord) -> Self {
        Self {
            x: tile.0.div_euclid(CHUNK_SIDE),
            y: tile.1.div_euclid(CHUNK_SIDE),
        }
    }

    /// Tile coordinate of this chunk's top-left slot. Chunks built by
    /// [`ChunkCoord::of`] or parsed from a key always have one.
    pub fn origin(&self) -> TileCoord {
        (self.x * CHUNK_SIDE, self.y * CHUNK_SIDE)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for ChunkCoord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("chunk key '{}' is not of the form x,y", s))?;
        let x = x
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("chunk key '{}': {}", s, e))?;
        let y = y
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("chunk key '{}': {}", s, e))?;
        // every slot of the chunk must have an i32 tile coordinate
        if x.checked_mul(CHUNK_SIDE).is_none() || y.checked_mul(CHUNK_SIDE).is_none() {
            return Err(format!("chunk key '{}' is out of range", s));
        }
        Ok(Self { x, y })
    }
}

impl Serialize for ChunkCoord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkCoord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

/// Slot position inside its chunk.
fn local_index(tile: TileCoord) -> usize {
    let lx = tile.0.rem_euclid(CHUNK_SIDE) as usize;
    let ly = tile.1.rem_euclid(CHUNK_SIDE) as usize;
    ly * CHUNK_SIZE + lx
}

// ============================================================================
// TILE
// ============================================================================

/// Collision polygon in tile-local pixel space.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionShape {
    pub points: Vec<(f32, f32)>,
}

/// A placed tile: a sheet frame reference plus optional collision data.
/// Tiles own no pixels; two tiles on the same frame show the same image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub frame: FrameId,
    pub collision: Option<CollisionShape>,
}

impl Tile {
    pub fn new(frame: FrameId) -> Self {
        Self {
            frame,
            collision: None,
        }
    }

    pub fn with_collision(mut self, points: Vec<(f32, f32)>) -> Self {
        self.collision = Some(CollisionShape { points });
        self
    }
}

// ============================================================================
// CHUNK
// ============================================================================

/// `CHUNK_SIZE`² slots, row-major. Serialized as the flat slot list; a list
/// of any other length is rejected on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<Tile>>", into = "Vec<Option<Tile>>")]
pub struct Chunk {
    slots: Vec<Option<Tile>>,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            slots: vec![None; CHUNK_SLOTS],
        }
    }

    pub fn get(&self, lx: usize, ly: usize) -> Option<&Tile> {
        self.slots.get(ly * CHUNK_SIZE + lx).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Option<Tile>>> for Chunk {
    type Error = String;

    fn try_from(slots: Vec<Option<Tile>>) -> Result<Self, Self::Error> {
        if slots.len() != CHUNK_SLOTS {
            return Err(format!(
                "chunk has {} slots, expected {}",
                slots.len(),
                CHUNK_SLOTS
            ));
        }
        Ok(Self { slots })
    }
}

impl From<Chunk> for Vec<Option<Tile>> {
    fn from(chunk: Chunk) -> Self {
        chunk.slots
    }
}

// ============================================================================
// TILE LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileLayer {
    pub name: String,
    pub visible: bool,
    tile_size: u32,
    chunks: HashMap<ChunkCoord, Chunk>,
}

impl TileLayer {
    pub fn new(name: &str, tile_size: u32) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            tile_size,
            chunks: HashMap::new(),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn get_tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.chunks
            .get(&ChunkCoord::of(coord))
            .and_then(|chunk| chunk.slots[local_index(coord)].as_ref())
    }

    /// Store `tile` in the slot at `coord` and return what was there.
    /// Placing creates the owning chunk; clearing never does.
    pub fn replace_slot(&mut self, coord: TileCoord, tile: Option<Tile>) -> Option<Tile> {
        let key = ChunkCoord::of(coord);
        let idx = local_index(coord);
        match tile {
            Some(tile) => self.chunks.entry(key).or_default().slots[idx].replace(tile),
            None => self.chunks.get_mut(&key).and_then(|c| c.slots[idx].take()),
        }
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Chunks intersecting the tile rectangle, for the renderer's visible set.
    pub fn chunks_in(&self, rect: TileRect) -> impl Iterator<Item = (ChunkCoord, &Chunk)> + '_ {
        let lo = ChunkCoord::of(rect.min());
        let hi = ChunkCoord::of(rect.max());
        self.chunks
            .iter()
            .filter(move |(c, _)| c.x >= lo.x && c.x <= hi.x && c.y >= lo.y && c.y <= hi.y)
            .map(|(c, chunk)| (*c, chunk))
    }

    /// Drop chunks with no occupied slot. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, chunk| !chunk.is_empty());
        let removed = before - self.chunks.len();
        if removed > 0 {
            log::debug!("layer '{}': compacted {} empty chunks", self.name, removed);
        }
        removed
    }

    /// Every placed tile with its coordinate. Order is unspecified.
    pub fn tiles(&self) -> impl Iterator<Item = (TileCoord, &Tile)> + '_ {
        self.chunks.iter().flat_map(|(key, chunk)| {
            let (ox, oy) = key.origin();
            chunk.slots.iter().enumerate().filter_map(move |(i, slot)| {
                slot.as_ref().map(|tile| {
                    let lx = (i % CHUNK_SIZE) as i32;
                    let ly = (i / CHUNK_SIZE) as i32;
                    ((ox + lx, oy + ly), tile)
                })
            })
        })
    }

    pub fn tile_count(&self) -> usize {
        self.chunks.values().map(Chunk::occupied).sum()
    }

    /// World pixel → (tile coordinate, pixel inside that tile).
    pub fn world_to_tile(&self, world: (i32, i32)) -> (TileCoord, (u32, u32)) {
        let ts = self.tile_size as i32;
        (
            (world.0.div_euclid(ts), world.1.div_euclid(ts)),
            (world.0.rem_euclid(ts) as u32, world.1.rem_euclid(ts) as u32),
        )
    }

    /// Tiles overlapped by the closed world-pixel rectangle `min..=max`.
    pub fn tile_bounds_for_world_rect(&self, min: (i32, i32), max: (i32, i32)) -> TileRect {
        let (a, _) = self.world_to_tile(min);
        let (b, _) = self.world_to_tile(max);
        TileRect::new(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_floor_division() {
        assert_eq!(ChunkCoord::of((0, 0)), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::of((15, 16)), ChunkCoord::new(0, 1));
        assert_eq!(ChunkCoord::of((-1, -16)), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::of((-17, 3)), ChunkCoord::new(-2, 0));
        assert_eq!(ChunkCoord::new(-2, 1).origin(), (-32, 16));
    }

    #[test]
    fn test_chunk_coord_key_format() {
        let key = ChunkCoord::new(-3, 12);
        assert_eq!(key.to_string(), "-3,12");
        assert_eq!("-3,12".parse::<ChunkCoord>(), Ok(key));
        assert!("3;12".parse::<ChunkCoord>().is_err());
        assert!("a,1".parse::<ChunkCoord>().is_err());
    }

    #[test]
    fn test_chunk_key_out_of_tile_range() {
        assert!("200000000,0".parse::<ChunkCoord>().is_err());
        assert!("0,-134217729".parse::<ChunkCoord>().is_err());
        let edge: ChunkCoord = "134217727,-134217728".parse().unwrap();
        assert_eq!(edge.origin(), (i32::MAX - 15, i32::MIN));
    }

    #[test]
    fn test_negative_coordinates_store_separately() {
        let mut layer = TileLayer::new("ground", 8);
        layer.replace_slot((-1, -1), Some(Tile::new(FrameId(1))));
        layer.replace_slot((15, 15), Some(Tile::new(FrameId(2))));
        assert_eq!(layer.chunk_count(), 2);
        assert_eq!(layer.get_tile((-1, -1)).map(|t| t.frame), Some(FrameId(1)));
        assert_eq!(layer.get_tile((15, 15)).map(|t| t.frame), Some(FrameId(2)));
        assert!(layer.get_tile((-16, -16)).is_none());
    }

    #[test]
    fn test_replace_slot_returns_previous() {
        let mut layer = TileLayer::new("ground", 8);
        assert_eq!(layer.replace_slot((3, 4), Some(Tile::new(FrameId(0)))), None);
        let old = layer.replace_slot((3, 4), Some(Tile::new(FrameId(5))));
        assert_eq!(old, Some(Tile::new(FrameId(0))));
        assert_eq!(layer.replace_slot((3, 4), None), Some(Tile::new(FrameId(5))));
        assert_eq!(layer.tile_count(), 0);
    }

    #[test]
    fn test_erasing_missing_chunk_does_not_create_it() {
        let mut layer = TileLayer::new("ground", 8);
        assert_eq!(layer.replace_slot((100, 100), None), None);
        assert_eq!(layer.chunk_count(), 0);
    }

    #[test]
    fn test_compact_drops_only_empty_chunks() {
        let mut layer = TileLayer::new("ground", 8);
        layer.replace_slot((0, 0), Some(Tile::new(FrameId(0))));
        layer.replace_slot((40, 0), Some(Tile::new(FrameId(0))));
        layer.replace_slot((40, 0), None);
        assert_eq!(layer.chunk_count(), 2);
        assert_eq!(layer.compact(), 1);
        assert_eq!(layer.chunk_coords().collect::<Vec<_>>(), vec![ChunkCoord::new(0, 0)]);
        assert!(layer.get_tile((0, 0)).is_some());
    }

    #[test]
    fn test_tiles_iteration_reports_world_tile_coords() {
        let mut layer = TileLayer::new("ground", 8);
        layer.replace_slot((-5, 20), Some(Tile::new(FrameId(7))));
        let tiles: Vec<_> = layer.tiles().map(|(c, t)| (c, t.frame)).collect();
        assert_eq!(tiles, vec![((-5, 20), FrameId(7))]);
    }

    #[test]
    fn test_world_to_tile() {
        let layer = TileLayer::new("ground", 16);
        assert_eq!(layer.world_to_tile((17, 3)), ((1, 0), (1, 3)));
        assert_eq!(layer.world_to_tile((-1, -16)), ((-1, -1), (15, 0)));
        let rect = layer.tile_bounds_for_world_rect((-1, 0), (32, 15));
        assert_eq!(rect.min(), (-1, 0));
        assert_eq!(rect.max(), (2, 0));
    }

    #[test]
    fn test_chunk_rejects_wrong_slot_count() {
        assert!(Chunk::try_from(vec![None; 3]).is_err());
        assert!(Chunk::try_from(vec![None; CHUNK_SIZE * CHUNK_SIZE]).is_ok());
    }

    #[test]
    fn test_chunks_in_rect() {
        let mut layer = TileLayer::new("ground", 8);
        layer.replace_slot((0, 0), Some(Tile::new(FrameId(0))));
        layer.replace_slot((64, 64), Some(Tile::new(FrameId(0))));
        let visible: Vec<_> = layer
            .chunks_in(TileRect::new((-4, -4), (20, 20)))
            .map(|(c, _)| c)
            .collect();
        assert_eq!(visible, vec![ChunkCoord::new(0, 0)]);
    }
}
