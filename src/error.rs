//! Error type shared by the canvas, tile grid and level editing operations.

use crate::tilemap::FrameId;

/// Error type for pixel and tile edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// Pixel access outside `[0, width) × [0, height)`
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
    /// Layer index does not exist in the level
    NoSuchLayer(usize),
    /// Frame id was never allocated by the tile sheet
    NoSuchFrame(FrameId),
    /// A layer's tile side length disagrees with the tile sheet
    TileSizeMismatch { layer: u32, sheet: u32 },
    /// Dimensions that cannot describe a canvas or tile sheet
    InvalidGeometry(String),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::OutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(f, "({}, {}) is outside the {}x{} canvas", x, y, width, height),
            EditError::NoSuchLayer(idx) => write!(f, "No layer at index {}", idx),
            EditError::NoSuchFrame(frame) => write!(f, "Frame {} is not allocated", frame.0),
            EditError::TileSizeMismatch { layer, sheet } => write!(
                f,
                "Layer tile size {} does not match sheet tile size {}",
                layer, sheet
            ),
            EditError::InvalidGeometry(msg) => write!(f, "Invalid geometry: {}", msg),
        }
    }
}

impl std::error::Error for EditError {}

pub type EditResult<T> = Result<T, EditError>;
