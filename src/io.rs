use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::canvas::{Canvas, MAX_CANVAS_DIM};
use crate::error::EditError;
use crate::level::{LevelState, TileSheet};
use crate::tilemap::TileLayer;

// ============================================================================
// CANVAS PAYLOAD – { width, height, png } as carried by any serde format
// ============================================================================

/// Serialized form of a [`Canvas`]: dimensions plus an 8-bit RGBA PNG.
/// Zero-area canvases carry an empty payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanvasData {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl TryFrom<&Canvas> for CanvasData {
    type Error = String;

    fn try_from(canvas: &Canvas) -> Result<Self, Self::Error> {
        let (width, height) = (canvas.width(), canvas.height());
        if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
            return Err(format!(
                "Canvas size {}x{} exceeds maximum allowed {}x{}",
                width, height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
            ));
        }
        let png = if width == 0 || height == 0 {
            Vec::new()
        } else {
            encode_png(canvas.as_rgba_image())?
        };
        Ok(CanvasData { width, height, png })
    }
}

impl Serialize for Canvas {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CanvasData::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl TryFrom<CanvasData> for Canvas {
    type Error = String;

    fn try_from(data: CanvasData) -> Result<Self, Self::Error> {
        if data.width == 0 || data.height == 0 {
            if !data.png.is_empty() {
                return Err("zero-area canvas with pixel payload".to_string());
            }
            return Ok(Canvas::new(data.width, data.height));
        }
        if data.width > MAX_CANVAS_DIM || data.height > MAX_CANVAS_DIM {
            return Err(format!(
                "Canvas size {}x{} exceeds maximum allowed {}x{}",
                data.width, data.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
            ));
        }
        let pixels = decode_png(&data.png)?;
        if pixels.dimensions() != (data.width, data.height) {
            return Err(format!(
                "PNG is {}x{}, header says {}x{}",
                pixels.width(),
                pixels.height(),
                data.width,
                data.height
            ));
        }
        Ok(Canvas::from_rgba_image(pixels))
    }
}

/// Encode as an 8-bit RGBA PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| format!("PNG header write error: {}", e))?;
        writer
            .write_image_data(image.as_raw())
            .map_err(|e| format!("PNG write error: {}", e))?;
        writer
            .finish()
            .map_err(|e| format!("PNG finish error: {}", e))?;
    }
    Ok(out)
}

/// Decode a PNG that must already be 8-bit RGBA; anything else is rejected
/// rather than converted, so a round trip stays exact.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, String> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder
        .read_info()
        .map_err(|e| format!("Failed to read PNG info: {}", e))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| format!("PNG decode error: {}", e))?;
    if info.color_type != png::ColorType::Rgba || info.bit_depth != png::BitDepth::Eight {
        return Err(format!(
            "PNG is {:?}/{:?}, expected 8-bit RGBA",
            info.color_type, info.bit_depth
        ));
    }
    buf.truncate(info.buffer_size());
    RgbaImage::from_raw(info.width, info.height, buf)
        .ok_or_else(|| "PNG buffer does not match its dimensions".to_string())
}

// ============================================================================
// DOCUMENT CONTAINER – .tcv (bincode) and .json (serde_json)
// ============================================================================

/// Magic tag; for bincode it sits at bytes 8..12 behind the string length.
const TCV_MAGIC: &str = "TCV1";

/// Maximum number of layers in a document.
const MAX_LAYERS: usize = 256;

#[derive(Debug)]
pub enum DocumentError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Io(e) => write!(f, "I/O error: {}", e),
            DocumentError::Serialize(e) => write!(f, "Serialization error: {}", e),
            DocumentError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocumentError {
    fn from(e: std::io::Error) -> Self {
        DocumentError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for DocumentError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DocumentError::Serialize(e.to_string())
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Serialize(e.to_string())
    }
}

impl From<EditError> for DocumentError {
    fn from(e: EditError) -> Self {
        DocumentError::InvalidFormat(e.to_string())
    }
}

/// On-disk encoding, picked from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Binary,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tcv" => Some(DocumentFormat::Binary),
            "json" => Some(DocumentFormat::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SheetData {
    pub tile_size: u32,
    pub columns: u32,
    pub frame_count: u32,
    pub canvas: Canvas,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentFile {
    pub magic: String,
    pub id: Uuid,
    pub name: String,
    pub sheet: SheetData,
    pub layers: Vec<TileLayer>,
}

impl DocumentFile {
    /// Snapshot a level for writing. Copies the sheet and layers.
    pub fn from_level(id: Uuid, name: &str, level: &LevelState) -> Self {
        let sheet = level.sheet();
        DocumentFile {
            magic: TCV_MAGIC.to_string(),
            id,
            name: name.to_string(),
            sheet: SheetData {
                tile_size: sheet.tile_size(),
                columns: sheet.columns(),
                frame_count: sheet.frame_count(),
                canvas: sheet.canvas().clone(),
            },
            layers: level.layers().to_vec(),
        }
    }

    /// Validate and rebuild the level.
    pub fn into_level(self) -> Result<LevelState, DocumentError> {
        if self.magic != TCV_MAGIC {
            return Err(DocumentError::InvalidFormat(format!(
                "Unknown magic '{}'",
                self.magic
            )));
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(DocumentError::InvalidFormat(format!(
                "Document contains {} layers, which exceeds the maximum of {}",
                self.layers.len(),
                MAX_LAYERS
            )));
        }
        if let Some(layer) = self.layers.iter().find(|l| l.tile_size() == 0) {
            return Err(DocumentError::InvalidFormat(format!(
                "Layer '{}' has zero tile size",
                layer.name
            )));
        }
        let sheet = TileSheet::from_parts(
            self.sheet.canvas,
            self.sheet.tile_size,
            self.sheet.columns,
            self.sheet.frame_count,
        )?;
        Ok(LevelState::from_parts(sheet, self.layers)?)
    }
}

pub fn write_document(doc: &DocumentFile, path: &Path) -> Result<(), DocumentError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        DocumentError::InvalidFormat(format!("Unsupported extension: {}", path.display()))
    })?;
    // Encode fully before touching the file so a failed save leaves it intact
    let bytes = match format {
        DocumentFormat::Binary => bincode::serialize(doc)?,
        DocumentFormat::Json => serde_json::to_vec_pretty(doc)?,
    };
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    log::info!("Saved '{}' to {}", doc.name, path.display());
    Ok(())
}

pub fn read_document(path: &Path) -> Result<DocumentFile, DocumentError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        DocumentError::InvalidFormat(format!("Unsupported extension: {}", path.display()))
    })?;
    match format {
        DocumentFormat::Binary => {
            let raw = std::fs::read(path)?;
            decode_binary(&raw)
        }
        DocumentFormat::Json => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
    }
}

/// Check the magic before handing the bytes to bincode.
pub fn decode_binary(raw: &[u8]) -> Result<DocumentFile, DocumentError> {
    if raw.len() < 12 {
        return Err(DocumentError::InvalidFormat("File too small".into()));
    }
    // bincode encodes a String as: 8-byte length prefix + UTF-8 data.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != TCV_MAGIC {
        return Err(DocumentError::InvalidFormat(format!(
            "Unknown magic '{}'",
            magic
        )));
    }
    Ok(bincode::deserialize(raw)?)
}

/// Write the sheet canvas as a standalone PNG.
pub fn export_sheet_png(level: &LevelState, path: &Path) -> Result<(), DocumentError> {
    let canvas = level.sheet().canvas();
    if canvas.width() == 0 || canvas.height() == 0 {
        return Err(DocumentError::InvalidFormat(
            "Sheet has no frames to export".into(),
        ));
    }
    let bytes = encode_png(canvas.as_rgba_image()).map_err(DocumentError::Serialize)?;
    std::fs::write(path, bytes)?;
    log::info!("Exported sheet to {}", path.display());
    Ok(())
}
