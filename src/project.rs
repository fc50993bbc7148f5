use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::components::history::{CommandChain, HistoryManager};
use crate::error::EditResult;
use crate::io::{self, DocumentError, DocumentFile};
use crate::level::LevelState;
use crate::settings::EditorSettings;
use crate::tilemap::TileLayer;

/// Single open document: one level plus its undo history.
pub struct Project {
    pub id: Uuid,
    pub level: LevelState,
    pub history: HistoryManager,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    /// Empty level with one layer, sized from the settings.
    pub fn new_untitled(
        untitled_counter: usize,
        tile_size: u32,
        settings: &EditorSettings,
    ) -> EditResult<Self> {
        let mut level = LevelState::new(tile_size, settings.sheet_columns)?;
        level.add_layer(TileLayer::new("Layer 1", tile_size))?;
        Ok(Self {
            id: Uuid::new_v4(),
            level,
            history: HistoryManager::from_settings(settings),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        })
    }

    pub fn open(path: &Path, settings: &EditorSettings) -> Result<Self, DocumentError> {
        let doc = io::read_document(path)?;
        let id = doc.id;
        let name = doc.name.clone();
        let level = doc.into_level()?;
        log::info!(
            "Opened '{}' ({} layers, {} frames) from {}",
            name,
            level.layers().len(),
            level.sheet().frame_count(),
            path.display()
        );
        Ok(Self {
            id,
            level,
            history: HistoryManager::from_settings(settings),
            path: Some(path.to_path_buf()),
            is_dirty: false,
            name,
        })
    }

    /// Write to the current path.
    pub fn save(&mut self, compact: bool) -> Result<(), DocumentError> {
        let path = self.path.clone().ok_or_else(|| {
            DocumentError::InvalidFormat(format!("'{}' has no file path yet", self.name))
        })?;
        self.save_as(&path, compact)
    }

    /// Write to `path` and adopt it as the document's path.
    pub fn save_as(&mut self, path: &Path, compact: bool) -> Result<(), DocumentError> {
        if compact {
            let removed = self.level.compact();
            log::debug!("'{}': compacted {} chunks before save", self.name, removed);
        }
        let doc = DocumentFile::from_level(self.id, &self.name, &self.level);
        io::write_document(&doc, path)?;
        self.path = Some(path.to_path_buf());
        self.mark_clean();
        Ok(())
    }

    /// Close a gesture: non-empty chains go on the undo stack, empty ones are
    /// discarded.
    pub fn commit(&mut self, chain: CommandChain) {
        if chain.is_empty() {
            self.history.discard(chain);
        } else {
            self.history.push(chain);
            self.mark_dirty();
        }
    }

    pub fn undo(&mut self) -> Option<String> {
        let desc = self.history.undo(&mut self.level)?;
        self.mark_dirty();
        Some(desc)
    }

    pub fn redo(&mut self) -> Option<String> {
        let desc = self.history.redo(&mut self.level)?;
        self.mark_dirty();
        Some(desc)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::PixelBrush;
    use image::Rgba;

    #[test]
    fn test_commit_skips_empty_chains() {
        let mut project = Project::new_untitled(1, 8, &EditorSettings::default()).unwrap();
        let chain = project.history.begin_chain("Nothing");
        project.commit(chain);
        assert!(!project.history.can_undo());
        assert!(!project.is_dirty);
        assert_eq!(project.display_title(), "Untitled-1");
    }

    #[test]
    fn test_undo_redo_through_project() {
        let mut project = Project::new_untitled(2, 8, &EditorSettings::default()).unwrap();
        let tile = project.level.new_tile().unwrap();
        project.level.set_tile(0, (0, 0), Some(tile), None).unwrap();

        let mut chain = project.history.begin_chain("Pencil");
        project
            .level
            .paint_pixel(0, (3, 3), &PixelBrush::solid(Rgba([1, 2, 3, 255])), Some(&mut chain))
            .unwrap();
        project.commit(chain);
        assert_eq!(project.display_title(), "Untitled-2*");

        assert_eq!(project.undo().as_deref(), Some("Pencil"));
        assert_eq!(project.level.get_pixel(0, (3, 3)).unwrap(), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(project.redo().as_deref(), Some("Pencil"));
        assert_eq!(project.level.get_pixel(0, (3, 3)).unwrap(), Some(Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn test_save_without_path_fails() {
        let mut project = Project::new_untitled(3, 8, &EditorSettings::default()).unwrap();
        assert!(matches!(project.save(false), Err(DocumentError::InvalidFormat(_))));
    }
}
