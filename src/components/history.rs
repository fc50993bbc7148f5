use std::collections::VecDeque;

use crate::canvas::Color;
use crate::settings::EditorSettings;
use crate::tilemap::{Tile, TileCoord};

// ============================================================================
// EDIT TARGET - anything a recorded edit can be replayed against
// ============================================================================

/// Receiver of replayed edits during undo/redo.
///
/// Implementations write the value directly; they must not record into a
/// chain while replaying.
pub trait EditTarget {
    fn apply_pixel(&mut self, x: u32, y: u32, color: Color);
    fn apply_tile(&mut self, layer: usize, coord: TileCoord, tile: Option<&Tile>);
}

// ============================================================================
// EDIT - one reversible single-cell change
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    /// A pixel in sheet (or standalone canvas) coordinates
    Pixel {
        x: u32,
        y: u32,
        before: Color,
        after: Color,
    },
    /// A tile slot in one layer
    Tile {
        layer: usize,
        coord: TileCoord,
        before: Option<Tile>,
        after: Option<Tile>,
    },
}

impl Edit {
    fn revert<T: EditTarget + ?Sized>(&self, target: &mut T) {
        match self {
            Edit::Pixel { x, y, before, .. } => target.apply_pixel(*x, *y, *before),
            Edit::Tile {
                layer,
                coord,
                before,
                ..
            } => target.apply_tile(*layer, *coord, before.as_ref()),
        }
    }

    fn reapply<T: EditTarget + ?Sized>(&self, target: &mut T) {
        match self {
            Edit::Pixel { x, y, after, .. } => target.apply_pixel(*x, *y, *after),
            Edit::Tile {
                layer,
                coord,
                after,
                ..
            } => target.apply_tile(*layer, *coord, after.as_ref()),
        }
    }

    fn memory_size(&self) -> usize {
        let collision = |t: &Option<Tile>| {
            t.as_ref()
                .and_then(|t| t.collision.as_ref())
                .map_or(0, |c| c.points.len() * std::mem::size_of::<(f32, f32)>())
        };
        std::mem::size_of::<Edit>()
            + match self {
                Edit::Pixel { .. } => 0,
                Edit::Tile { before, after, .. } => collision(before) + collision(after),
            }
    }
}

// ============================================================================
// COMMAND CHAIN - the edits of one user gesture
// ============================================================================

/// Ordered edits produced by one gesture (stroke, fill, paste).
///
/// Obtained from [`HistoryManager::begin_chain`] and handed back with
/// [`HistoryManager::push`] or [`HistoryManager::discard`]; both consume it,
/// so a closed chain can never be appended to.
#[derive(Debug)]
pub struct CommandChain {
    id: u64,
    description: String,
    edits: Vec<Edit>,
}

impl CommandChain {
    /// A chain not tracked by any history, for scratch recording.
    pub fn detached(description: &str) -> Self {
        Self {
            id: 0,
            description: description.to_string(),
            edits: Vec::new(),
        }
    }

    pub fn record(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    /// Write every `before` value back, last edit first.
    pub fn revert<T: EditTarget + ?Sized>(&self, target: &mut T) {
        for edit in self.edits.iter().rev() {
            edit.revert(target);
        }
    }

    /// Write every `after` value again, in recording order.
    pub fn reapply<T: EditTarget + ?Sized>(&self, target: &mut T) {
        for edit in &self.edits {
            edit.reapply(target);
        }
    }

    pub fn memory_size(&self) -> usize {
        self.description.len() + self.edits.iter().map(Edit::memory_size).sum::<usize>()
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Undo/redo history manager with memory limits.
pub struct HistoryManager {
    undo_stack: VecDeque<CommandChain>,
    redo_stack: VecDeque<CommandChain>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    /// Id of the chain currently recording, if any.
    open_chain: Option<u64>,
    next_chain_id: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
            open_chain: None,
            next_chain_id: 1,
        }
    }

    pub fn from_settings(settings: &EditorSettings) -> Self {
        let mut history = Self::new(settings.max_undo_steps);
        history.max_memory_bytes = settings.history_memory_bytes();
        history
    }

    pub fn set_memory_limit(&mut self, max_bytes: Option<usize>) {
        self.max_memory_bytes = max_bytes;
        self.prune();
    }

    /// Start recording a gesture.
    ///
    /// # Panics
    /// If another chain is still open.
    pub fn begin_chain(&mut self, description: &str) -> CommandChain {
        if let Some(open) = self.open_chain {
            panic!(
                "begin_chain(\"{}\"): chain {} is still open",
                description, open
            );
        }
        let id = self.next_chain_id;
        self.next_chain_id += 1;
        self.open_chain = Some(id);
        CommandChain {
            id,
            description: description.to_string(),
            edits: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.open_chain.is_some()
    }

    fn close(&mut self, chain: &CommandChain, op: &str) {
        match self.open_chain {
            Some(id) if id == chain.id => self.open_chain = None,
            open => panic!(
                "{}: chain {} (\"{}\") is not the open chain ({:?})",
                op, chain.id, chain.description, open
            ),
        }
    }

    /// Close `chain` and store it on the undo stack. Clears the redo stack.
    ///
    /// # Panics
    /// If `chain` is not the chain returned by the last `begin_chain`.
    pub fn push(&mut self, chain: CommandChain) {
        self.close(&chain, "push");

        // Clear redo stack when a new action is performed
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }

        log::debug!(
            "history: push \"{}\" ({} edits)",
            chain.description,
            chain.len()
        );
        self.total_memory += chain.memory_size();
        self.undo_stack.push_back(chain);

        // Prune old commands if we exceed the limit
        self.prune();
    }

    /// Close `chain` without storing it. The redo stack is left untouched.
    pub fn discard(&mut self, chain: CommandChain) {
        self.close(&chain, "discard");
        if !chain.is_empty() {
            log::warn!(
                "history: discarded \"{}\" with {} recorded edits",
                chain.description,
                chain.len()
            );
        }
    }

    pub fn undo<T: EditTarget + ?Sized>(&mut self, target: &mut T) -> Option<String> {
        if self.refuse_while_recording("undo") {
            return None;
        }
        let chain = self.undo_stack.pop_back()?;
        let description = chain.description.clone();
        chain.revert(target);
        self.redo_stack.push_back(chain);
        Some(description)
    }

    pub fn redo<T: EditTarget + ?Sized>(&mut self, target: &mut T) -> Option<String> {
        if self.refuse_while_recording("redo") {
            return None;
        }
        let chain = self.redo_stack.pop_back()?;
        let description = chain.description.clone();
        chain.reapply(target);
        self.undo_stack.push_back(chain);
        Some(description)
    }

    fn refuse_while_recording(&self, op: &str) -> bool {
        if let Some(open) = self.open_chain {
            log::warn!("history: {} ignored while chain {} is open", op, open);
            true
        } else {
            false
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description.clone())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description.clone())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|c| c.description.clone())
            .collect()
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Prune old chains to stay within limits
    fn prune(&mut self) {
        // Prune by count
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        // Prune by memory if limit is set
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    /// Drop both stacks. Used when a new document is loaded.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo to position `index` in undo_history() (0 = most recent).
    pub fn undo_to<T: EditTarget + ?Sized>(&mut self, index: usize, target: &mut T) {
        for _ in 0..index {
            if self.undo(target).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use image::Rgba;

    const WHITE: Color = Rgba([255, 255, 255, 255]);
    const BLUE: Color = Rgba([0, 0, 255, 255]);

    fn paint(history: &mut HistoryManager, canvas: &mut Canvas, desc: &str, cells: &[(u32, u32)]) {
        let mut chain = history.begin_chain(desc);
        for &(x, y) in cells {
            canvas.set(x, y, BLUE, Some(&mut chain)).unwrap();
        }
        history.push(chain);
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut canvas = Canvas::new_filled(3, 3, WHITE);
        let original = canvas.clone();
        let mut history = HistoryManager::new(10);

        paint(&mut history, &mut canvas, "Pencil", &[(0, 0), (1, 1), (2, 2)]);
        let painted = canvas.clone();

        assert_eq!(history.undo(&mut canvas).as_deref(), Some("Pencil"));
        assert_eq!(canvas, original);
        assert_eq!(history.redo(&mut canvas).as_deref(), Some("Pencil"));
        assert_eq!(canvas, painted);
    }

    #[test]
    fn test_repeated_cell_in_one_chain_undoes_to_first_value() {
        let mut canvas = Canvas::new_filled(1, 1, WHITE);
        let mut history = HistoryManager::new(10);
        let mut chain = history.begin_chain("Scribble");
        canvas.set(0, 0, BLUE, Some(&mut chain)).unwrap();
        canvas.set(0, 0, Rgba([9, 9, 9, 255]), Some(&mut chain)).unwrap();
        history.push(chain);

        history.undo(&mut canvas);
        assert_eq!(canvas.get(0, 0).unwrap(), WHITE);
        history.redo(&mut canvas);
        assert_eq!(canvas.get(0, 0).unwrap(), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut canvas = Canvas::new(1, 1);
        let mut history = HistoryManager::default();
        assert_eq!(history.undo(&mut canvas), None);
        assert_eq!(history.redo(&mut canvas), None);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_push_clears_redo() {
        let mut canvas = Canvas::new(2, 1);
        let mut history = HistoryManager::new(10);
        paint(&mut history, &mut canvas, "A", &[(0, 0)]);
        history.undo(&mut canvas);
        assert!(history.can_redo());

        paint(&mut history, &mut canvas, "B", &[(1, 0)]);
        assert!(!history.can_redo());
        assert_eq!(history.undo_history(), vec!["B".to_string()]);
    }

    #[test]
    fn test_prune_by_count() {
        let mut canvas = Canvas::new(4, 1);
        let mut history = HistoryManager::new(2);
        for x in 0..4 {
            paint(&mut history, &mut canvas, &format!("Step {}", x), &[(x, 0)]);
        }
        assert_eq!(history.undo_count(), 2);
        assert_eq!(
            history.undo_history(),
            vec!["Step 3".to_string(), "Step 2".to_string()]
        );
    }

    #[test]
    fn test_undo_to_and_clear() {
        let mut canvas = Canvas::new(3, 1);
        let mut history = HistoryManager::new(10);
        for x in 0..3 {
            paint(&mut history, &mut canvas, "Dot", &[(x, 0)]);
        }
        history.undo_to(2, &mut canvas);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.redo_count(), 2);
        assert_eq!(canvas.get(0, 0).unwrap(), BLUE);
        assert_eq!(canvas.get(1, 0).unwrap(), Rgba([0, 0, 0, 0]));

        history.clear();
        assert_eq!(history.undo_count(), 0);
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.memory_usage(), 0);
    }

    #[test]
    fn test_empty_chain_push_is_a_noop_step() {
        let mut canvas = Canvas::new(1, 1);
        let mut history = HistoryManager::new(10);
        let chain = history.begin_chain("Nothing");
        history.push(chain);
        assert!(history.can_undo());
        assert_eq!(history.undo(&mut canvas).as_deref(), Some("Nothing"));
    }

    #[test]
    fn test_discard_closes_chain() {
        let mut history = HistoryManager::new(10);
        let chain = history.begin_chain("Cancelled");
        assert!(history.is_recording());
        history.discard(chain);
        assert!(!history.is_recording());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_undo_refused_while_recording() {
        let mut canvas = Canvas::new(1, 1);
        let mut history = HistoryManager::new(10);
        paint(&mut history, &mut canvas, "Dot", &[(0, 0)]);
        let chain = history.begin_chain("Open");
        assert_eq!(history.undo(&mut canvas), None);
        history.discard(chain);
        assert!(history.undo(&mut canvas).is_some());
    }

    #[test]
    #[should_panic(expected = "still open")]
    fn test_second_open_chain_panics() {
        let mut history = HistoryManager::new(10);
        let _first = history.begin_chain("First");
        let _second = history.begin_chain("Second");
    }

    #[test]
    #[should_panic(expected = "not the open chain")]
    fn test_pushing_foreign_chain_panics() {
        let mut history = HistoryManager::new(10);
        history.push(CommandChain::detached("Stray"));
    }

    #[test]
    fn test_memory_limit_prunes_oldest_but_keeps_one() {
        let mut canvas = Canvas::new_filled(3, 1, WHITE);
        let mut history = HistoryManager::new(10);
        history.set_memory_limit(None);
        paint(&mut history, &mut canvas, "a", &[(0, 0)]);
        paint(&mut history, &mut canvas, "b", &[(1, 0)]);
        paint(&mut history, &mut canvas, "c", &[(2, 0)]);
        assert_eq!(history.undo_count(), 3);

        history.set_memory_limit(Some(1));
        assert_eq!(history.undo_history(), vec!["c".to_string()]);
        assert!(history.memory_usage() > 0);
    }

    #[test]
    fn test_renamed_chain_and_redo_description() {
        let mut canvas = Canvas::new_filled(2, 1, WHITE);
        let mut history = HistoryManager::new(10);
        let mut chain = history.begin_chain("Pencil Stroke");
        canvas.set(1, 0, BLUE, Some(&mut chain)).unwrap();
        chain.set_description("Line Stroke");
        history.push(chain);
        assert_eq!(history.undo_description().as_deref(), Some("Line Stroke"));
        assert_eq!(history.redo_description(), None);

        history.undo(&mut canvas);
        assert_eq!(history.redo_description().as_deref(), Some("Line Stroke"));
        assert_eq!(canvas.get(1, 0).unwrap(), WHITE);
    }
}
