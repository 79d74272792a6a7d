use std::collections::VecDeque;

use log::debug;

use super::error::{EditorError, Result};
use super::graph::GraphSnapshot;

pub const DEFAULT_HISTORY_DEPTH: usize = 50;
/// Ceiling for a user-configured depth.
pub const MAX_HISTORY_DEPTH: usize = 1000;

/// Bounded undo/redo over whole-graph snapshots.
///
/// Entries are owned clones, so nothing done to the live graph afterwards
/// can reach a stored state.
#[derive(Clone, Debug)]
pub struct HistoryManager {
    past: VecDeque<GraphSnapshot>,
    future: Vec<GraphSnapshot>,
    capacity: usize,
}

impl Default for HistoryManager {
    fn default() -> Self { Self::with_capacity(DEFAULT_HISTORY_DEPTH) }
}

impl HistoryManager {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        HistoryManager { past: VecDeque::new(), future: Vec::new(), capacity }
    }

    /// Record the pre-mutation graph. Starting a new branch drops the redo side.
    pub fn snapshot(&mut self, current: &GraphSnapshot) {
        self.push_past(current.clone());
        self.future.clear();
    }

    fn push_past(&mut self, entry: GraphSnapshot) {
        self.past.push_back(entry);
        while self.past.len() > self.capacity {
            self.past.pop_front();
            debug!("history full, evicted oldest entry");
        }
    }

    pub fn undo(&mut self, current: &GraphSnapshot) -> Result<GraphSnapshot> {
        let prev = self.past.pop_back().ok_or(EditorError::NoOpUndo)?;
        self.future.push(current.clone());
        Ok(prev)
    }

    pub fn redo(&mut self, current: &GraphSnapshot) -> Result<GraphSnapshot> {
        let next = self.future.pop().ok_or(EditorError::NoOpRedo)?;
        self.push_past(current.clone());
        Ok(next)
    }

    pub fn can_undo(&self) -> bool { !self.past.is_empty() }
    pub fn can_redo(&self) -> bool { !self.future.is_empty() }
    pub fn past_len(&self) -> usize { self.past.len() }
    pub fn future_len(&self) -> usize { self.future.len() }
    pub fn capacity(&self) -> usize { self.capacity }

    /// Oldest retained entry, if any.
    pub fn oldest(&self) -> Option<&GraphSnapshot> { self.past.front() }

    pub fn reset(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}
