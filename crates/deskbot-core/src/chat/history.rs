//! Rolling conversation window

use crate::ai::Turn;

/// Ordered turns, trimmed from the front in user/model pairs
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    cap: usize,
}

impl ConversationHistory {
    /// `cap` is in turns and is rounded down to whole pairs (minimum one pair)
    pub fn new(cap: usize) -> Self {
        Self {
            turns: Vec::new(),
            cap: (cap - cap % 2).max(2),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remove the last turn if it is exactly `turn`
    ///
    /// Used to undo a turn appended for an exchange that then failed.
    pub fn retract(&mut self, turn: &Turn) -> bool {
        if self.turns.last() == Some(turn) {
            self.turns.pop();
            true
        } else {
            false
        }
    }

    /// Drop the oldest pairs until the window fits
    pub fn trim(&mut self) {
        while self.turns.len() > self.cap {
            let drop = 2.min(self.turns.len());
            self.turns.drain(..drop);
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
