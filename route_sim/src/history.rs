//! History Stack: bounded undo history of whole-board snapshots.

use std::collections::VecDeque;

use thiserror::Error;

use crate::board::Board;

/// Board state recorded immediately before a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub board: Board,
    pub turn: u64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("nothing to undo")]
pub struct EmptyHistory;

/// Stack of snapshots capped at `limit`; the oldest entry is discarded when a
/// push would exceed it.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<StoredSnapshot>,
    limit: usize,
    discarded: u64,
}

impl SnapshotHistory {
    pub fn with_capacity(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit.min(256)),
            limit,
            discarded: 0,
        }
    }

    /// Push a copy of `board` as it is now.
    pub fn capture(&mut self, board: &Board, turn: u64) {
        self.push(StoredSnapshot {
            board: *board,
            turn,
        });
    }

    pub fn push(&mut self, snapshot: StoredSnapshot) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
            self.discarded += 1;
        }
        self.entries.push_back(snapshot);
    }

    /// Pop the latest snapshot and write it back into `board`.
    pub fn restore(&mut self, board: &mut Board) -> Result<StoredSnapshot, EmptyHistory> {
        let entry = self.pop()?;
        *board = entry.board;
        Ok(entry)
    }

    pub fn pop(&mut self) -> Result<StoredSnapshot, EmptyHistory> {
        self.entries.pop_back().ok_or(EmptyHistory)
    }

    pub fn latest(&self) -> Option<&StoredSnapshot> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Entries dropped from the bottom of the stack since creation.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use route_protocol::{Direction, Occupancy};

    use super::*;

    fn board_with_piece(x: i32, y: i32) -> Board {
        let mut board = Board::new();
        board.set(x, y, Occupancy::Piece, Direction::Up).unwrap();
        board
    }

    #[test]
    fn capture_then_restore_is_exact() {
        let mut history = SnapshotHistory::with_capacity(8);
        let mut board = board_with_piece(3, 3);
        let before = board;

        history.capture(&board, 5);
        board.clear_pieces();

        let entry = history.restore(&mut board).unwrap();
        assert_eq!(board, before);
        assert_eq!(entry.turn, 5);
        assert!(history.is_empty());
    }

    #[test]
    fn restore_on_empty_history_leaves_board_alone() {
        let mut history = SnapshotHistory::with_capacity(8);
        let mut board = board_with_piece(1, 1);
        let before = board;
        assert_eq!(history.restore(&mut board), Err(EmptyHistory));
        assert_eq!(history.restore(&mut board), Err(EmptyHistory));
        assert_eq!(board, before);
    }

    #[test]
    fn restores_in_reverse_order() {
        let mut history = SnapshotHistory::with_capacity(8);
        let mut board = Board::new();
        for x in 0..3 {
            history.capture(&board, x as u64);
            board.toggle_piece(x, 0).unwrap();
        }
        assert_eq!(board.piece_count(), 3);

        history.restore(&mut board).unwrap();
        assert_eq!(board.piece_count(), 2);
        history.restore(&mut board).unwrap();
        assert_eq!(board, board_with_none_but(0));
        history.restore(&mut board).unwrap();
        assert!(board.is_empty());
    }

    fn board_with_none_but(idx: usize) -> Board {
        let mut board = Board::new();
        board.toggle_piece(idx as i32, 0).unwrap();
        board
    }

    #[test]
    fn limit_discards_oldest_entries() {
        let mut history = SnapshotHistory::with_capacity(2);
        let board = Board::new();
        history.capture(&board, 1);
        history.capture(&board, 2);
        history.capture(&board, 3);
        assert_eq!(history.len(), 2);
        assert_eq!(history.discarded(), 1);
        assert_eq!(history.pop().unwrap().turn, 3);
        assert_eq!(history.pop().unwrap().turn, 2);
        assert!(history.pop().is_err());
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        let history = SnapshotHistory::with_capacity(0);
        assert_eq!(history.limit(), 1);
    }
}
