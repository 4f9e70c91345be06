//! Board Store: the fixed occupancy and direction grids.

use rand::seq::SliceRandom;
use rand::Rng;
use route_protocol::{cell_index, Direction, Occupancy, BOARD_CELLS};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("cell ({x}, {y}) would hold {occupancy:?} with direction {direction}")]
    InvalidState {
        x: i32,
        y: i32,
        occupancy: Occupancy,
        direction: Direction,
    },
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: i32, y: i32 },
    #[error("cannot place {requested} pieces, only {available} empty cells")]
    NotEnoughEmptyCells { requested: usize, available: usize },
    #[error("piece count must be at least 1")]
    InvalidPieceCount,
}

/// Occupancy and direction bytes, row-major, `index = y * W + x`.
///
/// Every mutation keeps `direction == None` exactly on empty cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Board {
    occupancy: [u8; BOARD_CELLS],
    directions: [u8; BOARD_CELLS],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub const fn new() -> Self {
        Self {
            occupancy: [0; BOARD_CELLS],
            directions: [0; BOARD_CELLS],
        }
    }

    pub fn occupancy_bytes(&self) -> &[u8; BOARD_CELLS] {
        &self.occupancy
    }

    pub fn direction_bytes(&self) -> &[u8; BOARD_CELLS] {
        &self.directions
    }

    pub fn get(&self, x: i32, y: i32) -> Result<(Occupancy, Direction), BoardError> {
        let idx = cell_index(x, y).ok_or(BoardError::OutOfBounds { x, y })?;
        Ok((self.occupancy_at(idx), self.direction_at(idx)))
    }

    pub fn set(
        &mut self,
        x: i32,
        y: i32,
        occupancy: Occupancy,
        direction: Direction,
    ) -> Result<(), BoardError> {
        let idx = cell_index(x, y).ok_or(BoardError::OutOfBounds { x, y })?;
        if !occupancy.is_piece() && direction.is_moving() {
            return Err(BoardError::InvalidState {
                x,
                y,
                occupancy,
                direction,
            });
        }
        self.write(idx, occupancy, direction);
        Ok(())
    }

    #[inline]
    pub fn occupancy_at(&self, idx: usize) -> Occupancy {
        Occupancy::from_u8(self.occupancy[idx]).unwrap_or_default()
    }

    #[inline]
    pub fn direction_at(&self, idx: usize) -> Direction {
        Direction::from_u8(self.directions[idx]).unwrap_or_default()
    }

    #[inline]
    pub fn is_piece_at(&self, idx: usize) -> bool {
        self.occupancy[idx] != 0
    }

    /// Raw write used by the stepper and the edit helpers, which uphold the
    /// invariant themselves.
    #[inline]
    pub(crate) fn write(&mut self, idx: usize, occupancy: Occupancy, direction: Direction) {
        self.occupancy[idx] = occupancy.as_u8();
        self.directions[idx] = if occupancy.is_piece() {
            direction.as_u8()
        } else {
            Direction::None.as_u8()
        };
    }

    /// Flip a cell between empty and an unrouted piece.
    pub fn toggle_piece(&mut self, x: i32, y: i32) -> Result<Occupancy, BoardError> {
        let idx = cell_index(x, y).ok_or(BoardError::OutOfBounds { x, y })?;
        let next = if self.is_piece_at(idx) {
            Occupancy::Empty
        } else {
            Occupancy::Piece
        };
        self.write(idx, next, Direction::None);
        Ok(next)
    }

    /// Replace the direction of the piece at `(x, y)`. Returns `Ok(None)`
    /// when the cell is empty and nothing changed.
    pub fn set_direction(
        &mut self,
        x: i32,
        y: i32,
        direction: Direction,
    ) -> Result<Option<Direction>, BoardError> {
        let idx = cell_index(x, y).ok_or(BoardError::OutOfBounds { x, y })?;
        if !self.is_piece_at(idx) {
            return Ok(None);
        }
        self.write(idx, Occupancy::Piece, direction);
        Ok(Some(direction))
    }

    pub fn clear_pieces(&mut self) {
        self.occupancy = [0; BOARD_CELLS];
        self.directions = [0; BOARD_CELLS];
    }

    pub fn clear_routes(&mut self) {
        self.directions = [0; BOARD_CELLS];
    }

    /// Place `count` unrouted pieces on distinct, uniformly chosen empty cells.
    pub fn random_pieces<R: Rng>(
        &mut self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, BoardError> {
        if count == 0 {
            return Err(BoardError::InvalidPieceCount);
        }
        let mut empty: Vec<usize> = (0..BOARD_CELLS)
            .filter(|&idx| !self.is_piece_at(idx))
            .collect();
        if count > empty.len() {
            return Err(BoardError::NotEnoughEmptyCells {
                requested: count,
                available: empty.len(),
            });
        }
        let (chosen, _) = empty.partial_shuffle(rng, count);
        let mut placed = chosen.to_vec();
        placed.sort_unstable();
        for &idx in &placed {
            self.write(idx, Occupancy::Piece, Direction::None);
        }
        Ok(placed)
    }

    /// Give every piece a uniformly random travel direction.
    pub fn random_routes<R: Rng>(&mut self, rng: &mut R) {
        for idx in 0..BOARD_CELLS {
            if self.is_piece_at(idx) {
                let dir = Direction::MOVING[rng.gen_range(0..Direction::MOVING.len())];
                self.write(idx, Occupancy::Piece, dir);
            }
        }
    }

    /// Overwrite directions of occupied cells; entries for empty cells are
    /// ignored. Returns how many cells changed.
    pub fn apply_directions(&mut self, directions: &[Direction; BOARD_CELLS]) -> usize {
        let mut changed = 0;
        for (idx, &dir) in directions.iter().enumerate() {
            if self.is_piece_at(idx) && self.direction_at(idx) != dir {
                self.write(idx, Occupancy::Piece, dir);
                changed += 1;
            }
        }
        changed
    }

    pub fn piece_count(&self) -> usize {
        self.occupancy.iter().filter(|&&cell| cell != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy.iter().all(|&cell| cell == 0)
    }

    /// Indices of occupied cells in row-major order.
    pub fn pieces(&self) -> impl Iterator<Item = usize> + '_ {
        (0..BOARD_CELLS).filter(move |&idx| self.is_piece_at(idx))
    }

    /// First cell breaking the direction/occupancy invariant, if any.
    pub fn invariant_violation(&self) -> Option<usize> {
        (0..BOARD_CELLS).find(|&idx| {
            let valid_occ = Occupancy::from_u8(self.occupancy[idx]).is_some();
            let valid_dir = Direction::from_u8(self.directions[idx]).is_some();
            let empty = self.occupancy[idx] == 0;
            !valid_occ || !valid_dir || (empty && self.directions[idx] != 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn new_board_is_empty() {
        let board = Board::new();
        assert!(board.is_empty());
        assert_eq!(board.piece_count(), 0);
        assert_eq!(board.invariant_violation(), None);
    }

    #[test]
    fn set_rejects_direction_on_empty_cell() {
        let mut board = Board::new();
        let err = board
            .set(2, 3, Occupancy::Empty, Direction::Up)
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidState { x: 2, y: 3, .. }));
        assert_eq!(board, Board::new());
    }

    #[test]
    fn set_accepts_piece_with_or_without_direction() {
        let mut board = Board::new();
        board.set(0, 0, Occupancy::Piece, Direction::None).unwrap();
        board.set(1, 0, Occupancy::Piece, Direction::Left).unwrap();
        assert_eq!(board.get(0, 0).unwrap(), (Occupancy::Piece, Direction::None));
        assert_eq!(board.get(1, 0).unwrap(), (Occupancy::Piece, Direction::Left));
        board.set(1, 0, Occupancy::Empty, Direction::None).unwrap();
        assert_eq!(board.get(1, 0).unwrap(), (Occupancy::Empty, Direction::None));
    }

    #[test]
    fn out_of_bounds_access_is_reported() {
        let mut board = Board::new();
        assert_eq!(
            board.get(10, 0),
            Err(BoardError::OutOfBounds { x: 10, y: 0 })
        );
        assert!(board.toggle_piece(-1, 4).is_err());
    }

    #[test]
    fn clear_routes_keeps_pieces() {
        let mut board = Board::new();
        board.set(4, 4, Occupancy::Piece, Direction::Down).unwrap();
        board.clear_routes();
        assert_eq!(board.get(4, 4).unwrap(), (Occupancy::Piece, Direction::None));
        assert_eq!(board.piece_count(), 1);
    }

    #[test]
    fn clear_pieces_is_idempotent() {
        let mut board = Board::new();
        board.set(4, 4, Occupancy::Piece, Direction::Down).unwrap();
        board.clear_pieces();
        let once = board;
        board.clear_pieces();
        assert_eq!(board, once);
        assert_eq!(board, Board::new());
    }

    #[test]
    fn random_pieces_fill_only_empty_cells() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut board = Board::new();
        board.set(0, 0, Occupancy::Piece, Direction::Right).unwrap();

        let placed = board.random_pieces(99, &mut rng).unwrap();
        assert_eq!(placed.len(), 99);
        assert!(!placed.contains(&0));
        assert_eq!(board.piece_count(), 100);
        assert_eq!(board.direction_at(0), Direction::Right);
        assert!(placed
            .iter()
            .all(|&idx| board.direction_at(idx) == Direction::None));

        assert_eq!(
            board.random_pieces(1, &mut rng),
            Err(BoardError::NotEnoughEmptyCells {
                requested: 1,
                available: 0
            })
        );
        assert_eq!(
            board.random_pieces(0, &mut rng),
            Err(BoardError::InvalidPieceCount)
        );
    }

    #[test]
    fn random_routes_only_touch_pieces() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut board = Board::new();
        board.random_pieces(20, &mut rng).unwrap();
        board.random_routes(&mut rng);
        for idx in 0..BOARD_CELLS {
            if board.is_piece_at(idx) {
                assert!(board.direction_at(idx).is_moving());
            } else {
                assert_eq!(board.direction_at(idx), Direction::None);
            }
        }
    }

    #[test]
    fn apply_directions_skips_empty_cells() {
        let mut board = Board::new();
        board.set(0, 0, Occupancy::Piece, Direction::None).unwrap();
        let changed = board.apply_directions(&[Direction::Down; BOARD_CELLS]);
        assert_eq!(changed, 1);
        assert_eq!(board.direction_at(0), Direction::Down);
        assert_eq!(board.piece_count(), 1);
        assert_eq!(board.invariant_violation(), None);
    }
}
