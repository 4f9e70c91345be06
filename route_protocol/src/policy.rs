use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Direction, BOARD_CELLS};

/// Payload posted to the routing policy service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub board: Vec<u8>,
    pub directions: Vec<u8>,
}

impl PolicyRequest {
    pub fn from_buffers(occupancy: &[u8; BOARD_CELLS], directions: &[u8; BOARD_CELLS]) -> Self {
        Self {
            board: occupancy.to_vec(),
            directions: directions.to_vec(),
        }
    }
}

/// Reply from the routing policy service. Actions are `0..=3` per cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub new_directions: Vec<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyDecodeError {
    #[error("policy returned {actual} directions, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("policy action {value} at cell {index} is outside 0..=3")]
    OutOfRange { index: usize, value: i64 },
}

/// Map the service's `0..=3` actions onto engine directions (`Up..=Left`).
///
/// The whole reply is rejected if any entry is out of range so a malformed
/// answer never partially overwrites the board.
pub fn decode_policy_directions(
    response: &PolicyResponse,
) -> Result<[Direction; BOARD_CELLS], PolicyDecodeError> {
    if response.new_directions.len() != BOARD_CELLS {
        return Err(PolicyDecodeError::WrongLength {
            expected: BOARD_CELLS,
            actual: response.new_directions.len(),
        });
    }

    let mut out = [Direction::None; BOARD_CELLS];
    for (index, (&value, slot)) in response
        .new_directions
        .iter()
        .zip(out.iter_mut())
        .enumerate()
    {
        *slot = Direction::from_policy_action(value)
            .ok_or(PolicyDecodeError::OutOfRange { index, value })?;
    }
    Ok(out)
}
