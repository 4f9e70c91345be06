use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Direction, Mode, Occupancy, BOARD_CELLS, BOARD_WIDTH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub turn: u64,
    pub mode: Mode,
    pub running: bool,
    pub pieces: u32,
    pub hash: u64,
}

/// Full board state as broadcast to observers after each change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardFrame {
    pub header: FrameHeader,
    pub occupancy: Vec<u8>,
    pub directions: Vec<u8>,
    /// `1` where the piece on that cell had its move rejected last step.
    pub rejected: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FrameCodecError {
    #[error("binary frame codec failed: {0}")]
    Binary(#[from] bincode::Error),
    #[error("json frame codec failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame carries {actual} cells, expected {expected}")]
    CellCount { expected: usize, actual: usize },
}

impl BoardFrame {
    pub fn new(
        turn: u64,
        mode: Mode,
        running: bool,
        occupancy: &[u8],
        directions: &[u8],
        rejected: &[bool],
    ) -> Self {
        let pieces = occupancy.iter().filter(|&&cell| cell != 0).count() as u32;
        Self {
            header: FrameHeader {
                turn,
                mode,
                running,
                pieces,
                hash: 0,
            },
            occupancy: occupancy.to_vec(),
            directions: directions.to_vec(),
            rejected: rejected.iter().map(|&flag| u8::from(flag)).collect(),
        }
    }

    pub fn finalize(mut self) -> Self {
        self.header.hash = hash_frame(&self);
        self
    }

    fn validate(&self) -> Result<(), FrameCodecError> {
        for len in [
            self.occupancy.len(),
            self.directions.len(),
            self.rejected.len(),
        ] {
            if len != BOARD_CELLS {
                return Err(FrameCodecError::CellCount {
                    expected: BOARD_CELLS,
                    actual: len,
                });
            }
        }
        Ok(())
    }

    /// Text rendering: `[>]` routed piece, `[ ]` unrouted piece, `(>)` piece
    /// whose last move was rejected, ` . ` empty cell.
    pub fn render_ascii(&self) -> String {
        let mut out = format!(
            "turn {} | {} | {} | pieces {}\n",
            self.header.turn,
            self.header.mode,
            if self.header.running {
                "running"
            } else {
                "paused"
            },
            self.header.pieces
        );
        for (row_idx, row) in self.occupancy.chunks(BOARD_WIDTH).enumerate() {
            for (col, &occ) in row.iter().enumerate() {
                let idx = row_idx * BOARD_WIDTH + col;
                if Occupancy::from_u8(occ).is_some_and(Occupancy::is_piece) {
                    let glyph = self
                        .directions
                        .get(idx)
                        .copied()
                        .and_then(Direction::from_u8)
                        .unwrap_or_default()
                        .glyph();
                    if self.rejected.get(idx).copied().unwrap_or(0) != 0 {
                        out.push_str(&format!("({glyph})"));
                    } else {
                        out.push_str(&format!("[{glyph}]"));
                    }
                } else {
                    out.push_str(" . ");
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Deterministic fingerprint of a frame, ignoring its stored hash.
pub fn hash_frame(frame: &BoardFrame) -> u64 {
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write_u64(frame.header.turn);
    hasher.write_u8(match frame.header.mode {
        Mode::Placement => 0,
        Mode::Routing => 1,
    });
    hasher.write_u8(u8::from(frame.header.running));
    hasher.write_u32(frame.header.pieces);
    hasher.write(&frame.occupancy);
    hasher.write(&frame.directions);
    hasher.write(&frame.rejected);
    hasher.finish()
}

pub fn encode_frame(frame: &BoardFrame) -> Result<Vec<u8>, FrameCodecError> {
    Ok(bincode::serialize(frame)?)
}

pub fn decode_frame(bytes: &[u8]) -> Result<BoardFrame, FrameCodecError> {
    let frame: BoardFrame = bincode::deserialize(bytes)?;
    frame.validate()?;
    Ok(frame)
}

pub fn encode_frame_json(frame: &BoardFrame) -> Result<String, FrameCodecError> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode_frame_json(data: &str) -> Result<BoardFrame, FrameCodecError> {
    let frame: BoardFrame = serde_json::from_str(data)?;
    frame.validate()?;
    Ok(frame)
}

/// Prefix a payload with its little-endian `u32` length for stream transport.
pub fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(payload);
    buffer
}
