//! Shared data contracts for the routing board simulator.
//!
//! Board encodings, the payloads exchanged with the routing policy service,
//! the board frame broadcast to observers and the text command protocol live
//! here so hosts and tools can talk to the engine without linking it.

mod board;
mod command_text;
mod commands;
mod frame;
mod policy;

pub use board::{
    cell_index, cell_position, Direction, Mode, Occupancy, BOARD_CELLS, BOARD_HEIGHT, BOARD_WIDTH,
};
pub use command_text::{parse_command_line, CommandParseError, MAX_STEP_COUNT};
pub use commands::CommandPayload;
pub use frame::{
    decode_frame, decode_frame_json, encode_frame, encode_frame_json, hash_frame,
    length_prefixed, BoardFrame, FrameCodecError, FrameHeader,
};
pub use policy::{decode_policy_directions, PolicyDecodeError, PolicyRequest, PolicyResponse};
