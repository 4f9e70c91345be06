//! Engine crate for the routing board simulator.
//!
//! [`Engine`] owns the board and is the only thing that mutates it. Hosts
//! feed it frames and input events, read the occupancy and direction buffers
//! back, and listen for [`HostEvent`]s.

pub mod board;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod input;
pub mod metrics;
pub mod mode;
pub mod network;
pub mod policy;
pub mod stepper;

pub use board::{Board, BoardError};
pub use config::{
    load_engine_config_from_env, ConfigError, EngineConfig, PolicyConfig, ServerConfig,
};
pub use dispatch::{key_binding, keys, Command, CommandOutcome, EditIntent, KeyBinding};
pub use engine::{Engine, EngineError, HostEvent};
pub use history::{EmptyHistory, SnapshotHistory, StoredSnapshot};
pub use input::{BoardLayout, Buttons, Modifiers, PointerEventKind};
pub use metrics::SimulationMetrics;
pub use mode::ModeController;
pub use network::{start_frame_server, FrameServer};
pub use policy::{
    HttpPolicyTransport, PolicyBridge, PolicyError, PolicyOutcome, PolicyTransport,
    MAX_RESPONSE_BYTES,
};
pub use stepper::{resolve_step, StepReport, Stepper};
