//! The engine aggregate: sole owner and writer of the board, its history and
//! the run state. Hosts drive it with frames, pointer and key events, and read
//! the board buffers back.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use route_protocol::{
    decode_policy_directions, BoardFrame, Direction, Mode, PolicyRequest, PolicyResponse,
    BOARD_CELLS,
};
use thiserror::Error;

use crate::{
    board::{Board, BoardError},
    config::EngineConfig,
    dispatch::{key_binding, Command, CommandOutcome, EditIntent, KeyBinding},
    history::{EmptyHistory, SnapshotHistory},
    input::{BoardLayout, Buttons, Modifiers, PointerAction, PointerEventKind, PointerTracker},
    metrics::SimulationMetrics,
    mode::ModeController,
    policy::{PolicyBridge, PolicyError, PolicyOutcome, PolicyTransport},
    stepper::{resolve_step, StepReport, Stepper},
};

const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("nothing to undo")]
    EmptyHistory,
    #[error("step count {requested} exceeds the per-command limit of {max}")]
    TooManySteps { requested: u32, max: u32 },
    #[error("policy unavailable: {0}")]
    PolicyUnavailable(#[from] PolicyError),
}

impl From<EmptyHistory> for EngineError {
    fn from(_: EmptyHistory) -> Self {
        EngineError::EmptyHistory
    }
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ModeChanged { mode: Mode, label: &'static str },
    RunStateChanged { running: bool },
    PolicyApplied { generation: u64, updated: usize },
    PolicyFailed { generation: u64, reason: String },
    Stepped { turn: u64, report: StepReport },
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) board: Board,
    pub(crate) history: SnapshotHistory,
    pub(crate) modes: ModeController,
    pub(crate) stepper: Stepper,
    pub(crate) turn: u64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) metrics: SimulationMetrics,
    last_report: StepReport,
    flash_remaining: f32,
    layout: BoardLayout,
    pointer: PointerTracker,
    policy: Option<PolicyBridge>,
    exit: Option<usize>,
    events: Sender<HostEvent>,
    event_rx: Receiver<HostEvent>,
    revision: u64,
}

impl Engine {
    /// Build an engine from `config`. The HTTP policy client is started only
    /// when `config.policy.enabled` is set.
    pub fn new(config: EngineConfig) -> Self {
        let policy = config
            .policy
            .enabled
            .then(|| PolicyBridge::http(&config.policy));
        Self::build(config, policy)
    }

    /// Build an engine that consults `transport` for policy requests.
    pub fn with_policy<T: PolicyTransport>(config: EngineConfig, transport: T) -> Self {
        Self::build(config, Some(PolicyBridge::spawn(transport)))
    }

    fn build(config: EngineConfig, policy: Option<PolicyBridge>) -> Self {
        let rng = match config.random_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (events, event_rx) = bounded(EVENT_QUEUE_DEPTH);
        let mut engine = Self {
            history: SnapshotHistory::with_capacity(config.history_limit),
            stepper: Stepper::new(config.step_interval_secs, config.max_steps_per_frame),
            layout: BoardLayout::compute(0.0, 0.0, config.layout_margin_px),
            exit: config.exit_index(),
            board: Board::new(),
            modes: ModeController::default(),
            turn: 0,
            rng,
            metrics: SimulationMetrics::default(),
            last_report: StepReport::default(),
            flash_remaining: 0.0,
            pointer: PointerTracker::default(),
            policy,
            events,
            event_rx,
            revision: 0,
            config,
        };
        engine.initialize();
        engine
    }

    /// Return to the start state: empty board, placement mode, paused, empty
    /// history. Outstanding policy requests are cancelled.
    pub fn initialize(&mut self) {
        self.board = Board::new();
        self.history.clear();
        self.modes.reset();
        self.stepper.set_running(false);
        self.turn = 0;
        self.last_report = StepReport::default();
        self.flash_remaining = 0.0;
        self.pointer = PointerTracker::default();
        self.metrics = SimulationMetrics::default();
        if let Some(policy) = self.policy.as_mut() {
            policy.cancel();
        }
        self.touch();
        tracing::info!(
            target: "route_sim::engine",
            history_limit = self.history.limit(),
            policy = self.policy.is_some(),
            "engine.initialized"
        );
        self.emit(HostEvent::ModeChanged {
            mode: self.modes.mode(),
            label: self.modes.label(),
        });
    }

    /// Per-frame tick. Applies a finished policy answer first, then runs any
    /// automatic steps that are due. Returns the number of steps taken.
    pub fn advance_frame(&mut self, dt: f32) -> u32 {
        self.drain_policy();

        if self.flash_remaining > 0.0 && dt.is_finite() && dt > 0.0 {
            self.flash_remaining = (self.flash_remaining - dt).max(0.0);
            if self.flash_remaining == 0.0 {
                self.touch();
            }
        }

        let due = self.stepper.accumulate(dt);
        let mut taken = 0;
        for _ in 0..due {
            if !self.stepper.is_running() {
                break;
            }
            self.step_once();
            taken += 1;
        }
        taken
    }

    /// Resolve one step, recording it in history first.
    pub(crate) fn step_once(&mut self) -> StepReport {
        self.history.capture(&self.board, self.turn);
        let (next, report) = resolve_step(&self.board, self.exit);
        self.board = next;
        self.turn += 1;
        self.metrics
            .record_step(self.turn, self.board.piece_count(), &report);
        if report.rejected > 0 {
            self.flash_remaining = self.config.rejection_flash_secs;
        }
        self.last_report = report.clone();
        self.touch();

        tracing::debug!(
            target: "route_sim::engine",
            turn = self.turn,
            moved = report.moved,
            rejected = report.rejected,
            exited = report.exited,
            "step.completed"
        );
        self.emit(HostEvent::Stepped {
            turn: self.turn,
            report: report.clone(),
        });

        if self.stepper.is_running() && (!report.changed() || self.board.is_empty()) {
            tracing::info!(
                target: "route_sim::engine",
                turn = self.turn,
                pieces = self.board.piece_count(),
                "run.auto_paused"
            );
            self.set_running(false);
        }
        report
    }

    pub fn on_pointer_event(
        &mut self,
        x: f32,
        y: f32,
        event_type: u32,
        button_mask: u32,
        modifier_mask: u32,
    ) -> Result<CommandOutcome, EngineError> {
        let Some(kind) = PointerEventKind::from_code(event_type) else {
            tracing::debug!(target: "route_sim::engine", event_type, "pointer.unknown_event");
            return Ok(CommandOutcome::Ignored);
        };
        let buttons = Buttons::from_bits_truncate(button_mask);
        let modifiers = Modifiers::from_bits_truncate(modifier_mask);
        let cell = self.layout.cell_at(x, y);
        let intent = if modifiers.contains(Modifiers::SHIFT) {
            EditIntent::CycleReverse
        } else {
            EditIntent::Cycle
        };

        match self.pointer.track(cell, kind, buttons) {
            PointerAction::None => Ok(CommandOutcome::Ignored),
            PointerAction::Paint { x, y } => self.dispatch(Command::Edit { x, y, intent }),
            PointerAction::Press { x, y } => {
                let outcome = self.dispatch(Command::Edit { x, y, intent })?;
                if self.config.policy.trigger_on_click && self.policy.is_some() {
                    if let Err(err) = self.request_policy() {
                        tracing::warn!(
                            target: "route_sim::policy",
                            error = %err,
                            "policy.request_failed"
                        );
                    }
                }
                Ok(outcome)
            }
        }
    }

    pub fn on_key_event(&mut self, key_code: u32, is_down: bool) -> Result<CommandOutcome, EngineError> {
        if !is_down {
            return Ok(CommandOutcome::Ignored);
        }
        match key_binding(key_code) {
            Some(KeyBinding::Command(command)) => self.dispatch(command),
            Some(KeyBinding::Route(direction)) => {
                if self.modes.mode() != Mode::Routing {
                    return Ok(CommandOutcome::Ignored);
                }
                match self.pointer.hover() {
                    Some((x, y)) => self.dispatch(Command::Edit {
                        x,
                        y,
                        intent: EditIntent::Set(direction),
                    }),
                    None => Ok(CommandOutcome::Ignored),
                }
            }
            None => Ok(CommandOutcome::Ignored),
        }
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.layout = BoardLayout::compute(width, height, self.config.layout_margin_px);
        tracing::debug!(
            target: "route_sim::engine",
            width,
            height,
            tile = self.layout.tile,
            "viewport.resized"
        );
    }

    pub fn occupancy_buffer(&self) -> &[u8; BOARD_CELLS] {
        self.board.occupancy_bytes()
    }

    pub fn direction_buffer(&self) -> &[u8; BOARD_CELLS] {
        self.board.direction_bytes()
    }

    /// Start address of the occupancy bytes, for hosts sharing memory with
    /// the engine. Valid until the next mutating call.
    pub fn occupancy_buffer_ptr(&self) -> *const u8 {
        self.board.occupancy_bytes().as_ptr()
    }

    pub fn direction_buffer_ptr(&self) -> *const u8 {
        self.board.direction_bytes().as_ptr()
    }

    /// Receiver for host notifications. Events are dropped when nobody drains
    /// the queue.
    pub fn events(&self) -> Receiver<HostEvent> {
        self.event_rx.clone()
    }

    /// Ask the policy service for new directions. The answer is applied by a
    /// later [`Engine::advance_frame`].
    pub fn request_policy(&mut self) -> Result<u64, EngineError> {
        let request = PolicyRequest::from_buffers(
            self.board.occupancy_bytes(),
            self.board.direction_bytes(),
        );
        let result = match self.policy.as_mut() {
            Some(bridge) => bridge.request(request),
            None => Err(PolicyError::Disabled),
        };
        match result {
            Ok(generation) => Ok(generation),
            Err(err) => {
                self.report_policy_failure(0, &err);
                Err(err.into())
            }
        }
    }

    /// Decode and apply a policy reply synchronously. Malformed replies leave
    /// the board untouched.
    pub fn apply_policy_response(&mut self, response: &PolicyResponse) -> Result<usize, EngineError> {
        let directions = decode_policy_directions(response).map_err(PolicyError::from)?;
        Ok(self.apply_policy_directions(&directions))
    }

    /// Overwrite the directions of occupied cells. Recorded in history when
    /// anything changed.
    pub fn apply_policy_directions(&mut self, directions: &[Direction; BOARD_CELLS]) -> usize {
        let before = self.board;
        let updated = self.board.apply_directions(directions);
        if updated > 0 {
            self.history.capture(&before, self.turn);
            self.touch();
        }
        self.metrics.policy_applied += 1;
        updated
    }

    /// Block up to `timeout` for the outstanding policy answer and apply it.
    /// Returns whether an answer arrived.
    pub fn wait_for_policy(&mut self, timeout: std::time::Duration) -> bool {
        let outcome = self.policy.as_mut().and_then(|bridge| bridge.wait(timeout));
        match outcome {
            Some(outcome) => {
                self.apply_policy_outcome(outcome);
                true
            }
            None => false,
        }
    }

    fn drain_policy(&mut self) {
        let outcome = self.policy.as_mut().and_then(PolicyBridge::poll);
        if let Some(outcome) = outcome {
            self.apply_policy_outcome(outcome);
        }
    }

    fn apply_policy_outcome(&mut self, outcome: PolicyOutcome) {
        match outcome.result {
            Ok(directions) => {
                let updated = self.apply_policy_directions(&directions);
                tracing::info!(
                    target: "route_sim::policy",
                    generation = outcome.generation,
                    updated,
                    "policy.applied"
                );
                self.emit(HostEvent::PolicyApplied {
                    generation: outcome.generation,
                    updated,
                });
            }
            Err(err) => self.report_policy_failure(outcome.generation, &err),
        }
    }

    fn report_policy_failure(&mut self, generation: u64, err: &PolicyError) {
        self.metrics.policy_failed += 1;
        tracing::warn!(
            target: "route_sim::policy",
            generation,
            error = %err,
            "policy.failed"
        );
        self.emit(HostEvent::PolicyFailed {
            generation,
            reason: err.to_string(),
        });
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        if self.stepper.is_running() == running {
            return;
        }
        self.stepper.set_running(running);
        self.touch();
        tracing::info!(target: "route_sim::engine", running, "run.state_changed");
        self.emit(HostEvent::RunStateChanged { running });
    }

    pub(crate) fn emit(&self, event: HostEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::trace!(target: "route_sim::engine", ?event, "event.dropped");
        }
    }

    /// Mark observable state as changed.
    pub(crate) fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Snapshot of everything an observer renders.
    pub fn frame(&self) -> BoardFrame {
        let no_flags = [false; BOARD_CELLS];
        let rejected = if self.flash_remaining > 0.0 {
            &self.last_report.rejected_cells
        } else {
            &no_flags
        };
        BoardFrame::new(
            self.turn,
            self.modes.mode(),
            self.stepper.is_running(),
            self.board.occupancy_bytes(),
            self.board.direction_bytes(),
            rejected,
        )
        .finalize()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn is_running(&self) -> bool {
        self.stepper.is_running()
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    pub fn last_report(&self) -> &StepReport {
        &self.last_report
    }

    /// Rejection highlight strength in `0.0..=1.0`, fading after each step
    /// that rejected a move.
    pub fn rejection_flash(&self) -> f32 {
        if self.config.rejection_flash_secs <= 0.0 {
            return 0.0;
        }
        (self.flash_remaining / self.config.rejection_flash_secs).clamp(0.0, 1.0)
    }

    pub fn policy_pending(&self) -> bool {
        self.policy.as_ref().is_some_and(PolicyBridge::is_pending)
    }

    /// Counter bumped by every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
