//! Command Dispatcher: discrete commands, the key map, and the engine entry
//! point that applies them.

use rand_chacha::ChaCha8Rng;
use route_protocol::{CommandPayload, Direction, Mode, Occupancy};

use crate::{
    board::{Board, BoardError},
    engine::{Engine, EngineError, HostEvent},
};

/// How an edit at a cell should change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditIntent {
    /// Placement: toggle the piece. Routing: next direction in the cycle.
    Cycle,
    /// As `Cycle`, but routing walks the cycle backwards.
    CycleReverse,
    /// Routing only: set this direction.
    Set(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Edit { x: i32, y: i32, intent: EditIntent },
    ToggleMode,
    ToggleRun,
    Step(u32),
    Undo(u32),
    Reset,
    ClearPieces,
    ClearRoutes,
    RandomPieces(usize),
    RandomRoutes,
    RequestPolicy,
}

impl From<CommandPayload> for Command {
    fn from(payload: CommandPayload) -> Self {
        match payload {
            CommandPayload::Click { x, y, reverse } => Command::Edit {
                x,
                y,
                intent: if reverse {
                    EditIntent::CycleReverse
                } else {
                    EditIntent::Cycle
                },
            },
            CommandPayload::Route { x, y, direction } => Command::Edit {
                x,
                y,
                intent: EditIntent::Set(direction),
            },
            CommandPayload::ToggleMode => Command::ToggleMode,
            CommandPayload::ToggleRun => Command::ToggleRun,
            CommandPayload::Step { steps } => Command::Step(steps),
            CommandPayload::Undo { steps } => Command::Undo(steps),
            CommandPayload::Reset => Command::Reset,
            CommandPayload::ClearPieces => Command::ClearPieces,
            CommandPayload::ClearRoutes => Command::ClearRoutes,
            CommandPayload::RandomPieces { count } => Command::RandomPieces(count as usize),
            CommandPayload::RandomRoutes => Command::RandomRoutes,
            CommandPayload::RequestPolicy => Command::RequestPolicy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Nothing to do; state untouched.
    Ignored,
    Edited {
        x: i32,
        y: i32,
        occupancy: Occupancy,
        direction: Direction,
    },
    /// A bulk board mutation was applied and recorded.
    BoardChanged { pieces: usize },
    ModeChanged(Mode),
    RunStateChanged(bool),
    Stepped {
        steps: u32,
        moved: usize,
        rejected: usize,
    },
    Undone { steps: u32 },
    PolicyRequested { generation: u64 },
}

/// What a key press maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBinding {
    Command(Command),
    /// Arrow keys: set a direction on the hovered cell.
    Route(Direction),
}

pub mod keys {
    pub const SPACE: u32 = 32;
    pub const LEFT: u32 = 37;
    pub const UP: u32 = 38;
    pub const RIGHT: u32 = 39;
    pub const DOWN: u32 = 40;
    pub const DIGIT_0: u32 = 48;
    pub const DIGIT_9: u32 = 57;
    pub const C: u32 = 67;
    pub const D: u32 = 68;
    pub const M: u32 = 77;
    pub const O: u32 = 79;
    pub const P: u32 = 80;
    pub const R: u32 = 82;
    pub const S: u32 = 83;
    pub const Z: u32 = 90;
}

/// Key codes follow the DOM `keyCode` numbering.
pub fn key_binding(code: u32) -> Option<KeyBinding> {
    let command = match code {
        keys::M => Command::ToggleMode,
        keys::SPACE => Command::ToggleRun,
        keys::S => Command::Step(1),
        keys::Z => Command::Undo(1),
        keys::R => Command::Reset,
        keys::C => Command::ClearPieces,
        keys::D => Command::ClearRoutes,
        keys::O => Command::RandomRoutes,
        keys::P => Command::RequestPolicy,
        keys::DIGIT_0 => Command::RandomPieces(10),
        code @ keys::DIGIT_0..=keys::DIGIT_9 => Command::RandomPieces((code - keys::DIGIT_0) as usize),
        keys::UP => return Some(KeyBinding::Route(Direction::Up)),
        keys::RIGHT => return Some(KeyBinding::Route(Direction::Right)),
        keys::DOWN => return Some(KeyBinding::Route(Direction::Down)),
        keys::LEFT => return Some(KeyBinding::Route(Direction::Left)),
        _ => return None,
    };
    Some(KeyBinding::Command(command))
}

impl Engine {
    /// Apply one command. Board mutations are recorded in history before
    /// they happen; a command that would change nothing records nothing.
    pub fn dispatch(&mut self, command: Command) -> Result<CommandOutcome, EngineError> {
        tracing::trace!(target: "route_sim::engine", ?command, "command.received");
        match command {
            Command::Edit { x, y, intent } => self.edit(x, y, intent),
            Command::ToggleMode => {
                let mode = self.modes.toggle();
                self.touch();
                tracing::info!(target: "route_sim::engine", mode = mode.label(), "mode.changed");
                self.emit(HostEvent::ModeChanged {
                    mode,
                    label: mode.label(),
                });
                Ok(CommandOutcome::ModeChanged(mode))
            }
            Command::ToggleRun => {
                let running = !self.stepper.is_running();
                self.set_running(running);
                Ok(CommandOutcome::RunStateChanged(running))
            }
            Command::Step(steps) => {
                let max = self.config.max_steps_per_command;
                if steps > max {
                    tracing::warn!(
                        target: "route_sim::engine",
                        requested = steps,
                        max,
                        "step.count_rejected"
                    );
                    return Err(EngineError::TooManySteps {
                        requested: steps,
                        max,
                    });
                }
                let mut moved = 0;
                let mut rejected = 0;
                for _ in 0..steps {
                    let report = self.step_once();
                    moved += report.moved;
                    rejected += report.rejected;
                }
                Ok(CommandOutcome::Stepped {
                    steps,
                    moved,
                    rejected,
                })
            }
            Command::Undo(steps) => self.undo(steps),
            Command::Reset => Ok(self.reset()),
            Command::ClearPieces => self.mutate_board(|board, _| {
                board.clear_pieces();
                Ok(())
            }),
            Command::ClearRoutes => self.mutate_board(|board, _| {
                board.clear_routes();
                Ok(())
            }),
            Command::RandomPieces(count) => self.mutate_board(|board, rng| {
                board.random_pieces(count, rng).map(|_| ())
            }),
            Command::RandomRoutes => self.mutate_board(|board, rng| {
                board.random_routes(rng);
                Ok(())
            }),
            Command::RequestPolicy => {
                let generation = self.request_policy()?;
                Ok(CommandOutcome::PolicyRequested { generation })
            }
        }
    }

    fn edit(&mut self, x: i32, y: i32, intent: EditIntent) -> Result<CommandOutcome, EngineError> {
        let (occupancy, current) = self.board.get(x, y)?;
        let mut next = self.board;
        match (self.modes.mode(), intent) {
            (Mode::Placement, EditIntent::Cycle | EditIntent::CycleReverse) => {
                next.toggle_piece(x, y)?;
            }
            (Mode::Placement, EditIntent::Set(_)) => return Ok(CommandOutcome::Ignored),
            (Mode::Routing, _) if !occupancy.is_piece() => {
                tracing::debug!(target: "route_sim::engine", x, y, "edit.empty_cell_ignored");
                return Ok(CommandOutcome::Ignored);
            }
            (Mode::Routing, intent) => {
                let direction = match intent {
                    EditIntent::Cycle => current.next(),
                    EditIntent::CycleReverse => current.previous(),
                    EditIntent::Set(direction) => direction,
                };
                next.set_direction(x, y, direction)?;
            }
        }
        if next == self.board {
            return Ok(CommandOutcome::Ignored);
        }

        self.commit(next);
        let (occupancy, direction) = self.board.get(x, y)?;
        Ok(CommandOutcome::Edited {
            x,
            y,
            occupancy,
            direction,
        })
    }

    fn mutate_board<F>(&mut self, apply: F) -> Result<CommandOutcome, EngineError>
    where
        F: FnOnce(&mut Board, &mut ChaCha8Rng) -> Result<(), BoardError>,
    {
        let mut next = self.board;
        apply(&mut next, &mut self.rng)?;
        if next == self.board {
            return Ok(CommandOutcome::Ignored);
        }
        self.commit(next);
        Ok(CommandOutcome::BoardChanged {
            pieces: self.board.piece_count(),
        })
    }

    fn commit(&mut self, next: Board) {
        self.history.capture(&self.board, self.turn);
        self.board = next;
        self.metrics.sync_board(self.turn, self.board.piece_count());
        self.touch();
    }

    /// Pause and return to an empty board at turn zero. Recorded in history
    /// so it can be undone.
    fn reset(&mut self) -> CommandOutcome {
        self.set_running(false);
        if self.board.is_empty() && self.turn == 0 {
            return CommandOutcome::Ignored;
        }
        self.commit(Board::new());
        self.turn = 0;
        self.metrics.sync_board(0, 0);
        CommandOutcome::BoardChanged { pieces: 0 }
    }

    fn undo(&mut self, steps: u32) -> Result<CommandOutcome, EngineError> {
        self.set_running(false);
        let mut undone = 0;
        for _ in 0..steps.max(1) {
            match self.history.restore(&mut self.board) {
                Ok(entry) => {
                    self.turn = entry.turn;
                    undone += 1;
                }
                Err(err) => {
                    if undone == 0 {
                        tracing::debug!(target: "route_sim::engine", "undo.empty_history");
                        return Err(err.into());
                    }
                    break;
                }
            }
        }
        self.metrics.undo_total += u64::from(undone);
        self.metrics.sync_board(self.turn, self.board.piece_count());
        self.touch();
        tracing::debug!(
            target: "route_sim::engine",
            undone,
            turn = self.turn,
            remaining = self.history.len(),
            "undo.applied"
        );
        Ok(CommandOutcome::Undone { steps: undone })
    }
}
