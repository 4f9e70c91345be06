//! Simulation Stepper: one-cell-per-step movement with collision resolution,
//! plus the run/pause cadence that decides when steps are due.

use route_protocol::{cell_index, cell_position, Occupancy, BOARD_CELLS};

use crate::board::Board;

/// Outcome of resolving a single step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    pub moved: usize,
    pub rejected: usize,
    pub exited: usize,
    /// Cells whose piece tried to move and was held in place.
    pub rejected_cells: [bool; BOARD_CELLS],
}

impl Default for StepReport {
    fn default() -> Self {
        Self {
            moved: 0,
            rejected: 0,
            exited: 0,
            rejected_cells: [false; BOARD_CELLS],
        }
    }
}

impl StepReport {
    /// True when the step altered the board.
    pub fn changed(&self) -> bool {
        self.moved > 0 || self.exited > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Plan {
    Vacant,
    Stay,
    Move(usize),
    Reject,
    Exit,
}

impl Plan {
    fn vacates(self) -> bool {
        matches!(self, Plan::Move(_) | Plan::Exit)
    }
}

/// Resolve one step of `board` and return the next board with a report.
///
/// A mover is held in place when its destination is off the board, when
/// another mover claims the same destination, or when the destination piece
/// stays put. The last rule is applied until no more movers are rejected so
/// that a blocked piece blocks the whole queue behind it. Pieces heading into
/// each other's cells both vacate and exchange places. Pieces starting on
/// `exit` leave the board.
pub fn resolve_step(board: &Board, exit: Option<usize>) -> (Board, StepReport) {
    let mut plans = [Plan::Vacant; BOARD_CELLS];
    let mut report = StepReport::default();

    for idx in board.pieces() {
        plans[idx] = if exit == Some(idx) {
            Plan::Exit
        } else {
            let direction = board.direction_at(idx);
            if !direction.is_moving() {
                Plan::Stay
            } else {
                let (x, y) = cell_position(idx);
                let (dx, dy) = direction.delta();
                match cell_index(x + dx, y + dy) {
                    Some(dest) => Plan::Move(dest),
                    None => Plan::Reject,
                }
            }
        };
    }

    let mut claims = [0u8; BOARD_CELLS];
    for plan in plans.iter() {
        if let Plan::Move(dest) = *plan {
            claims[dest] = claims[dest].saturating_add(1);
        }
    }
    for idx in 0..BOARD_CELLS {
        if let Plan::Move(dest) = plans[idx] {
            if claims[dest] > 1 {
                plans[idx] = Plan::Reject;
            }
        }
    }

    loop {
        let mut changed = false;
        for idx in 0..BOARD_CELLS {
            if let Plan::Move(dest) = plans[idx] {
                if board.is_piece_at(dest) && !plans[dest].vacates() {
                    plans[idx] = Plan::Reject;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut next = Board::new();
    for (idx, plan) in plans.iter().enumerate() {
        let direction = board.direction_at(idx);
        match *plan {
            Plan::Vacant => {}
            Plan::Stay => next.write(idx, Occupancy::Piece, direction),
            Plan::Reject => {
                next.write(idx, Occupancy::Piece, direction);
                report.rejected += 1;
                report.rejected_cells[idx] = true;
            }
            Plan::Move(dest) => {
                next.write(dest, Occupancy::Piece, direction);
                report.moved += 1;
            }
            Plan::Exit => report.exited += 1,
        }
    }

    (next, report)
}

/// Run/pause sub-state and the time accumulator driving automatic steps.
#[derive(Debug, Clone)]
pub struct Stepper {
    running: bool,
    accumulator: f32,
    interval: f32,
    max_steps_per_frame: u32,
}

impl Stepper {
    pub fn new(interval_secs: f32, max_steps_per_frame: u32) -> Self {
        Self {
            running: false,
            accumulator: 0.0,
            interval: interval_secs.max(f32::EPSILON),
            max_steps_per_frame: max_steps_per_frame.max(1),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn set_running(&mut self, running: bool) {
        if self.running != running {
            self.accumulator = 0.0;
        }
        self.running = running;
    }

    /// Flip run/pause and return the new state.
    pub fn toggle(&mut self) -> bool {
        self.set_running(!self.running);
        self.running
    }

    /// Feed `dt` seconds of host time and return how many steps are due.
    ///
    /// Paused steppers never accumulate. Backlog beyond `max_steps_per_frame`
    /// is dropped rather than replayed on later frames.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        if !self.running || !dt.is_finite() || dt <= 0.0 {
            return 0;
        }
        self.accumulator += dt;
        let mut due = 0;
        while self.accumulator >= self.interval && due < self.max_steps_per_frame {
            self.accumulator -= self.interval;
            due += 1;
        }
        if self.accumulator >= self.interval {
            self.accumulator %= self.interval;
        }
        due
    }
}
