use serde::Serialize;

use crate::stepper::StepReport;

/// Running counters for a session. Turn and piece count follow the board
/// (undo rewinds them); the totals only ever grow.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationMetrics {
    pub turn: u64,
    pub pieces: usize,
    pub steps_total: u64,
    pub moves_total: u64,
    pub rejections_total: u64,
    pub exited_total: u64,
    pub undo_total: u64,
    pub policy_applied: u64,
    pub policy_failed: u64,
}

impl SimulationMetrics {
    pub fn record_step(&mut self, turn: u64, pieces: usize, report: &StepReport) {
        self.turn = turn;
        self.pieces = pieces;
        self.steps_total += 1;
        self.moves_total += report.moved as u64;
        self.rejections_total += report.rejected as u64;
        self.exited_total += report.exited as u64;
    }

    pub fn sync_board(&mut self, turn: u64, pieces: usize) {
        self.turn = turn;
        self.pieces = pieces;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_totals_accumulate() {
        let mut metrics = SimulationMetrics::default();
        let report = StepReport {
            moved: 3,
            rejected: 1,
            exited: 1,
            ..StepReport::default()
        };
        metrics.record_step(1, 4, &report);
        metrics.record_step(2, 3, &report);
        assert_eq!(metrics.turn, 2);
        assert_eq!(metrics.pieces, 3);
        assert_eq!(metrics.moves_total, 6);
        assert_eq!(metrics.rejections_total, 2);
        assert_eq!(metrics.exited_total, 2);
    }
}
