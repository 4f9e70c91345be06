//! Mode Controller.

use route_protocol::Mode;

/// Owns the interaction mode. Only [`ModeController::toggle`] changes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn label(&self) -> &'static str {
        self.mode.label()
    }

    pub fn toggle(&mut self) -> Mode {
        self.mode = self.mode.toggled();
        self.mode
    }

    pub fn reset(&mut self) {
        self.mode = Mode::Placement;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_placement_and_alternates() {
        let mut modes = ModeController::default();
        assert_eq!(modes.mode(), Mode::Placement);
        assert_eq!(modes.toggle(), Mode::Routing);
        assert_eq!(modes.label(), "Routing");
        assert_eq!(modes.toggle(), Mode::Placement);
    }
}
