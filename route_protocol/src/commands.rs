use crate::Direction;

/// Commands a host accepts over its text control channel.
///
/// Coordinates are board cells, not pixels; hosts that receive raw pointer
/// input translate it before building a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    /// Mode-dependent edit: toggles a piece in placement, cycles the
    /// direction in routing (`reverse` cycles backwards).
    Click { x: i32, y: i32, reverse: bool },
    /// Routing-mode edit that sets an explicit direction.
    Route {
        x: i32,
        y: i32,
        direction: Direction,
    },
    ToggleMode,
    ToggleRun,
    Step { steps: u32 },
    Undo { steps: u32 },
    Reset,
    ClearPieces,
    ClearRoutes,
    RandomPieces { count: u32 },
    RandomRoutes,
    RequestPolicy,
}

impl CommandPayload {
    /// Render the payload as a line understood by [`crate::parse_command_line`].
    pub fn to_line(&self) -> String {
        match self {
            CommandPayload::Click { x, y, reverse } => {
                if *reverse {
                    format!("click {x} {y} reverse")
                } else {
                    format!("click {x} {y}")
                }
            }
            CommandPayload::Route { x, y, direction } => format!("route {x} {y} {direction}"),
            CommandPayload::ToggleMode => "mode".to_string(),
            CommandPayload::ToggleRun => "run".to_string(),
            CommandPayload::Step { steps } => format!("step {steps}"),
            CommandPayload::Undo { steps } => format!("undo {steps}"),
            CommandPayload::Reset => "reset".to_string(),
            CommandPayload::ClearPieces => "clear pieces".to_string(),
            CommandPayload::ClearRoutes => "clear routes".to_string(),
            CommandPayload::RandomPieces { count } => format!("random pieces {count}"),
            CommandPayload::RandomRoutes => "random routes".to_string(),
            CommandPayload::RequestPolicy => "policy".to_string(),
        }
    }
}
