//! Pointer translation: event codes, modifier masks, and pixel-to-cell
//! hit-testing against the viewport layout.

use bitflags::bitflags;
use route_protocol::{BOARD_HEIGHT, BOARD_WIDTH};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const META = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u32 {
        const PRIMARY = 1;
        const SECONDARY = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Move,
    Down,
    Up,
}

impl PointerEventKind {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Move),
            1 => Some(Self::Down),
            2 => Some(Self::Up),
            _ => None,
        }
    }
}

/// Placement of the board inside the viewport: square tiles of an integer
/// pixel size, centred after reserving `margin` on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardLayout {
    pub viewport: (f32, f32),
    pub origin: (f32, f32),
    pub tile: f32,
}

impl BoardLayout {
    pub fn compute(width: f32, height: f32, margin: f32) -> Self {
        let usable_w = (width - 2.0 * margin).max(0.0);
        let usable_h = (height - 2.0 * margin).max(0.0);
        let tile = (usable_w / BOARD_WIDTH as f32)
            .min(usable_h / BOARD_HEIGHT as f32)
            .floor()
            .max(0.0);
        let board_w = tile * BOARD_WIDTH as f32;
        let board_h = tile * BOARD_HEIGHT as f32;
        Self {
            viewport: (width, height),
            origin: (
                ((width - board_w) / 2.0).floor(),
                ((height - board_h) / 2.0).floor(),
            ),
            tile,
        }
    }

    /// Cell under the pixel, or `None` when the pixel misses the board.
    pub fn cell_at(&self, px: f32, py: f32) -> Option<(i32, i32)> {
        if self.tile <= 0.0 || !px.is_finite() || !py.is_finite() {
            return None;
        }
        let fx = (px - self.origin.0) / self.tile;
        let fy = (py - self.origin.1) / self.tile;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (x, y) = (fx.floor() as i32, fy.floor() as i32);
        if x >= BOARD_WIDTH as i32 || y >= BOARD_HEIGHT as i32 {
            return None;
        }
        Some((x, y))
    }

    /// Top-left pixel of a cell.
    pub fn cell_origin(&self, x: i32, y: i32) -> (f32, f32) {
        (
            self.origin.0 + x as f32 * self.tile,
            self.origin.1 + y as f32 * self.tile,
        )
    }
}

/// Stroke and hover tracking across pointer events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerTracker {
    stroke: Option<(i32, i32)>,
    hover: Option<(i32, i32)>,
}

/// What a pointer event asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    None,
    /// Start of a stroke on a cell.
    Press { x: i32, y: i32 },
    /// Stroke dragged into a cell it has not touched yet.
    Paint { x: i32, y: i32 },
}

impl PointerTracker {
    pub fn hover(&self) -> Option<(i32, i32)> {
        self.hover
    }

    pub fn stroke_active(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn track(
        &mut self,
        cell: Option<(i32, i32)>,
        kind: PointerEventKind,
        buttons: Buttons,
    ) -> PointerAction {
        if cell.is_some() {
            self.hover = cell;
        }
        match kind {
            PointerEventKind::Down => match cell {
                Some((x, y)) => {
                    self.stroke = Some((x, y));
                    PointerAction::Press { x, y }
                }
                None => {
                    self.stroke = None;
                    PointerAction::None
                }
            },
            PointerEventKind::Up => {
                self.stroke = None;
                PointerAction::None
            }
            PointerEventKind::Move => {
                if !buttons.contains(Buttons::PRIMARY) {
                    self.stroke = None;
                    return PointerAction::None;
                }
                match (self.stroke, cell) {
                    (Some(last), Some((x, y))) if last != (x, y) => {
                        self.stroke = Some((x, y));
                        PointerAction::Paint { x, y }
                    }
                    _ => PointerAction::None,
                }
            }
        }
    }
}
