use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use route_protocol::{BoardFrame, CommandPayload, BOARD_HEIGHT, BOARD_WIDTH};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, trace};

use crate::ui::{draw_ui, UiState};

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    receiver: UnboundedReceiver<BoardFrame>,
    command_sender: Sender<CommandPayload>,
    shutdown_sender: Sender<()>,
    log_receiver: Receiver<String>,
}

impl InspectorApp {
    pub fn new(
        receiver: UnboundedReceiver<BoardFrame>,
        command_sender: Sender<CommandPayload>,
        shutdown_sender: Sender<()>,
        log_receiver: Receiver<String>,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::default(),
            receiver,
            command_sender,
            shutdown_sender,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw = Instant::now();

        loop {
            while let Ok(frame) = self.receiver.try_recv() {
                self.ui_state.push_frame(frame);
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.elapsed() >= std::time::Duration::from_millis(50) {
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Instant::now();
            }

            if event::poll(std::time::Duration::from_millis(25))? {
                if let Event::Key(key) = event::read()? {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        break;
                    }
                    let reverse = key.modifiers.contains(KeyModifiers::SHIFT);
                    if let Some(command) = self.command_for_key(key.code, reverse) {
                        self.send(command);
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Inspector keys mirror the engine's key map; arrows move the cursor
    /// and Enter edits the cell under it.
    fn command_for_key(&mut self, code: KeyCode, reverse: bool) -> Option<CommandPayload> {
        let (x, y) = self.ui_state.cursor;
        let command = match code {
            KeyCode::Left => return self.move_cursor(-1, 0),
            KeyCode::Right => return self.move_cursor(1, 0),
            KeyCode::Up => return self.move_cursor(0, -1),
            KeyCode::Down => return self.move_cursor(0, 1),
            KeyCode::Enter => CommandPayload::Click { x, y, reverse },
            KeyCode::Char('m') => CommandPayload::ToggleMode,
            KeyCode::Char(' ') => CommandPayload::ToggleRun,
            KeyCode::Char('s') => CommandPayload::Step { steps: 1 },
            KeyCode::Char('z') => CommandPayload::Undo { steps: 1 },
            KeyCode::Char('r') => CommandPayload::Reset,
            KeyCode::Char('c') => CommandPayload::ClearPieces,
            KeyCode::Char('d') => CommandPayload::ClearRoutes,
            KeyCode::Char('o') => CommandPayload::RandomRoutes,
            KeyCode::Char('p') => CommandPayload::RequestPolicy,
            KeyCode::Char('0') => CommandPayload::RandomPieces { count: 10 },
            KeyCode::Char(digit @ '1'..='9') => CommandPayload::RandomPieces {
                count: digit.to_digit(10).unwrap_or(1),
            },
            _ => return None,
        };
        Some(command)
    }

    fn move_cursor(&mut self, dx: i32, dy: i32) -> Option<CommandPayload> {
        let (x, y) = self.ui_state.cursor;
        self.ui_state.cursor = (
            (x + dx).clamp(0, BOARD_WIDTH as i32 - 1),
            (y + dy).clamp(0, BOARD_HEIGHT as i32 - 1),
        );
        trace!(cursor = ?self.ui_state.cursor, "cursor.moved");
        None
    }

    fn send(&mut self, command: CommandPayload) {
        let line = command.to_line();
        if let Err(err) = self.command_sender.send(command) {
            error!("Failed to queue command {}: {}", line, err);
        } else {
            self.ui_state.push_log(format!("> {line}"));
        }
    }
}

pub fn channel() -> (UnboundedSender<BoardFrame>, UnboundedReceiver<BoardFrame>) {
    unbounded_channel()
}
