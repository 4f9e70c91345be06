use std::collections::VecDeque;

use ratatui::layout::{Constraint, Direction as LayoutDirection, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use route_protocol::{BoardFrame, Direction, Mode, BOARD_HEIGHT, BOARD_WIDTH};

pub struct UiState {
    pub latest: Option<BoardFrame>,
    pub frames_seen: u64,
    pub cursor: (i32, i32),
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            latest: None,
            frames_seen: 0,
            cursor: (0, 0),
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    pub fn push_frame(&mut self, frame: BoardFrame) {
        self.latest = Some(frame);
        self.frames_seen += 1;
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(BOARD_HEIGHT as u16 + 2),
            Constraint::Length(6),
            Constraint::Min(5),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], state);
    draw_board(frame, chunks[1], state);
    draw_commands(frame, chunks[2]);
    draw_logs(frame, chunks[3], state);
}

fn inner(area: Rect) -> Rect {
    area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    })
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Routing Board Inspector");
    let line = match &state.latest {
        Some(board) => {
            let header = &board.header;
            let mode_color = match header.mode {
                Mode::Placement => Color::Cyan,
                Mode::Routing => Color::Magenta,
            };
            Line::from(vec![
                Span::styled(
                    format!("turn {:>5}", header.turn),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(" | "),
                Span::styled(header.mode.label(), Style::default().fg(mode_color)),
                Span::raw(" | "),
                if header.running {
                    Span::styled("running", Style::default().fg(Color::Green))
                } else {
                    Span::styled("paused", Style::default().fg(Color::DarkGray))
                },
                Span::raw(format!(" | pieces {:>3}", header.pieces)),
                Span::raw(format!(" | frames {}", state.frames_seen)),
            ])
        }
        None => Line::from(Span::styled(
            "Waiting for the first frame...",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(line).wrap(Wrap { trim: true }), inner(area));
}

fn draw_board(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Board");
    let mut lines = Vec::with_capacity(BOARD_HEIGHT);
    if let Some(board) = &state.latest {
        for y in 0..BOARD_HEIGHT {
            let mut spans = Vec::with_capacity(BOARD_WIDTH);
            for x in 0..BOARD_WIDTH {
                let idx = y * BOARD_WIDTH + x;
                let occupied = board.occupancy.get(idx).copied().unwrap_or(0) != 0;
                let rejected = board.rejected.get(idx).copied().unwrap_or(0) != 0;
                let glyph = board
                    .directions
                    .get(idx)
                    .copied()
                    .and_then(Direction::from_u8)
                    .unwrap_or_default()
                    .glyph();
                let (text, mut style) = if !occupied {
                    (" . ".to_string(), Style::default().fg(Color::DarkGray))
                } else if rejected {
                    (format!("({glyph})"), Style::default().fg(Color::Red))
                } else {
                    (format!("[{glyph}]"), Style::default().fg(Color::White))
                };
                if state.cursor == (x as i32, y as i32) {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                spans.push(Span::styled(text, style));
            }
            lines.push(Line::from(spans));
        }
    }
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(lines), inner(area));
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = |label: &'static str| Span::styled(label, Style::default().fg(Color::Yellow));
    let lines = vec![
        Line::from(vec![
            key("arrows"),
            Span::raw(" cursor  "),
            key("enter"),
            Span::raw(" edit (shift: reverse)  "),
            key("m"),
            Span::raw(" mode"),
        ]),
        Line::from(vec![
            key("space"),
            Span::raw(" run/pause  "),
            key("s"),
            Span::raw(" step  "),
            key("z"),
            Span::raw(" undo  "),
            key("r"),
            Span::raw(" reset"),
        ]),
        Line::from(vec![
            key("c"),
            Span::raw(" clear pieces  "),
            key("d"),
            Span::raw(" clear routes  "),
            key("o"),
            Span::raw(" random routes  "),
            key("0-9"),
            Span::raw(" random pieces"),
        ]),
        Line::from(vec![
            key("p"),
            Span::raw(" ask policy  "),
            key("q"),
            Span::raw(" exit"),
        ]),
    ];
    let block = Block::default().borders(Borders::ALL).title("Commands");
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner(area));
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}
