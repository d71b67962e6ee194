use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Paragraph};
use ratatui::Frame;

use crate::shared::DisplayState;

const NAME_WIDTH: u16 = 12;

// one row per track, one cell per step; the playhead column is tinted and the
// cursor cell gets its own colour
pub fn draw_step_grid(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let tracks = state.score.len();
    if tracks == 0 {
        return;
    }
    let steps = state.score[0].len();
    let playhead = state.playhead.iter().position(|&on| on);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(1); tracks])
        .split(area);

    for (track, row_area) in rows.iter().enumerate() {
        let [name_area, cells_area] = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(NAME_WIDTH), Constraint::Min(0)])
            .areas(*row_area);

        let name = state.track_names.get(track).map(String::as_str).unwrap_or("");
        let name_style = if state.cursor.0 == track {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        frame.render_widget(Paragraph::new(truncate(name, NAME_WIDTH as usize - 1)).style(name_style), name_area);

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, steps as u32); steps])
            .split(cells_area);

        for (step, cell_area) in cols.iter().enumerate() {
            let on = state.score[track][step];
            let style = cell_style(on, playhead == Some(step), state.cursor == (track, step));
            let block = Block::default().style(style);
            frame.render_widget(Paragraph::new(if on { "■" } else { "·" }).block(block), *cell_area);
        }
    }
}

fn cell_style(on: bool, under_playhead: bool, under_cursor: bool) -> Style {
    let fg = if on { Color::LightMagenta } else { Color::DarkGray };
    let bg = match (under_cursor, under_playhead) {
        (true, _) => Color::Blue,
        (false, true) => Color::Magenta,
        _ => Color::Reset,
    };
    Style::default().fg(fg).bg(bg)
}

fn truncate(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}
