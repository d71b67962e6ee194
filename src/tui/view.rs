use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use super::grid::draw_step_grid;
use crate::shared::{Control, DisplayState};

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let grid_height = state.score.len() as u16 + 2;
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),           // header
            Constraint::Length(grid_height), // step grid
            Constraint::Min(4),              // controls of the current screen
            Constraint::Length(1),           // status line
        ])
        .split(area);

    draw_header(frame, sections[0], state);

    let grid_block = Block::default().borders(Borders::ALL).title("steps");
    let grid_area = grid_block.inner(sections[1]);
    frame.render_widget(grid_block, sections[1]);
    draw_step_grid(frame, grid_area, state);

    draw_controls(frame, sections[2], state);
    frame.render_widget(
        Paragraph::new(state.status.as_str()).style(Style::default().fg(Color::Red)),
        sections[3],
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let flag = |label: &'static str, on: bool| {
        let style = if on {
            Style::default().fg(Color::Black).bg(Color::LightMagenta)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(format!(" {label} "), style)
    };
    let line = Line::from(vec![
        Span::styled(state.screen.title(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {:.0} bpm  ", state.bpm)),
        flag("PLAY", state.playing),
        Span::raw(" "),
        flag("GRAINS", state.grains_on),
        Span::raw(" "),
        flag("REVERB", state.reverb_on),
    ]);
    let block = Block::default().borders(Borders::ALL).title("grainstep");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_controls(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let lines: Vec<Line> = state
        .controls
        .iter()
        .enumerate()
        .map(|(i, (control, value))| {
            let selected = i == state.selected_control;
            let style = if selected {
                Style::default().fg(Color::Black).bg(Color::White)
            } else {
                Style::default()
            };
            let marker = if selected { ">" } else { " " };
            Line::from(Span::styled(
                format!("{marker} {:<16}{}", control.label(), format_value(*control, *value)),
                style,
            ))
        })
        .collect();
    let block = Block::default()
        .borders(Borders::ALL)
        .title("j/k select  [ ] adjust  { } coarse  tab screen");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn format_value(control: Control, value: f64) -> String {
    let digits = match control {
        Control::Bpm | Control::TrackCutoff => 0,
        Control::MasterVolume | Control::TrackVolume | Control::ReverbLevel => 1,
        _ => 3,
    };
    let unit = control.unit();
    if unit.is_empty() {
        format!("{value:.digits$}")
    } else {
        format!("{value:.digits$} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;
    use crate::shared::Screen;

    fn state() -> DisplayState {
        DisplayState {
            screen: Screen::Delay,
            playing: true,
            grains_on: false,
            reverb_on: false,
            bpm: 280.0,
            track_names: vec!["kick.wav".into(), "snare.wav".into()],
            score: vec![vec![true, false, false, false], vec![false, false, true, false]],
            playhead: vec![false, true, false, false],
            cursor: (1, 2),
            controls: Screen::Delay.controls().iter().map(|&c| (c, 0.5)).collect(),
            selected_control: 2,
            status: String::new(),
        }
    }

    #[test]
    fn value_formatting_follows_the_unit() {
        assert_eq!(format_value(Control::Bpm, 280.4), "280 bpm");
        assert_eq!(format_value(Control::DelayTime, 0.25), "0.250 s");
        assert_eq!(format_value(Control::DelayFeedback, 0.5), "0.500");
        assert_eq!(format_value(Control::MasterVolume, -3.04), "-3.0 dB");
    }

    #[test]
    fn renders_tracks_and_selected_control() {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        let ds = state();
        terminal.draw(|frame| render(frame, frame.area(), &ds)).unwrap();

        let text: String = terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("DELAY / PADS"));
        assert!(text.contains("kick.wav"));
        assert!(text.contains("> feedback"));
    }
}
