use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

use super::mode::TuiState;
use crate::shared::InputEvent;

// poll for one key press and resolve it to input events for the session
pub fn poll_input(timeout: Duration, ts: &TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code, ts));
    }
    Ok(vec![])
}

fn handle_key(code: KeyCode, ts: &TuiState) -> Vec<InputEvent> {
    match code {
        KeyCode::Esc => vec![InputEvent::Quit],
        KeyCode::Char(' ') => vec![InputEvent::TogglePlay],
        KeyCode::Char('g') => vec![InputEvent::ToggleGrains],
        KeyCode::Char('v') => vec![InputEvent::ToggleReverb],
        KeyCode::Tab => vec![InputEvent::NextScreen],

        KeyCode::Up => vec![InputEvent::MoveCursor { tracks: -1, steps: 0 }],
        KeyCode::Down => vec![InputEvent::MoveCursor { tracks: 1, steps: 0 }],
        KeyCode::Left => vec![InputEvent::MoveCursor { tracks: 0, steps: -1 }],
        KeyCode::Right => vec![InputEvent::MoveCursor { tracks: 0, steps: 1 }],
        KeyCode::Enter => vec![InputEvent::ToggleStep],

        // pads 1-9 are kit samples 0-8
        KeyCode::Char(c @ '1'..='9') => vec![InputEvent::TriggerPad(c as u8 - b'1')],

        KeyCode::Char('j') => vec![InputEvent::SelectControl(1)],
        KeyCode::Char('k') => vec![InputEvent::SelectControl(-1)],

        // knob: small and big turns of the selected control
        KeyCode::Char('[') => knob(-1, ts),
        KeyCode::Char(']') => knob(1, ts),
        KeyCode::Char('{') => knob(-10, ts),
        KeyCode::Char('}') => knob(10, ts),

        _ => vec![],
    }
}

fn knob(steps: i32, ts: &TuiState) -> Vec<InputEvent> {
    match ts.selected {
        Some(control) if ts.screen.controls().contains(&control) => vec![InputEvent::Adjust(control, steps)],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Control, Screen};

    #[test]
    fn digits_are_zero_based_pads() {
        let ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Char('1'), &ts), vec![InputEvent::TriggerPad(0)]);
        assert_eq!(handle_key(KeyCode::Char('9'), &ts), vec![InputEvent::TriggerPad(8)]);
        assert!(handle_key(KeyCode::Char('0'), &ts).is_empty());
    }

    #[test]
    fn knob_turns_the_selected_control() {
        let mut ts = TuiState::default();
        assert!(handle_key(KeyCode::Char(']'), &ts).is_empty());

        ts.screen = Screen::Delay;
        ts.selected = Some(Control::DelayFeedback);
        assert_eq!(handle_key(KeyCode::Char('{'), &ts), vec![InputEvent::Adjust(Control::DelayFeedback, -10)]);
        assert_eq!(handle_key(KeyCode::Char(']'), &ts), vec![InputEvent::Adjust(Control::DelayFeedback, 1)]);

        // stale selection from another screen
        ts.screen = Screen::Granular;
        assert!(handle_key(KeyCode::Char(']'), &ts).is_empty());
    }

    #[test]
    fn arrows_move_the_cursor() {
        let ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Left, &ts), vec![InputEvent::MoveCursor { tracks: 0, steps: -1 }]);
        assert_eq!(handle_key(KeyCode::Down, &ts), vec![InputEvent::MoveCursor { tracks: 1, steps: 0 }]);
    }
}
