use crate::shared::{Control, DisplayState, Screen};

// state local to tui; knob keys need to know which control they turn.
// synced from DisplayState every frame, never edited by key handling
#[derive(Clone, Debug, Default)]
pub struct TuiState {
    pub screen: Screen,
    pub selected: Option<Control>,
}

impl TuiState {
    pub fn sync(&mut self, ds: &DisplayState) {
        self.screen = ds.screen;
        self.selected = ds.selected();
    }
}
