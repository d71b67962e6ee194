// Types shared between the terminal front end and the session.
//
// Keys (resolved by the tui into InputEvents):
//   Space          //  TogglePlay (sequencer + step display)
//   g              //  ToggleGrains
//   v              //  ToggleReverb
//   Tab            //  NextScreen
//   arrows         //  MoveCursor over the step grid
//   Enter          //  ToggleStep under the cursor
//   1 .. 9         //  TriggerPad
//   j / k          //  SelectControl(+1 / -1) on the current screen
//   [ / ]          //  Adjust(selected control, -1 / +1)
//   { / }          //  Adjust(selected control, -10 / +10)
//   Esc            //  Quit
//
// The session owns every bit of state; the tui only draws the DisplayState
// it gets each frame.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Sequencer,
    Granular,
    Delay,
}

impl Screen {
    pub fn next(self) -> Self {
        match self {
            Screen::Sequencer => Screen::Granular,
            Screen::Granular => Screen::Delay,
            Screen::Delay => Screen::Sequencer,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Screen::Sequencer => "SEQUENCER",
            Screen::Granular => "GRANULAR",
            Screen::Delay => "DELAY / PADS",
        }
    }

    pub fn controls(self) -> &'static [Control] {
        match self {
            Screen::Sequencer => &[
                Control::Bpm,
                Control::MasterVolume,
                Control::TrackVolume,
                Control::TrackCutoff,
                Control::ReverbLevel,
                Control::ReverbDuration,
                Control::ReverbDecay,
            ],
            Screen::Granular => &[
                Control::GrainPosition,
                Control::GrainPeriod,
                Control::GrainDuration,
                Control::GrainLevel,
            ],
            Screen::Delay => &[
                Control::DelayPreGain,
                Control::DelayTime,
                Control::DelayFeedback,
                Control::PadVolume,
            ],
        }
    }
}

/// Every live parameter the front end can turn.
///
/// Track and pad controls act on the track under the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    Bpm,
    MasterVolume,
    TrackVolume,
    TrackCutoff,
    ReverbLevel,
    ReverbDuration,
    ReverbDecay,
    GrainPosition,
    GrainPeriod,
    GrainDuration,
    GrainLevel,
    DelayPreGain,
    DelayTime,
    DelayFeedback,
    PadVolume,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Control::Bpm => "bpm",
            Control::MasterVolume => "master volume",
            Control::TrackVolume => "track volume",
            Control::TrackCutoff => "track lowpass",
            Control::ReverbLevel => "reverb level",
            Control::ReverbDuration => "reverb duration",
            Control::ReverbDecay => "reverb decay",
            Control::GrainPosition => "position",
            Control::GrainPeriod => "period",
            Control::GrainDuration => "duration",
            Control::GrainLevel => "level",
            Control::DelayPreGain => "pre-gain",
            Control::DelayTime => "delay time",
            Control::DelayFeedback => "feedback",
            Control::PadVolume => "pad volume",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Control::Bpm => "bpm",
            Control::MasterVolume | Control::TrackVolume | Control::ReverbLevel => "dB",
            Control::TrackCutoff => "Hz",
            Control::ReverbDuration | Control::GrainPosition | Control::GrainPeriod | Control::GrainDuration
            | Control::DelayTime => "s",
            Control::ReverbDecay
            | Control::GrainLevel
            | Control::DelayPreGain
            | Control::DelayFeedback
            | Control::PadVolume => "",
        }
    }

    /// Amount one `Adjust` step moves the value.
    pub fn increment(self) -> f64 {
        match self {
            Control::Bpm => 1.0,
            Control::MasterVolume | Control::TrackVolume | Control::ReverbLevel => 1.0,
            Control::TrackCutoff => 250.0,
            Control::GrainPeriod => 0.005,
            Control::GrainDuration | Control::DelayTime => 0.01,
            Control::GrainPosition
            | Control::ReverbDuration
            | Control::ReverbDecay
            | Control::GrainLevel
            | Control::DelayPreGain
            | Control::DelayFeedback
            | Control::PadVolume => 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    TogglePlay,
    ToggleGrains,
    ToggleReverb,
    NextScreen,
    MoveCursor { tracks: i32, steps: i32 },
    ToggleStep,
    TriggerPad(u8),
    SelectControl(i32),
    Adjust(Control, i32),
    Quit,
}

/// One frame's worth of everything the tui draws.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub screen: Screen,
    pub playing: bool,
    pub grains_on: bool,
    pub reverb_on: bool,
    pub bpm: f64,
    pub track_names: Vec<String>,
    pub score: Vec<Vec<bool>>,
    pub playhead: Vec<bool>,
    pub cursor: (usize, usize), // (track, step)
    pub controls: Vec<(Control, f64)>,
    pub selected_control: usize,
    pub status: String,
}

impl DisplayState {
    pub fn selected(&self) -> Option<Control> {
        self.controls.get(self.selected_control).map(|(c, _)| *c)
    }
}
