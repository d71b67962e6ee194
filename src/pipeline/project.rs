// What gets written to .grainstep/project.json on quit.

use serde::{Deserialize, Serialize};

use crate::effects::{DelaySettings, ReverbSettings};
use crate::engines::GrainSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    // file names of the kit the score was written for
    pub kit: Vec<String>,
    pub score: Vec<Vec<bool>>, // [track][step]
    pub bpm: f64,
    pub master_db: f64,
    pub track_db: Vec<f64>,
    pub track_cutoff: Vec<f64>,
    pub pad_volume: Vec<f64>,
    pub grain: GrainSettings,
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            kit: Vec::new(),
            score: Vec::new(),
            bpm: 280.0,
            master_db: 0.0,
            track_db: Vec::new(),
            track_cutoff: Vec::new(),
            pad_volume: Vec::new(),
            grain: GrainSettings::default(),
            delay: DelaySettings::default(),
            reverb: ReverbSettings::default(),
        }
    }
}

impl ProjectState {
    /// Saved state only applies to the same kit laid out on the same grid.
    pub fn fits(&self, tracks: usize, steps: usize) -> bool {
        self.score.len() == tracks
            && self.score.iter().all(|row| row.len() == steps)
            && self.track_db.len() == tracks
            && self.track_cutoff.len() == tracks
            && self.pad_volume.len() == tracks
    }
}
