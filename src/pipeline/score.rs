use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Step matrix, `rows[track][step]`. Every row has the same length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>", into = "Vec<Vec<bool>>")]
pub struct Score {
    rows: Vec<Vec<bool>>,
}

impl Score {
    pub fn empty(tracks: usize, steps: usize) -> Result<Self, ConfigError> {
        if steps == 0 {
            return Err(ConfigError::NoSteps);
        }
        Ok(Self { rows: vec![vec![false; steps]; tracks] })
    }

    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, ConfigError> {
        let expected = rows.first().map_or(0, Vec::len);
        if expected == 0 {
            return Err(ConfigError::NoSteps);
        }
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(ConfigError::RaggedScore { row, len: r.len(), expected });
        }
        Ok(Self { rows })
    }

    pub fn num_tracks(&self) -> usize {
        self.rows.len()
    }

    pub fn num_steps(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    // out of range reads as "off"
    pub fn get(&self, track: usize, step: usize) -> bool {
        self.rows.get(track).and_then(|r| r.get(step)).copied().unwrap_or(false)
    }

    pub fn set(&mut self, track: usize, step: usize, on: bool) {
        if let Some(cell) = self.rows.get_mut(track).and_then(|r| r.get_mut(step)) {
            *cell = on;
        }
    }

    pub fn toggle(&mut self, track: usize, step: usize) {
        self.set(track, step, !self.get(track, step));
    }

    pub fn clear(&mut self) {
        self.rows.iter_mut().for_each(|r| r.fill(false));
    }
}

impl TryFrom<Vec<Vec<bool>>> for Score {
    type Error = ConfigError;

    fn try_from(rows: Vec<Vec<bool>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<Score> for Vec<Vec<bool>> {
    fn from(score: Score) -> Self {
        score.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_must_share_a_length() {
        let err = Score::from_rows(vec![vec![true; 4], vec![false; 3]]).unwrap_err();
        assert_eq!(err, ConfigError::RaggedScore { row: 1, len: 3, expected: 4 });
        assert_eq!(Score::from_rows(vec![]).unwrap_err(), ConfigError::NoSteps);
        assert_eq!(Score::empty(3, 0).unwrap_err(), ConfigError::NoSteps);
    }

    #[test]
    fn toggle_and_bounds() {
        let mut score = Score::empty(2, 4).unwrap();
        score.toggle(1, 2);
        assert!(score.get(1, 2));
        score.toggle(1, 2);
        assert!(!score.get(1, 2));
        score.toggle(5, 9);
        assert!(!score.get(5, 9));
    }

    #[test]
    fn json_shape_is_a_plain_matrix() {
        let mut score = Score::empty(2, 3).unwrap();
        score.set(0, 0, true);
        let json = serde_json::to_string(&score).unwrap();
        assert_eq!(json, "[[true,false,false],[false,false,false]]");
        assert!(serde_json::from_str::<Score>("[[true],[true,false]]").is_err());
    }
}
