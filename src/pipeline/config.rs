// grainstep.toml: read once at startup, every field optional.
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::effects::{DelaySettings, ReverbSettings};
use crate::engines::GrainSettings;
use crate::loader::sample_loader;
use crate::scheduler::DEFAULT_LOOKAHEAD;

pub const CONFIG_FILE: &str = "grainstep.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub bpm: f64,
    pub master_db: f64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { bpm: 280.0, master_db: 0.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How far ahead of the audio clock events are scheduled, in seconds.
    pub lookahead: f64,
    /// Capacity of the command queue to the audio thread.
    pub command_queue: usize,
    pub steps: usize,
    /// Sample rate used when bouncing offline.
    pub bounce_sample_rate: u32,
    /// Source for the granular engine; the first kit sample when unset.
    pub grain_source: Option<PathBuf>,
    /// Kit samples, one track each. Empty means every WAV in `kit_dir`.
    pub kit: Vec<PathBuf>,
    pub kit_dir: PathBuf,
    pub transport: TransportSettings,
    pub grain: GrainSettings,
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookahead: DEFAULT_LOOKAHEAD,
            command_queue: 4096,
            steps: 16,
            bounce_sample_rate: 44100,
            grain_source: None,
            kit: Vec::new(),
            kit_dir: PathBuf::from("kit"),
            transport: TransportSettings::default(),
            grain: GrainSettings::default(),
            delay: DelaySettings::default(),
            reverb: ReverbSettings::default(),
        }
    }
}

impl Config {
    /// `<project_dir>/grainstep.toml`, or defaults when there is none.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        anyhow::ensure!(config.steps > 0, "steps must be at least 1");
        anyhow::ensure!(config.command_queue > 0, "command_queue must be at least 1");
        anyhow::ensure!(
            config.lookahead.is_finite() && config.lookahead >= 0.0,
            "lookahead must be a non-negative number of seconds"
        );
        anyhow::ensure!(config.bounce_sample_rate > 0, "bounce_sample_rate must be positive");
        Ok(config)
    }

    /// Kit sample paths, resolved against the project directory.
    pub fn kit_paths(&self, project_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let paths = if self.kit.is_empty() {
            sample_loader::index_wav_in_dir(&project_dir.join(&self.kit_dir))?
        } else {
            self.kit.iter().map(|p| project_dir.join(p)).collect()
        };
        anyhow::ensure!(!paths.is_empty(), "no kit samples found (set `kit` or put WAVs in {})", self.kit_dir.display());
        Ok(paths)
    }

    pub fn grain_source_path(&self, project_dir: &Path) -> Option<PathBuf> {
        self.grain_source.as_ref().map(|p| project_dir.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn sections_override_individual_fields() {
        let config = Config::parse(
            r#"
            steps = 8
            kit = ["a.wav", "b.wav"]

            [transport]
            bpm = 120.0

            [delay]
            feedback = 0.4

            [reverb]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.steps, 8);
        assert_eq!(config.kit.len(), 2);
        assert_eq!(config.transport.bpm, 120.0);
        assert_eq!(config.transport.master_db, 0.0);
        assert_eq!(config.delay.feedback, 0.4);
        assert_eq!(config.delay.delay_time, 1.0);
        assert!(config.reverb.enabled);
        assert_eq!(config.reverb.level_db, 12.0);
    }

    #[test]
    fn rejects_zero_steps_and_unknown_types() {
        assert!(Config::parse("steps = 0").is_err());
        assert!(Config::parse("lookahead = \"soon\"").is_err());
    }

    #[test]
    fn kit_defaults_to_wavs_in_kit_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        assert!(config.kit_paths(dir.path()).is_err());

        std::fs::create_dir(dir.path().join("kit")).unwrap();
        std::fs::write(dir.path().join("kit/kick.wav"), b"").unwrap();
        let paths = config.kit_paths(dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("kit/kick.wav")]);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }
}
