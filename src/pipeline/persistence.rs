// called on startup and quit; saves the session's edits so we can reload them later
use std::path::{Path, PathBuf};

use crate::pipeline::project::ProjectState;

const STATE_DIR: &str = ".grainstep";
const PROJECT_FILE: &str = "project.json";
const LOG_FILE: &str = "grainstep.log";

// <project_dir>/.grainstep
pub fn state_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR)
}

// <project_dir>/.grainstep/project.json
fn project_file_path(project_dir: &Path) -> PathBuf {
    state_dir(project_dir).join(PROJECT_FILE)
}

pub fn log_file_path(project_dir: &Path) -> PathBuf {
    state_dir(project_dir).join(LOG_FILE)
}

// a missing file is normal on first run; a broken one is logged and ignored
pub fn load_project(project_dir: &Path) -> Option<ProjectState> {
    let path = project_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable project file: {e}");
            None
        }
    }
}

// Save the project state to disk, making the files if they don't exist already
pub fn save_project(project_dir: &Path, state: &ProjectState) -> anyhow::Result<()> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .grainstep/ if needed
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "project saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project(dir.path()).is_none());

        let state = ProjectState {
            bpm: 133.0,
            score: vec![vec![true, false], vec![false, true]],
            ..ProjectState::default()
        };
        save_project(dir.path(), &state).unwrap();
        assert!(dir.path().join(".grainstep/project.json").exists());
        assert_eq!(load_project(dir.path()), Some(state));
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(state_dir(dir.path())).unwrap();
        std::fs::write(project_file_path(dir.path()), "{ not json").unwrap();
        assert!(load_project(dir.path()).is_none());
    }
}
