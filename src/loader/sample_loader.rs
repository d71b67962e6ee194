use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::audio::AudioBuffer;

// Decode one WAV from disk at the rate the graph renders at
pub fn load(path: &Path, target_rate: u32) -> anyhow::Result<Arc<AudioBuffer>> {
    let buffer = AudioBuffer::load_wav(path, target_rate)?;
    tracing::debug!(path = %path.display(), frames = buffer.frame_count(), "loaded sample");
    Ok(Arc::new(buffer))
}

/// All or nothing: the first file that fails aborts the whole batch.
pub fn load_all<P: AsRef<Path>>(paths: &[P], target_rate: u32) -> anyhow::Result<Vec<Arc<AudioBuffer>>> {
    paths.iter().map(|p| load(p.as_ref(), target_rate)).collect()
}

// every .wav directly inside `dir`, sorted by file name so slot order is stable
pub fn index_wav_in_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn index_finds_only_wavs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("b.wav"), 10);
        write_wav(&dir.path().join("a.WAV"), 10);
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let found = index_wav_in_dir(dir.path()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.WAV", "b.wav"]);
    }

    #[test]
    fn load_all_fails_if_any_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_wav(&good, 80);
        let missing = dir.path().join("missing.wav");

        let buffers = load_all(&[&good], 8000).unwrap();
        assert_eq!(buffers[0].frame_count(), 80);

        let err = load_all(&[&good, &missing], 8000).unwrap_err();
        assert!(format!("{err:#}").contains("missing.wav"));
    }
}
