use std::path::Path;

use anyhow::Context;

use super::frame::StereoFrame;

/// Decoded PCM audio, one sample vector per channel.
///
/// Buffers are immutable once built and are shared between grains and
/// triggers behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> anyhow::Result<Self> {
        anyhow::ensure!(sample_rate > 0, "sample rate must be positive");
        anyhow::ensure!(!channels.is_empty(), "audio buffer needs at least one channel");
        let frames = channels[0].len();
        anyhow::ensure!(
            channels.iter().all(|c| c.len() == frames),
            "all channels of an audio buffer must have the same length"
        );
        Ok(Self { sample_rate, channels })
    }

    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> anyhow::Result<Self> {
        Self::new(sample_rate, vec![samples])
    }

    // generated material (impulse responses) can't be malformed
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: vec![samples],
        }
    }

    // Load a WAV file from disk, resampled to the rate the graph renders at
    pub fn load_wav(path: &Path, target_rate: u32) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();
        let num_channels = spec.channels.max(1) as usize;

        // Read the samples from the WAV file
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => { // int, convert to float
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        // deinterleave
        let mut channels = vec![Vec::with_capacity(samples.len() / num_channels); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }

        if spec.sample_rate != target_rate {
            channels = channels
                .iter()
                .map(|c| resample_linear(c, spec.sample_rate, target_rate))
                .collect();
        }

        Self::new(target_rate, channels)
            .with_context(|| format!("{} decoded to an invalid buffer", path.display()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    // mono buffers play on both sides, anything past the second channel is ignored
    pub fn frame(&self, index: usize) -> StereoFrame {
        let left = self.channels[0].get(index).copied().unwrap_or(0.0);
        let right = match self.channels.get(1) {
            Some(c) => c.get(index).copied().unwrap_or(0.0),
            None => left,
        };
        StereoFrame { left, right }
    }

    /// Linearly interpolated read at a fractional frame position.
    pub fn frame_at(&self, pos: f64) -> StereoFrame {
        if pos < 0.0 {
            return StereoFrame::zero();
        }
        let i = pos.floor() as usize;
        let frac = (pos - i as f64) as f32;
        StereoFrame::lerp(self.frame(i), self.frame(i + 1), frac)
    }
}

fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    // This is a simple linear resampler, good enough for one-shot drum samples
    if source_rate == target_rate {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio; // ex. 3.7
        let idx = src_pos.floor() as usize; // ex. 3
        let frac = (src_pos - idx as f64) as f32; // ex. 0.7
        if idx >= samples.len().saturating_sub(1) { // edge case
            out.push(samples.last().copied().unwrap_or(0.0));
        } else {
            out.push(samples[idx] * (1.0 - frac) + samples[idx + 1] * frac);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn rejects_ragged_channels() {
        assert!(AudioBuffer::new(44100, vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
        assert!(AudioBuffer::new(0, vec![vec![0.0; 4]]).is_err());
    }

    #[test]
    fn duration_is_frames_over_rate() {
        let buf = AudioBuffer::from_mono(1000, vec![0.0; 250]).unwrap();
        assert_eq!(buf.frame_count(), 250);
        assert!((buf.duration() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn mono_reads_on_both_sides_and_interpolates() {
        let buf = AudioBuffer::from_mono(1000, vec![0.0, 1.0]).unwrap();
        let f = buf.frame_at(0.5);
        assert!((f.left - 0.5).abs() < 1e-6);
        assert_eq!(f.left, f.right);
        assert_eq!(buf.frame_at(5.0), StereoFrame::zero());
    }

    #[test]
    fn loads_stereo_wav_deinterleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 8000, 2, &[16384, -16384, 0, 8192]);

        let buf = AudioBuffer::load_wav(&path, 8000).unwrap();
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frame_count(), 2);
        assert!((buf.channel(0).unwrap()[0] - 0.5).abs() < 1e-4);
        assert!((buf.channel(1).unwrap()[0] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 8000, 1, &[0; 800]);

        let buf = AudioBuffer::load_wav(&path, 16000).unwrap();
        assert_eq!(buf.sample_rate(), 16000);
        assert_eq!(buf.frame_count(), 1600);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AudioBuffer::load_wav(Path::new("/nope/missing.wav"), 44100).unwrap_err();
        assert!(format!("{err:#}").contains("missing.wav"));
    }
}
