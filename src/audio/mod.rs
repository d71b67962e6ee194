use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio_api::{AudioGraph, GraphCommand};

mod automation;
mod buffer;
mod convolver;
mod effect;
mod engine;
mod frame;
mod node_id;
mod voice;

pub use buffer::AudioBuffer;
pub use engine::{AudioClock, Engine};
pub use frame::StereoFrame;
pub use node_id::{next_node_id, NodeId};

/// Control-side end of the running output stream.
///
/// Graph calls become commands on a bounded queue that the audio callback
/// drains before rendering each block.
pub struct AudioHandle {
    tx: Sender<GraphCommand>,
    ended_rx: Receiver<NodeId>,
    clock: AudioClock,
    sample_rate: u32,
    dropped: u64,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer sources the renderer released since the last call.
    pub fn poll_ended(&self) -> Vec<NodeId> {
        self.ended_rx.try_iter().collect()
    }
}

impl AudioGraph for AudioHandle {
    fn submit(&mut self, cmd: GraphCommand) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "audio command queue full, command dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("audio thread is gone, command dropped");
            }
        }
    }
}

pub fn start_audio(queue_len: usize) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<GraphCommand>(queue_len);
    let (ended_tx, ended_rx) = crossbeam_channel::bounded::<NodeId>(queue_len);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let mut engine = Engine::new(sample_rate);
    engine.set_ended_tx(ended_tx);
    let clock = engine.clock();

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
            output_stream.play().context("failed to play output stream")?;
            tracing::info!(sample_rate, channels, "audio output running");

            Ok(AudioHandle {
                tx,
                ended_rx,
                clock,
                sample_rate,
                dropped: 0,
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<GraphCommand>,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let err_fn = |err| tracing::error!("audio output stream error: {err}");

    // grown once on the first callback, reused afterwards
    let mut scratch: Vec<StereoFrame> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            scratch.resize(n_frames, StereoFrame::zero());
            engine.render_block(&mut scratch);

            for (out, frame) in data.chunks_exact_mut(channels.max(1)).zip(&scratch) {
                match out {
                    [mono] => *mono = (frame.left + frame.right) * 0.5,
                    [l, r, rest @ ..] => {
                        *l = frame.left;
                        *r = frame.right;
                        rest.iter_mut().for_each(|s| *s = 0.0);
                    }
                    [] => {}
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
