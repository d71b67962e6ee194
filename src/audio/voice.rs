use std::sync::Arc;

use super::automation::AudioParam;
use super::buffer::AudioBuffer;
use super::frame::StereoFrame;

#[derive(Clone, Copy, Debug, PartialEq)]
enum PlayState {
    Idle,
    Scheduled { start: f64, offset: f64 },
    Playing,
    Ended,
}

/// One-shot playback of a shared buffer (the graph's buffer-source node).
pub struct Voice {
    buffer: Arc<AudioBuffer>,
    pub rate: AudioParam,
    state: PlayState,
    stop_at: Option<f64>,
    pos: f64, // in buffer frames
}

impl Voice {
    pub fn new(buffer: Arc<AudioBuffer>) -> Self {
        Self {
            buffer,
            rate: AudioParam::new(1.0),
            state: PlayState::Idle,
            stop_at: None,
            pos: 0.0,
        }
    }

    pub fn start(&mut self, time: f64, offset: f64) {
        // a source plays once; later starts are ignored
        if self.state == PlayState::Idle {
            self.state = PlayState::Scheduled { start: time, offset: offset.max(0.0) };
        }
    }

    pub fn stop(&mut self, time: f64) {
        self.stop_at = Some(time);
    }

    pub fn has_ended(&self) -> bool {
        self.state == PlayState::Ended
    }

    // we're at time `t`, it's our job to produce this voice's frame and move the playhead
    pub fn next_frame(&mut self, t: f64, sample_rate: f64) -> StereoFrame {
        let buffer_rate = self.buffer.sample_rate() as f64;
        match self.state {
            PlayState::Idle | PlayState::Ended => return StereoFrame::zero(),
            PlayState::Scheduled { start, offset } => {
                if t < start {
                    return StereoFrame::zero();
                }
                // sub-sample accurate entry point
                self.pos = (offset + (t - start)) * buffer_rate;
                self.state = PlayState::Playing;
            }
            PlayState::Playing => {}
        }

        if self.stop_at.is_some_and(|stop| t >= stop) || self.pos >= self.buffer.frame_count() as f64 {
            self.state = PlayState::Ended;
            return StereoFrame::zero();
        }

        let frame = self.buffer.frame_at(self.pos);
        let rate = self.rate.value_at(t).max(0.0) as f64;
        self.pos += rate * buffer_rate / sample_rate;
        frame
    }
}
