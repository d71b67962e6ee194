use std::f64::consts::TAU;

use super::frame::StereoFrame;

/// Ring buffer delay, whole-sample resolution.
///
/// Reading happens before writing within a frame, so a delay of one sample
/// is the shortest possible and a loop through a delay never needs the value
/// it is about to produce.
pub struct DelayLine {
    buffer: Vec<StereoFrame>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_delay: f64, sample_rate: f64) -> Self {
        let len = ((max_delay * sample_rate).ceil() as usize).max(1) + 1;
        Self {
            buffer: vec![StereoFrame::zero(); len],
            write_pos: 0,
        }
    }

    pub fn max_delay_samples(&self) -> usize {
        self.buffer.len() - 1
    }

    pub fn read(&self, delay_seconds: f64, sample_rate: f64) -> StereoFrame {
        let len = self.buffer.len();
        let delay = ((delay_seconds * sample_rate).round() as usize).clamp(1, len - 1);
        self.buffer[(self.write_pos + len - delay) % len]
    }

    pub fn write(&mut self, frame: StereoFrame) {
        self.buffer[self.write_pos] = frame;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }
}

#[derive(Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    fn process(&mut self, x: f32, c: &Coefficients) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

#[derive(Clone, Copy, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// Second order lowpass (RBJ cookbook, Butterworth Q).
pub struct Biquad {
    cutoff_hz: f32,
    coeffs: Coefficients,
    left: BiquadState,
    right: BiquadState,
}

impl Biquad {
    const Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    pub fn lowpass(cutoff_hz: f32, sample_rate: f64) -> Self {
        let mut filter = Self {
            cutoff_hz: f32::NAN,
            coeffs: Coefficients::default(),
            left: BiquadState::default(),
            right: BiquadState::default(),
        };
        filter.set_cutoff(cutoff_hz, sample_rate);
        filter
    }

    // recomputing is only worth it when the cutoff actually moved
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f64) {
        if cutoff_hz == self.cutoff_hz {
            return;
        }
        self.cutoff_hz = cutoff_hz;
        let nyquist = sample_rate * 0.5;
        let f = (cutoff_hz as f64).clamp(10.0, nyquist * 0.999);
        let w0 = TAU * f / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * Self::Q);
        let a0 = 1.0 + alpha;
        self.coeffs = Coefficients {
            b0: ((1.0 - cos) / 2.0 / a0) as f32,
            b1: ((1.0 - cos) / a0) as f32,
            b2: ((1.0 - cos) / 2.0 / a0) as f32,
            a1: (-2.0 * cos / a0) as f32,
            a2: ((1.0 - alpha) / a0) as f32,
        };
    }

    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        StereoFrame {
            left: self.left.process(input.left, &self.coeffs),
            right: self.right.process(input.right, &self.coeffs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_reads_what_was_written_n_samples_ago() {
        let mut line = DelayLine::new(0.1, 100.0);
        for i in 0..20 {
            let out = line.read(0.05, 100.0);
            if i == 5 {
                assert_eq!(out.left, 1.0);
            } else {
                assert_eq!(out.left, 0.0);
            }
            line.write(StereoFrame::mono(if i == 0 { 1.0 } else { 0.0 }));
        }
    }

    #[test]
    fn delay_is_at_least_one_sample_and_at_most_capacity() {
        let mut line = DelayLine::new(0.05, 100.0);
        line.write(StereoFrame::mono(1.0));
        assert_eq!(line.read(0.0, 100.0).left, 1.0);
        assert_eq!(line.max_delay_samples(), 5);
    }

    #[test]
    fn lowpass_passes_dc_and_kills_nyquist() {
        let mut dc = Biquad::lowpass(1000.0, 44100.0);
        let mut out = StereoFrame::zero();
        for _ in 0..4410 {
            out = dc.process(StereoFrame::mono(1.0));
        }
        assert!((out.left - 1.0).abs() < 1e-3);

        let mut hf = Biquad::lowpass(1000.0, 44100.0);
        let mut peak = 0.0f32;
        for i in 0..4410 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = hf.process(StereoFrame::mono(x));
            if i > 100 {
                peak = peak.max(y.peak());
            }
        }
        assert!(peak < 1e-2);
    }
}
