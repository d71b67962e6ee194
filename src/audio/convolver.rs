use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::buffer::AudioBuffer;
use super::frame::StereoFrame;

pub const PARTITION: usize = 128;

/// Uniformly partitioned overlap-save convolution.
///
/// Output lags input by one partition. The impulse response is normalised to
/// unit energy so a long tail does not blow up the level.
pub struct Convolver {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    kernel: Vec<Vec<Complex<f32>>>,
    left: Lane,
    right: Lane,
    pos: usize,
    scratch: Vec<Complex<f32>>,
}

// per channel state
struct Lane {
    input: Vec<f32>,
    prev: Vec<f32>,
    output: Vec<f32>,
    history: VecDeque<Vec<Complex<f32>>>,
}

impl Lane {
    fn new(partitions: usize) -> Self {
        Self {
            input: vec![0.0; PARTITION],
            prev: vec![0.0; PARTITION],
            output: vec![0.0; PARTITION],
            history: (0..partitions).map(|_| vec![Complex::default(); 2 * PARTITION]).collect(),
        }
    }

    fn run(
        &mut self,
        fft: &dyn Fft<f32>,
        ifft: &dyn Fft<f32>,
        kernel: &[Vec<Complex<f32>>],
        scratch: &mut [Complex<f32>],
    ) {
        // newest spectrum goes to the front of the delay line
        let mut spectrum = self.history.pop_back().unwrap_or_else(|| vec![Complex::default(); 2 * PARTITION]);
        for (i, s) in self.prev.iter().chain(self.input.iter()).enumerate() {
            spectrum[i] = Complex::new(*s, 0.0);
        }
        fft.process(&mut spectrum);
        self.history.push_front(spectrum);

        scratch.iter_mut().for_each(|c| *c = Complex::default());
        for (x, h) in self.history.iter().zip(kernel) {
            for ((acc, a), b) in scratch.iter_mut().zip(x).zip(h) {
                *acc += a * b;
            }
        }
        ifft.process(scratch);

        let norm = 1.0 / (2 * PARTITION) as f32;
        for (o, c) in self.output.iter_mut().zip(&scratch[PARTITION..]) {
            *o = c.re * norm;
        }
        self.prev.copy_from_slice(&self.input);
    }
}

impl Convolver {
    pub fn new(impulse: &AudioBuffer) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(2 * PARTITION);
        let ifft = planner.plan_fft_inverse(2 * PARTITION);
        let kernel = build_kernel(impulse, fft.as_ref());
        let partitions = kernel.len();
        Self {
            fft,
            ifft,
            kernel,
            left: Lane::new(partitions),
            right: Lane::new(partitions),
            pos: 0,
            scratch: vec![Complex::default(); 2 * PARTITION],
        }
    }

    /// Swap the impulse response. The tail of the previous one is dropped.
    pub fn set_impulse(&mut self, impulse: &AudioBuffer) {
        self.kernel = build_kernel(impulse, self.fft.as_ref());
        let partitions = self.kernel.len();
        self.left = Lane::new(partitions);
        self.right = Lane::new(partitions);
        self.pos = 0;
    }

    pub fn process(&mut self, input: StereoFrame) -> StereoFrame {
        let out = StereoFrame {
            left: self.left.output[self.pos],
            right: self.right.output[self.pos],
        };
        self.left.input[self.pos] = input.left;
        self.right.input[self.pos] = input.right;
        self.pos += 1;

        if self.pos == PARTITION {
            self.pos = 0;
            let (fft, ifft) = (self.fft.as_ref(), self.ifft.as_ref());
            self.left.run(fft, ifft, &self.kernel, &mut self.scratch);
            self.right.run(fft, ifft, &self.kernel, &mut self.scratch);
        }
        out
    }
}

fn build_kernel(impulse: &AudioBuffer, fft: &dyn Fft<f32>) -> Vec<Vec<Complex<f32>>> {
    // first channel only; generated reverbs are mono
    let ir = impulse.channel(0).unwrap_or(&[]);
    let energy: f32 = ir.iter().map(|s| s * s).sum();
    let scale = if energy > 0.0 { 1.0 / energy.sqrt() } else { 0.0 };

    let partitions = ir.len().div_ceil(PARTITION).max(1);
    (0..partitions)
        .map(|p| {
            let mut part = vec![Complex::default(); 2 * PARTITION];
            let start = p * PARTITION;
            let end = (start + PARTITION).min(ir.len());
            for (slot, s) in part.iter_mut().zip(&ir[start.min(end)..end]) {
                *slot = Complex::new(s * scale, 0.0);
            }
            fft.process(&mut part);
            part
        })
        .collect()
}
