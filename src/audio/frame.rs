use std::ops::{Add, AddAssign, Mul};

// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(value: f32) -> Self {
        Self { left: value, right: value }
    }

    pub fn lerp(a: Self, b: Self, t: f32) -> Self {
        Self {
            left: a.left * (1.0 - t) + b.left * t,
            right: a.right * (1.0 - t) + b.right * t,
        }
    }

    // largest absolute sample of the two channels, used by level meters and tests
    pub fn peak(self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}

impl Add for StereoFrame {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for StereoFrame {
    type Output = Self;

    fn mul(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}
