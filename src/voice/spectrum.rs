//! Byte-scaled magnitude spectrum over a fixed analysis window

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex32};

/// Samples per analysis window (64ms at 16kHz)
pub const FFT_SIZE: usize = 1024;

/// Magnitudes at or below this level map to 0
const MIN_DECIBELS: f32 = -100.0;

/// Magnitudes at or above this level map to 255
const MAX_DECIBELS: f32 = -30.0;

/// Blackman-windowed FFT producing `FFT_SIZE / 2` bins on a 0-255 scale
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
    bins: Vec<f32>,
}

impl SpectrumAnalyzer {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        #[allow(clippy::cast_precision_loss)]
        let window = (0..FFT_SIZE)
            .map(|n| {
                let phase = 2.0 * PI * n as f32 / FFT_SIZE as f32;
                0.08f32.mul_add((2.0 * phase).cos(), 0.5f32.mul_add(-phase.cos(), 0.42))
            })
            .collect();

        Self {
            sample_rate,
            fft,
            window,
            buffer: vec![Complex32::ZERO; FFT_SIZE],
            bins: vec![0.0; FFT_SIZE / 2],
        }
    }

    /// Width of one bin in Hz
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / FFT_SIZE as f32
    }

    /// Analyse the most recent `FFT_SIZE` samples
    ///
    /// Shorter input is zero-padded at the front.
    pub fn analyze(&mut self, samples: &[f32]) -> &[f32] {
        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        let offset = FFT_SIZE - tail.len();

        for slot in &mut self.buffer[..offset] {
            *slot = Complex32::ZERO;
        }
        for ((slot, &sample), &w) in self.buffer[offset..]
            .iter_mut()
            .zip(tail)
            .zip(&self.window[offset..])
        {
            *slot = Complex32::new(sample * w, 0.0);
        }

        self.fft.process(&mut self.buffer);

        #[allow(clippy::cast_precision_loss)]
        let scale = FFT_SIZE as f32;
        for (bin, c) in self.bins.iter_mut().zip(&self.buffer) {
            *bin = to_byte_scale(c.norm() / scale);
        }

        &self.bins
    }
}

fn to_byte_scale(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0).clamp(0.0, 255.0)
}
