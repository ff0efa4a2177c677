use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps a pair of `rustfft` plans of one size for reuse.
///
/// Plans are shared behind `Arc`, so a helper can be cloned into every
/// transform plan and used from several threads at once; callers provide
/// the scratch space.
#[derive(Clone)]
pub struct FftHelper {
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            size,
            forward,
            inverse,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Scratch length required by [`FftHelper::forward_with_scratch`] and
    /// [`FftHelper::inverse_with_scratch`].
    pub fn scratch_len(&self) -> usize {
        self.forward
            .get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len())
    }

    pub fn forward_with_scratch(&self, buffer: &mut [Complex32], scratch: &mut [Complex32]) {
        self.forward.process_with_scratch(buffer, scratch);
    }

    /// Inverse transform, normalised by `1/size`.
    pub fn inverse_with_scratch(&self, buffer: &mut [Complex32], scratch: &mut [Complex32]) {
        self.inverse.process_with_scratch(buffer, scratch);
        let scale = 1.0 / self.size as f32;
        for value in buffer.iter_mut() {
            *value *= scale;
        }
    }

    /// Zero-pads (or truncates) `input` to the plan size and returns its spectrum.
    pub fn forward(&self, input: &[Complex32]) -> Vec<Complex32> {
        let mut buffer: Vec<Complex32> = input.iter().take(self.size).copied().collect();
        buffer.resize(self.size, Complex32::zero());
        let mut scratch = vec![Complex32::zero(); self.scratch_len()];
        self.forward_with_scratch(&mut buffer, &mut scratch);
        buffer
    }

    pub fn forward_real(&self, input: &[f32]) -> Vec<Complex32> {
        let promoted: Vec<Complex32> = input
            .iter()
            .map(|&value| Complex32::new(value, 0.0))
            .collect();
        self.forward(&promoted)
    }
}

/// Frequency in Hz of each bin of a `size`-point transform, in FFT order
/// (DC, positive frequencies, then negative frequencies).
pub fn bin_frequencies(size: usize, sample_rate: f64) -> Vec<f64> {
    let step = sample_rate / size as f64;
    (0..size)
        .map(|bin| {
            if bin <= (size - 1) / 2 {
                bin as f64 * step
            } else {
                (bin as f64 - size as f64) * step
            }
        })
        .collect()
}
