use num_complex::Complex32;
use std::f32::consts::PI;

/// Real cosine at `frequency` Hz sampled at `sample_rate`.
pub fn tone(length: usize, frequency: f32, sample_rate: f32, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * frequency / sample_rate;
    (0..length)
        .map(|i| amplitude * (step * i as f32).cos())
        .collect()
}

/// Complex exponential at `frequency` Hz; negative frequencies rotate clockwise.
pub fn complex_tone(
    length: usize,
    frequency: f32,
    sample_rate: f32,
    amplitude: f32,
) -> Vec<Complex32> {
    let step = 2.0 * PI * frequency / sample_rate;
    (0..length)
        .map(|i| Complex32::from_polar(amplitude, step * i as f32))
        .collect()
}
