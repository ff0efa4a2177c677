//! Overlap-save fast convolution.
//!
//! Input is cut into chunks of at most `M - N + 1` samples. Each chunk is
//! prefixed with the last `N - 1` input samples of the stream, transformed,
//! multiplied by the kernel spectrum and inverse transformed; the samples past
//! the overlap are the linear convolution output for that chunk.

use crate::prelude::SampleBuffer;
use crate::processing::plan::{FilterPath, TransformPlan};
use crate::processing::streams::{OverlapState, StreamContext};
use num_complex::Complex32;
use rustfft::num_traits::Zero;

pub struct FastConvolutionEngine;

impl FastConvolutionEngine {
    /// Filters one block of `context`'s stream with `plan`. The output has
    /// exactly as many samples as the input; the overlap history advances.
    /// Real data over real taps comes out complex while the history still
    /// holds imaginary parts from earlier complex blocks.
    pub fn transform(
        plan: &TransformPlan,
        context: &mut StreamContext,
        samples: &SampleBuffer,
    ) -> SampleBuffer {
        let state = &mut context.overlap;
        state.conform(plan);
        let path = FilterPath::resolve(plan.taps_complex(), samples.mode());
        match (path, samples) {
            (FilterPath::RealReal, SampleBuffer::Real(input)) if !state.holds_imaginary() => {
                SampleBuffer::Real(filter_real_pairs(plan, state, input))
            }
            (_, SampleBuffer::Real(input)) => {
                SampleBuffer::Complex(filter(plan, state, input, |v| Complex32::new(v, 0.0)))
            }
            (_, SampleBuffer::Complex(input)) => {
                SampleBuffer::Complex(filter(plan, state, input, |v| v))
            }
        }
    }

    /// Feeds `N - 1` zeros through the stream, releasing the output still
    /// owed for the samples in the overlap history.
    pub fn flush(plan: &TransformPlan, context: &mut StreamContext) -> SampleBuffer {
        let zeros = if context.data_mode().is_complex() {
            SampleBuffer::Complex(vec![Complex32::zero(); plan.overlap()])
        } else {
            SampleBuffer::Real(vec![0.0; plan.overlap()])
        };
        Self::transform(plan, context, &zeros)
    }
}

fn filter<T: Copy>(
    plan: &TransformPlan,
    state: &mut OverlapState,
    input: &[T],
    lift: impl Fn(T) -> Complex32,
) -> Vec<Complex32> {
    let overlap = plan.overlap();
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks(plan.valid_len()) {
        let window = &mut state.window;
        window[..overlap].copy_from_slice(&state.tail);
        for (slot, &value) in window[overlap..].iter_mut().zip(chunk) {
            *slot = lift(value);
        }
        window[overlap + chunk.len()..].fill(Complex32::zero());

        apply(plan, &mut state.window, &mut state.scratch);
        output.extend_from_slice(&state.window[overlap..overlap + chunk.len()]);
        advance_tail(&mut state.tail, chunk, &lift);
    }
    output
}

/// Real taps over real data: two consecutive chunks ride in the real and
/// imaginary lanes of one window, halving the transform count. Valid because
/// the kernel is real, so the lanes never mix.
fn filter_real_pairs(plan: &TransformPlan, state: &mut OverlapState, input: &[f32]) -> Vec<f32> {
    let overlap = plan.overlap();
    let real = |v: f32| Complex32::new(v, 0.0);
    let chunks: Vec<&[f32]> = input.chunks(plan.valid_len()).collect();
    let mut output = Vec::with_capacity(input.len());

    for pair in chunks.chunks(2) {
        let first = pair[0];
        let second: &[f32] = pair.get(1).copied().unwrap_or(&[]);

        let window = &mut state.window;
        for (slot, past) in window[..overlap].iter_mut().zip(&state.tail) {
            *slot = Complex32::new(past.re, 0.0);
        }
        for (slot, &value) in window[overlap..].iter_mut().zip(first) {
            *slot = real(value);
        }
        window[overlap + first.len()..].fill(Complex32::zero());
        advance_tail(&mut state.tail, first, &real);

        for (slot, past) in state.window[..overlap].iter_mut().zip(&state.tail) {
            slot.im = past.re;
        }
        for (slot, &value) in state.window[overlap..].iter_mut().zip(second) {
            slot.im = value;
        }
        advance_tail(&mut state.tail, second, &real);

        apply(plan, &mut state.window, &mut state.scratch);
        let valid = &state.window[overlap..];
        output.extend(valid[..first.len()].iter().map(|v| v.re));
        output.extend(valid[..second.len()].iter().map(|v| v.im));
    }
    output
}

fn apply(plan: &TransformPlan, window: &mut [Complex32], scratch: &mut [Complex32]) {
    plan.fft().forward_with_scratch(window, scratch);
    for (bin, &gain) in window.iter_mut().zip(plan.spectrum()) {
        *bin = *bin * gain;
    }
    plan.fft().inverse_with_scratch(window, scratch);
}

/// Shifts `chunk` into the history, keeping its last `tail.len()` samples.
fn advance_tail<T: Copy>(tail: &mut [Complex32], chunk: &[T], lift: &impl Fn(T) -> Complex32) {
    let overlap = tail.len();
    if overlap == 0 || chunk.is_empty() {
        return;
    }
    if chunk.len() >= overlap {
        for (slot, &value) in tail.iter_mut().zip(&chunk[chunk.len() - overlap..]) {
            *slot = lift(value);
        }
    } else {
        tail.rotate_left(chunk.len());
        for (slot, &value) in tail[overlap - chunk.len()..].iter_mut().zip(chunk) {
            *slot = lift(value);
        }
    }
}
