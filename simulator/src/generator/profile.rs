use crate::generator::template::{complex_tone, tone};
use anyhow::ensure;
use fastfilter::{InputBlock, SampleBuffer};
use num_complex::Complex32;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One synthetic stream: a sum of tones plus uniform noise, cut into blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub id: String,
    pub sample_rate: f64,
    pub complex: bool,
    pub length: usize,
    pub block_size: usize,
    /// Tone frequencies in Hz.
    pub tones: Vec<f32>,
    pub amplitude: f32,
    pub noise: f32,
    pub seed: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            id: "stream-0".to_string(),
            sample_rate: 10_000.0,
            complex: false,
            length: 8192,
            block_size: 1000,
            tones: vec![300.0, 2500.0],
            amplitude: 1.0,
            noise: 0.01,
            seed: 0,
        }
    }
}

impl StreamConfig {
    fn samples(&self) -> SampleBuffer {
        let fs = self.sample_rate as f32;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut jitter = move || {
            if self.noise > 0.0 {
                rng.gen_range(-self.noise..self.noise)
            } else {
                0.0
            }
        };

        if self.complex {
            let mut samples = vec![Complex32::new(0.0, 0.0); self.length];
            for &frequency in &self.tones {
                let wave = complex_tone(self.length, frequency, fs, self.amplitude);
                for (sample, value) in samples.iter_mut().zip(wave) {
                    *sample += value;
                }
            }
            for sample in samples.iter_mut() {
                *sample += Complex32::new(jitter(), jitter());
            }
            SampleBuffer::Complex(samples)
        } else {
            let mut samples = vec![0.0; self.length];
            for &frequency in &self.tones {
                let wave = tone(self.length, frequency, fs, self.amplitude);
                for (sample, value) in samples.iter_mut().zip(wave) {
                    *sample += value;
                }
            }
            for sample in samples.iter_mut() {
                *sample += jitter();
            }
            SampleBuffer::Real(samples)
        }
    }
}

/// Cuts the stream into input blocks and appends an empty end-of-stream block.
pub fn build_blocks(config: &StreamConfig) -> anyhow::Result<Vec<InputBlock>> {
    ensure!(
        config.block_size > 0,
        "stream {} has a zero block size",
        config.id
    );
    ensure!(
        config.sample_rate.is_finite() && config.sample_rate > 0.0,
        "stream {} has sample rate {}",
        config.id,
        config.sample_rate
    );

    let pieces: Vec<SampleBuffer> = match config.samples() {
        SampleBuffer::Real(values) => values
            .chunks(config.block_size)
            .map(|chunk| SampleBuffer::Real(chunk.to_vec()))
            .collect(),
        SampleBuffer::Complex(values) => values
            .chunks(config.block_size)
            .map(|chunk| SampleBuffer::Complex(chunk.to_vec()))
            .collect(),
    };
    let block_count = pieces.len();
    let mut blocks = Vec::with_capacity(block_count + 1);
    for samples in pieces {
        blocks.push(InputBlock::new(config.id.clone(), samples, config.sample_rate));
    }
    blocks.push(InputBlock::end_of_stream(config.id.clone(), config.sample_rate));
    Ok(blocks)
}

/// Round-robin merge of several streams' blocks, as an upstream multiplexer
/// would deliver them.
pub fn interleave(streams: Vec<Vec<InputBlock>>) -> Vec<InputBlock> {
    let total = streams.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = streams.into_iter().map(Vec::into_iter).collect();
    let mut merged = Vec::with_capacity(total);
    while merged.len() < total {
        for iter in iters.iter_mut() {
            if let Some(block) = iter.next() {
                merged.push(block);
            }
        }
    }
    merged
}
