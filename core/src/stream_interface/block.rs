use crate::prelude::{FilterError, FilterResult};
use crate::stream_interface::sri::StreamSri;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Whether a stream carries real scalars or complex pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Real,
    Complex,
}

impl DataMode {
    pub fn is_complex(self) -> bool {
        matches!(self, DataMode::Complex)
    }
}

/// Sample payload of a block, tagged by data mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "lowercase")]
pub enum SampleBuffer {
    Real(Vec<f32>),
    Complex(Vec<Complex32>),
}

impl SampleBuffer {
    /// Builds a buffer from the `re, im, re, im, ...` wire layout used by
    /// float transports when `complex` is set.
    pub fn from_interleaved(values: Vec<f32>, complex: bool) -> FilterResult<Self> {
        if !complex {
            return Ok(SampleBuffer::Real(values));
        }
        if values.len() % 2 != 0 {
            return Err(FilterError::InvalidInput(format!(
                "complex payload has odd length {}",
                values.len()
            )));
        }
        Ok(SampleBuffer::Complex(
            values
                .chunks_exact(2)
                .map(|pair| Complex32::new(pair[0], pair[1]))
                .collect(),
        ))
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        match self {
            SampleBuffer::Real(values) => values.clone(),
            SampleBuffer::Complex(values) => {
                values.iter().flat_map(|value| [value.re, value.im]).collect()
            }
        }
    }

    pub fn empty(mode: DataMode) -> Self {
        match mode {
            DataMode::Real => SampleBuffer::Real(Vec::new()),
            DataMode::Complex => SampleBuffer::Complex(Vec::new()),
        }
    }

    pub fn mode(&self) -> DataMode {
        match self {
            SampleBuffer::Real(_) => DataMode::Real,
            SampleBuffer::Complex(_) => DataMode::Complex,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Real(values) => values.len(),
            SampleBuffer::Complex(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_real(&self) -> Option<&[f32]> {
        match self {
            SampleBuffer::Real(values) => Some(values),
            SampleBuffer::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&[Complex32]> {
        match self {
            SampleBuffer::Complex(values) => Some(values),
            SampleBuffer::Real(_) => None,
        }
    }

    /// Returns the samples as complex values, promoting real samples with a
    /// zero imaginary part.
    pub fn to_complex(&self) -> Vec<Complex32> {
        match self {
            SampleBuffer::Real(values) => {
                values.iter().map(|&value| Complex32::new(value, 0.0)).collect()
            }
            SampleBuffer::Complex(values) => values.clone(),
        }
    }

    /// Appends `other`. Appending across modes promotes the buffer to complex.
    pub fn append(&mut self, other: SampleBuffer) {
        if other.mode().is_complex() && !self.mode().is_complex() {
            *self = SampleBuffer::Complex(self.to_complex());
        }
        match self {
            SampleBuffer::Complex(lhs) => lhs.extend(other.to_complex()),
            SampleBuffer::Real(lhs) => {
                if let SampleBuffer::Real(rhs) = other {
                    lhs.extend(rhs);
                }
            }
        }
    }
}

/// One block received on the input boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBlock {
    #[serde(rename = "streamID")]
    pub stream_id: String,
    pub samples: SampleBuffer,
    #[serde(rename = "sampleRate")]
    pub sample_rate: f64,
    #[serde(rename = "EOS", default)]
    pub eos: bool,
    /// Set by the transport when its queue overflowed and dropped data.
    #[serde(rename = "queueFlushed", default)]
    pub queue_flushed: bool,
}

impl InputBlock {
    pub fn new(stream_id: impl Into<String>, samples: SampleBuffer, sample_rate: f64) -> Self {
        Self {
            stream_id: stream_id.into(),
            samples,
            sample_rate,
            eos: false,
            queue_flushed: false,
        }
    }

    pub fn real(stream_id: impl Into<String>, samples: Vec<f32>, sample_rate: f64) -> Self {
        Self::new(stream_id, SampleBuffer::Real(samples), sample_rate)
    }

    pub fn complex(
        stream_id: impl Into<String>,
        samples: Vec<Complex32>,
        sample_rate: f64,
    ) -> Self {
        Self::new(stream_id, SampleBuffer::Complex(samples), sample_rate)
    }

    /// End-of-stream marker without payload.
    pub fn end_of_stream(stream_id: impl Into<String>, sample_rate: f64) -> Self {
        Self::real(stream_id, Vec::new(), sample_rate).with_eos(true)
    }

    pub fn with_eos(mut self, eos: bool) -> Self {
        self.eos = eos;
        self
    }

    pub fn with_queue_flushed(mut self, flushed: bool) -> Self {
        self.queue_flushed = flushed;
        self
    }

    pub fn is_complex(&self) -> bool {
        self.samples.mode().is_complex()
    }
}

/// One block emitted on the output boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBlock {
    pub sri: StreamSri,
    pub samples: SampleBuffer,
    #[serde(rename = "EOS")]
    pub eos: bool,
    /// True when `sri` differs from the last metadata emitted for the stream.
    #[serde(rename = "sriChanged")]
    pub sri_changed: bool,
}

impl OutputBlock {
    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    pub fn sample_interval(&self) -> f64 {
        self.sri.sample_interval
    }

    pub fn mode(&self) -> DataMode {
        self.sri.mode
    }
}
