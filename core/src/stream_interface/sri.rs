use crate::stream_interface::block::DataMode;
use serde::{Deserialize, Serialize};

/// Stream metadata carried alongside every output block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSri {
    #[serde(rename = "streamID")]
    pub stream_id: String,
    #[serde(rename = "sampleInterval")]
    pub sample_interval: f64,
    pub mode: DataMode,
}

impl StreamSri {
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.sample_interval
    }
}

/// Derives output metadata from the stream's sample rate and the data mode
/// produced by the active tap/data combination.
pub struct SriPropagator;

impl SriPropagator {
    pub fn derive(stream_id: &str, sample_rate: f64, mode: DataMode) -> StreamSri {
        StreamSri {
            stream_id: stream_id.to_owned(),
            sample_interval: 1.0 / sample_rate,
            mode,
        }
    }

    /// Computes the metadata for the next output block and records it in
    /// `last`. The flag is true on the first block of a stream and whenever
    /// the sample rate or output mode moved.
    pub fn propagate(
        last: &mut Option<StreamSri>,
        stream_id: &str,
        sample_rate: f64,
        mode: DataMode,
    ) -> (StreamSri, bool) {
        let sri = Self::derive(stream_id, sample_rate, mode);
        let changed = last.as_ref() != Some(&sri);
        if changed {
            *last = Some(sri.clone());
        }
        (sri, changed)
    }
}
