//! Streaming FIR filter and correlator built on partitioned FFT convolution.
//!
//! Coefficients are either designed from a frequency-domain band request or
//! supplied directly, held in a versioned copy-on-write store, and applied to
//! any number of interleaved sample streams with overlap-save fast convolution.
//! Each stream identity owns its own overlap state and metadata.

pub mod math;
pub mod prelude;
pub mod processing;
pub mod stream_interface;
pub mod telemetry;

pub use prelude::{FilterError, FilterResult, ProcessingStage};
pub use processing::{
    CoefficientSet, ConfigQuery, ConfigUpdate, CorrelationMode, FastFilter, FilterDesigner,
    FilterProps, FilterType, Provenance, Taps,
};
pub use stream_interface::{
    output_channel, DataMode, InputBlock, OutputBlock, OutputPort, OutputReceiver, SampleBuffer,
    StreamSri,
};
pub use telemetry::MetricsSnapshot;
