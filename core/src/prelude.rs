use std::sync::PoisonError;

pub use crate::stream_interface::{DataMode, InputBlock, OutputBlock, SampleBuffer, StreamSri};

/// Common error type for configuration and block processing.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("output port closed (stream {0})")]
    PortClosed(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl<T> From<PoisonError<T>> for FilterError {
    fn from(_: PoisonError<T>) -> Self {
        FilterError::Internal("lock poisoned".into())
    }
}

pub type FilterResult<T> = Result<T, FilterError>;

/// Block-oriented processing component fed by an input port.
///
/// `execute` may return `None` when the block produced nothing to emit
/// (for example an end-of-stream marker for a stream that was never seen).
pub trait ProcessingStage {
    fn execute(&self, input: InputBlock) -> FilterResult<Option<OutputBlock>>;
    fn cleanup(&self);
}
