pub mod buffer_pool;
pub mod coefficients;
pub mod convolution;
pub mod design;
pub mod fastfilter;
pub mod plan;
pub mod streams;

pub use buffer_pool::BufferPool;
pub use coefficients::{
    CoefficientSet, CoefficientStore, ConfigQuery, ConfigSnapshot, ConfigUpdate, CorrelationMode,
    Provenance, Taps,
};
pub use convolution::FastConvolutionEngine;
pub use design::{FilterDesigner, FilterProps, FilterType, MaskReport, TapBounds};
pub use fastfilter::FastFilter;
pub use plan::{FilterPath, TransformPlan};
pub use streams::{StreamContext, StreamStateManager};
