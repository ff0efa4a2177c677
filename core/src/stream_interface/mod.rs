pub mod block;
pub mod port;
pub mod sri;

pub use block::{DataMode, InputBlock, OutputBlock, SampleBuffer};
pub use port::{output_channel, OutputPort, OutputReceiver};
pub use sri::{SriPropagator, StreamSri};
