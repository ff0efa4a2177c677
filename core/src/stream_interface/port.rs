use crate::prelude::{FilterError, FilterResult};
use crate::stream_interface::block::OutputBlock;
use tokio::sync::mpsc;

/// Creates a bounded output port. The consumer drains the receiver at its
/// own pace; producers block (or await) once `capacity` blocks are queued.
pub fn output_channel(capacity: usize) -> (OutputPort, OutputReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (OutputPort { sender }, OutputReceiver { receiver })
}

/// Sending half handed to the filter.
#[derive(Clone, Debug)]
pub struct OutputPort {
    sender: mpsc::Sender<OutputBlock>,
}

impl OutputPort {
    /// Blocks the calling thread until the consumer has room.
    ///
    /// Must not be called from inside an async runtime; use [`OutputPort::push`] there.
    pub fn push_blocking(&self, block: OutputBlock) -> FilterResult<()> {
        self.sender
            .blocking_send(block)
            .map_err(|err| FilterError::PortClosed(err.0.sri.stream_id))
    }

    pub async fn push(&self, block: OutputBlock) -> FilterResult<()> {
        self.sender
            .send(block)
            .await
            .map_err(|err| FilterError::PortClosed(err.0.sri.stream_id))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half polled by the downstream consumer.
#[derive(Debug)]
pub struct OutputReceiver {
    receiver: mpsc::Receiver<OutputBlock>,
}

impl OutputReceiver {
    pub async fn recv(&mut self) -> Option<OutputBlock> {
        self.receiver.recv().await
    }

    pub fn blocking_recv(&mut self) -> Option<OutputBlock> {
        self.receiver.blocking_recv()
    }

    /// Non-blocking poll; `None` when nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<OutputBlock> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_interface::{DataMode, SampleBuffer, StreamSri};
    use std::thread;
    use std::time::Duration;

    fn block(id: &str, value: f32) -> OutputBlock {
        OutputBlock {
            sri: StreamSri {
                stream_id: id.into(),
                sample_interval: 1.0,
                mode: DataMode::Real,
            },
            samples: SampleBuffer::Real(vec![value]),
            eos: false,
            sri_changed: false,
        }
    }

    #[test]
    fn slow_consumer_applies_backpressure_without_loss() {
        let (port, mut receiver) = output_channel(1);
        let producer = thread::spawn(move || {
            for i in 0..8 {
                port.push_blocking(block("A", i as f32)).unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(out) = receiver.blocking_recv() {
            thread::sleep(Duration::from_millis(2));
            seen.push(out.samples.as_real().unwrap()[0]);
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn closed_receiver_reports_port_closed() {
        let (port, receiver) = output_channel(2);
        drop(receiver);
        assert!(port.is_closed());
        let err = port.push_blocking(block("B", 0.0)).unwrap_err();
        assert!(matches!(err, FilterError::PortClosed(id) if id == "B"));
    }
}
