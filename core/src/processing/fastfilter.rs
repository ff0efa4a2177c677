use crate::prelude::{
    FilterError, FilterResult, InputBlock, OutputBlock, ProcessingStage, SampleBuffer,
};
use crate::processing::coefficients::{
    CoefficientSet, CoefficientStore, ConfigQuery, ConfigUpdate,
};
use crate::processing::convolution::FastConvolutionEngine;
use crate::processing::streams::StreamStateManager;
use crate::stream_interface::{OutputPort, SriPropagator};
use crate::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use std::sync::RwLock;

/// Multi-stream FIR filter / correlator.
///
/// Blocks of distinct streams may be processed from different threads at the
/// same time; blocks of one stream must arrive in order.
pub struct FastFilter {
    store: CoefficientStore,
    streams: StreamStateManager,
    output: RwLock<Option<OutputPort>>,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl FastFilter {
    pub fn new() -> FilterResult<Self> {
        Ok(Self {
            store: CoefficientStore::new()?,
            streams: StreamStateManager::new(),
            output: RwLock::new(None),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(),
        })
    }

    pub fn with_output(port: OutputPort) -> FilterResult<Self> {
        let filter = Self::new()?;
        filter.connect(port)?;
        Ok(filter)
    }

    /// Attaches a consumer. Stream state is untouched.
    pub fn connect(&self, port: OutputPort) -> FilterResult<()> {
        *self.output.write()? = Some(port);
        self.logger.debug("output port connected");
        Ok(())
    }

    /// Detaches the consumer and hands its port back. Stream state is untouched.
    pub fn disconnect(&self) -> FilterResult<Option<OutputPort>> {
        let port = self.output.write()?.take();
        self.logger.debug("output port disconnected");
        Ok(port)
    }

    /// Applies a configuration update atomically; returns the new version.
    pub fn configure(&self, update: ConfigUpdate) -> FilterResult<u64> {
        let result = self.store.configure(update);
        match &result {
            Err(FilterError::ConfigurationConflict(reason)) => {
                self.metrics.record_conflict();
                self.logger.warn(&format!("configuration rejected: {}", reason));
            }
            Err(err) => self.logger.warn(&format!("configuration rejected: {}", err)),
            Ok(_) => {}
        }
        result
    }

    pub fn query(&self) -> FilterResult<ConfigQuery> {
        self.store.query()
    }

    /// Taps the current configuration applies to a stream at `sample_rate`.
    pub fn designed_taps(&self, sample_rate: f64) -> FilterResult<CoefficientSet> {
        check_sample_rate("query", sample_rate)?;
        let lookup = self.store.snapshot()?.plan_for(sample_rate)?;
        Ok(lookup.plan.coefficients().clone())
    }

    pub fn streams(&self) -> &StreamStateManager {
        &self.streams
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Filters one block and returns the output block without emitting it.
    /// `None` when the block produced nothing to emit.
    pub fn process(&self, block: InputBlock) -> FilterResult<Option<OutputBlock>> {
        let result = self.filter_block(block);
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    /// Filters one block and sends the result to the connected port, waiting
    /// for the consumer when it is behind. Stream state is already advanced
    /// when the send starts.
    pub fn push(&self, block: InputBlock) -> FilterResult<()> {
        let Some(output) = self.process(block)? else {
            return Ok(());
        };
        let port = self.output.read()?.clone();
        match port {
            Some(port) => port.push_blocking(output),
            None => {
                self.logger.debug(&format!(
                    "no consumer connected; dropping output of stream {}",
                    output.stream_id()
                ));
                Ok(())
            }
        }
    }

    fn filter_block(&self, block: InputBlock) -> FilterResult<Option<OutputBlock>> {
        let InputBlock {
            stream_id,
            samples,
            sample_rate,
            eos,
            queue_flushed,
        } = block;

        if queue_flushed {
            let dropped = self.streams.flush_all()?;
            self.logger.warn(&format!(
                "input queue flushed upstream, data lost; reset {} stream(s)",
                dropped
            ));
        }

        let sample_rate = if eos && samples.is_empty() {
            match self.streams.get(&stream_id)? {
                None => {
                    self.logger
                        .debug(&format!("end of stream for idle stream {}", stream_id));
                    return Ok(None);
                }
                // End-of-stream markers often carry no rate of their own.
                Some(context) if !valid_sample_rate(sample_rate) => {
                    let ctx = context.lock()?;
                    ctx.sample_rate()
                }
                Some(_) => sample_rate,
            }
        } else {
            sample_rate
        };
        check_sample_rate(&stream_id, sample_rate)?;

        let snapshot = self.store.snapshot()?;
        let lookup = snapshot.plan_for(sample_rate)?;
        if lookup.fresh_design {
            self.metrics.record_redesign();
            let coefficients = lookup.plan.coefficients();
            if coefficients.feasible {
                self.logger.record(&format!(
                    "designed {} taps for {} Hz",
                    coefficients.len(),
                    sample_rate
                ));
            } else {
                self.logger.warn(&format!(
                    "filter request not achievable within {} taps at {} Hz",
                    coefficients.len(),
                    sample_rate
                ));
            }
        }
        let plan = lookup.plan;

        let context = self.streams.resolve(&stream_id)?;
        let (filtered, samples_in, sri, sri_changed, ended) = {
            let mut ctx = context.lock()?;
            ctx.observe(sample_rate, &samples);
            let input = if samples.is_empty() {
                SampleBuffer::empty(ctx.data_mode())
            } else {
                samples
            };
            if ctx.bind(plan.clone()) {
                self.logger.debug(&format!(
                    "stream {} rebound to configuration {}",
                    stream_id,
                    plan.version()
                ));
            }
            let mut filtered = FastConvolutionEngine::transform(&plan, &mut ctx, &input);
            if eos {
                filtered.append(ctx.finish());
            }
            let mode = filtered.mode();
            let (sri, changed) =
                SriPropagator::propagate(ctx.last_sri_mut(), &stream_id, sample_rate, mode);
            (filtered, input.len(), sri, changed, ctx.is_eos_pending())
        };
        drop(context);

        if ended {
            self.streams.evict(&stream_id)?;
            self.metrics.record_flush();
            self.logger
                .debug(&format!("stream {} ended and was evicted", stream_id));
        }
        self.metrics.record_block(samples_in, filtered.len());

        Ok(Some(OutputBlock {
            sri,
            samples: filtered,
            eos,
            sri_changed,
        }))
    }
}

fn valid_sample_rate(sample_rate: f64) -> bool {
    sample_rate.is_finite() && sample_rate > 0.0
}

fn check_sample_rate(stream_id: &str, sample_rate: f64) -> FilterResult<()> {
    if valid_sample_rate(sample_rate) {
        Ok(())
    } else {
        Err(FilterError::InvalidInput(format!(
            "stream {}: sample rate {} is not a positive finite value",
            stream_id, sample_rate
        )))
    }
}

impl ProcessingStage for FastFilter {
    fn execute(&self, input: InputBlock) -> FilterResult<Option<OutputBlock>> {
        self.process(input)
    }

    fn cleanup(&self) {
        match self.streams.flush_all() {
            Ok(count) => self
                .logger
                .record(&format!("released {} stream context(s)", count)),
            Err(err) => self.logger.warn(&format!("cleanup failed: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::design::FilterProps;
    use crate::stream_interface::{output_channel, DataMode};
    use num_complex::Complex32;

    #[test]
    fn pass_through_by_default() {
        let filter = FastFilter::new().unwrap();
        let out = filter
            .process(InputBlock::real("a", vec![1.0, 2.0, 3.0], 100.0))
            .unwrap()
            .unwrap();
        assert_eq!(out.mode(), DataMode::Real);
        assert!(out.sri_changed);
        let values = out.samples.as_real().unwrap();
        for (a, e) in values.iter().zip([1.0, 2.0, 3.0]) {
            assert!((a - e).abs() < 1e-5);
        }
    }

    #[test]
    fn sri_only_flags_changes() {
        let filter = FastFilter::new().unwrap();
        let first = filter.process(InputBlock::real("a", vec![1.0; 4], 100.0)).unwrap().unwrap();
        let second = filter.process(InputBlock::real("a", vec![1.0; 4], 100.0)).unwrap().unwrap();
        let third = filter.process(InputBlock::real("a", vec![1.0; 4], 200.0)).unwrap().unwrap();
        assert!(first.sri_changed);
        assert!(!second.sri_changed);
        assert!(third.sri_changed);
        assert!((third.sample_interval() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn empty_eos_for_unknown_stream_is_ignored() {
        let filter = FastFilter::new().unwrap();
        assert!(filter
            .process(InputBlock::end_of_stream("ghost", 0.0))
            .unwrap()
            .is_none());
        assert!(filter.streams().is_empty());
    }

    #[test]
    fn bad_sample_rate_is_rejected() {
        let filter = FastFilter::new().unwrap();
        let err = filter
            .process(InputBlock::real("a", vec![1.0], f64::NAN))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidInput(_)));
        assert_eq!(filter.metrics().errors, 1);
    }

    #[test]
    fn rateless_eos_flushes_known_stream() {
        let filter = FastFilter::new().unwrap();
        filter
            .configure(ConfigUpdate::default().with_real_taps(vec![0.5, 0.5]))
            .unwrap();
        filter.process(InputBlock::real("a", vec![2.0; 4], 10.0)).unwrap();

        let out = filter
            .process(InputBlock::end_of_stream("a", 0.0))
            .unwrap()
            .unwrap();
        assert!(out.eos);
        assert_eq!(out.samples.as_real().unwrap().len(), 1);
        assert!((out.samples.as_real().unwrap()[0] - 1.0).abs() < 1e-5);
        assert!((out.sample_interval() - 0.1).abs() < 1e-12);
        assert!(filter.streams().is_empty());
        assert_eq!(filter.metrics().errors, 0);
    }

    #[test]
    fn complex_history_keeps_real_block_complex() {
        let filter = FastFilter::new().unwrap();
        filter
            .configure(ConfigUpdate::default().with_real_taps(vec![0.5, 0.5]))
            .unwrap();
        let first = filter
            .process(InputBlock::complex("a", vec![Complex32::new(0.0, 2.0)], 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(first.mode(), DataMode::Complex);

        let second = filter
            .process(InputBlock::real("a", vec![0.0], 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(second.mode(), DataMode::Complex);
        assert!(!second.sri_changed);
        let value = second.samples.as_complex().unwrap()[0];
        assert!((value - Complex32::new(0.0, 1.0)).norm() < 1e-5);

        let third = filter
            .process(InputBlock::real("a", vec![4.0], 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(third.mode(), DataMode::Real);
        assert!(third.sri_changed);
    }

    #[test]
    fn conflicts_are_counted() {
        let filter = FastFilter::new().unwrap();
        let update = ConfigUpdate::default()
            .with_filter_props(FilterProps::default())
            .with_real_taps(vec![1.0]);
        assert!(filter.configure(update).is_err());
        assert_eq!(filter.metrics().config_conflicts, 1);
    }

    #[test]
    fn queue_flush_resets_all_streams() {
        let filter = FastFilter::new().unwrap();
        filter
            .configure(ConfigUpdate::default().with_real_taps(vec![0.5, 0.5]))
            .unwrap();
        filter.process(InputBlock::real("a", vec![1.0; 4], 10.0)).unwrap();
        filter.process(InputBlock::real("b", vec![1.0; 4], 10.0)).unwrap();
        assert_eq!(filter.streams().len(), 2);

        let out = filter
            .process(InputBlock::real("a", vec![1.0; 2], 10.0).with_queue_flushed(true))
            .unwrap()
            .unwrap();
        // History was discarded, so the first output sees a zero predecessor.
        assert!((out.samples.as_real().unwrap()[0] - 0.5).abs() < 1e-5);
        assert!(out.sri_changed);
        assert_eq!(filter.streams().len(), 1);
    }

    #[test]
    fn push_delivers_to_connected_port() {
        let (port, mut receiver) = output_channel(4);
        let filter = FastFilter::with_output(port).unwrap();
        filter.push(InputBlock::real("a", vec![1.0; 8], 50.0)).unwrap();
        let block = receiver.try_recv().unwrap();
        assert_eq!(block.stream_id(), "a");
        assert_eq!(block.samples.len(), 8);

        filter.disconnect().unwrap();
        filter.push(InputBlock::real("a", vec![1.0; 8], 50.0)).unwrap();
        assert!(receiver.try_recv().is_none());
        assert!(filter.streams().contains("a").unwrap());
    }

    #[test]
    fn cleanup_releases_contexts() {
        let filter = FastFilter::new().unwrap();
        filter.execute(InputBlock::real("a", vec![1.0], 1.0)).unwrap();
        filter.cleanup();
        assert!(filter.streams().is_empty());
    }
}
