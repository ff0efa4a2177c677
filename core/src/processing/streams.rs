use crate::prelude::{DataMode, FilterResult, SampleBuffer, StreamSri};
use crate::processing::buffer_pool::BufferPool;
use crate::processing::convolution::FastConvolutionEngine;
use crate::processing::plan::TransformPlan;
use crate::telemetry::log::LogManager;
use num_complex::Complex32;
use rustfft::num_traits::Zero;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const POOL_CAPACITY: usize = 32;

/// Overlap history and transform work buffers of one stream.
#[derive(Debug, Default)]
pub struct OverlapState {
    pub(crate) tail: Vec<Complex32>,
    pub(crate) window: Vec<Complex32>,
    pub(crate) scratch: Vec<Complex32>,
}

impl OverlapState {
    fn from_buffers(window: Vec<Complex32>, scratch: Vec<Complex32>) -> Self {
        Self {
            tail: Vec::new(),
            window,
            scratch,
        }
    }

    /// Sizes the buffers for `plan`. A tail of the wrong length keeps its most
    /// recent samples and is zero-filled at the front when it has to grow.
    pub(crate) fn conform(&mut self, plan: &TransformPlan) {
        let overlap = plan.overlap();
        let current = self.tail.len();
        if current > overlap {
            self.tail.drain(..current - overlap);
        } else if current < overlap {
            self.tail
                .splice(0..0, std::iter::repeat(Complex32::zero()).take(overlap - current));
        }
        self.window.resize(plan.fft_size(), Complex32::zero());
        self.scratch.resize(plan.fft().scratch_len(), Complex32::zero());
    }

    pub fn tail(&self) -> &[Complex32] {
        &self.tail
    }

    /// True while the history still carries samples with an imaginary part.
    pub fn holds_imaginary(&self) -> bool {
        self.tail.iter().any(|v| v.im != 0.0)
    }

    fn into_buffers(self) -> [Vec<Complex32>; 3] {
        [self.tail, self.window, self.scratch]
    }
}

/// Filtering state owned by one stream.
#[derive(Debug)]
pub struct StreamContext {
    stream_id: String,
    sample_rate: f64,
    data_mode: DataMode,
    plan: Option<Arc<TransformPlan>>,
    last_sri: Option<StreamSri>,
    eos_pending: bool,
    pub(crate) overlap: OverlapState,
}

impl StreamContext {
    fn new(stream_id: &str, overlap: OverlapState) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            sample_rate: 0.0,
            data_mode: DataMode::Real,
            plan: None,
            last_sri: None,
            eos_pending: false,
            overlap,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn data_mode(&self) -> DataMode {
        self.data_mode
    }

    pub fn plan(&self) -> Option<&Arc<TransformPlan>> {
        self.plan.as_ref()
    }

    pub fn tail(&self) -> &[Complex32] {
        self.overlap.tail()
    }

    /// Records the rate and mode of an arriving block. Empty blocks keep the
    /// previous data mode.
    pub fn observe(&mut self, sample_rate: f64, samples: &SampleBuffer) {
        self.sample_rate = sample_rate;
        if !samples.is_empty() {
            self.data_mode = samples.mode();
        }
    }

    /// Binds `plan` to this stream. Returns true when it replaces a different
    /// plan; the overlap history is carried across.
    pub fn bind(&mut self, plan: Arc<TransformPlan>) -> bool {
        let changed = match &self.plan {
            Some(current) => !Arc::ptr_eq(current, &plan),
            None => false,
        };
        self.overlap.conform(&plan);
        self.plan = Some(plan);
        changed
    }

    /// Set once the stream has been flushed; the context is due for eviction.
    pub fn is_eos_pending(&self) -> bool {
        self.eos_pending
    }

    /// Ends the stream and returns the output still owed for its overlap
    /// history. Later calls return nothing.
    pub fn finish(&mut self) -> SampleBuffer {
        if self.eos_pending {
            return SampleBuffer::empty(self.data_mode);
        }
        self.eos_pending = true;
        match self.plan.clone() {
            Some(plan) => FastConvolutionEngine::flush(&plan, self),
            None => SampleBuffer::empty(self.data_mode),
        }
    }

    pub(crate) fn last_sri_mut(&mut self) -> &mut Option<StreamSri> {
        &mut self.last_sri
    }
}

/// Tail samples produced when a stream is flushed and removed.
#[derive(Debug)]
pub struct FlushedStream {
    pub stream_id: String,
    pub samples: SampleBuffer,
}

/// Map of live stream contexts. Each context sits behind its own lock, so
/// streams are filtered concurrently while blocks of one stream serialise.
pub struct StreamStateManager {
    contexts: Mutex<HashMap<String, Arc<Mutex<StreamContext>>>>,
    pool: Mutex<BufferPool>,
    logger: LogManager,
}

impl StreamStateManager {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            pool: Mutex::new(BufferPool::with_capacity(POOL_CAPACITY)),
            logger: LogManager::for_component("streams"),
        }
    }

    /// Context for `stream_id`, created on first use.
    pub fn resolve(&self, stream_id: &str) -> FilterResult<Arc<Mutex<StreamContext>>> {
        let mut contexts = self.contexts.lock()?;
        if let Some(context) = contexts.get(stream_id) {
            return Ok(context.clone());
        }
        let overlap = {
            let mut pool = self.pool.lock()?;
            OverlapState::from_buffers(pool.checkout(0), pool.checkout(0))
        };
        let context = Arc::new(Mutex::new(StreamContext::new(stream_id, overlap)));
        contexts.insert(stream_id.to_string(), context.clone());
        self.logger.debug(&format!("new stream context {}", stream_id));
        Ok(context)
    }

    pub fn get(&self, stream_id: &str) -> FilterResult<Option<Arc<Mutex<StreamContext>>>> {
        Ok(self.contexts.lock()?.get(stream_id).cloned())
    }

    pub fn contains(&self, stream_id: &str) -> FilterResult<bool> {
        Ok(self.contexts.lock()?.contains_key(stream_id))
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stream_ids(&self) -> FilterResult<Vec<String>> {
        let mut ids: Vec<String> = self.contexts.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Removes the stream and returns the N-1 samples still held in its
    /// overlap history, filtered against zeros. `None` if the stream is unknown.
    pub fn flush_and_evict(&self, stream_id: &str) -> FilterResult<Option<FlushedStream>> {
        let Some(context) = self.contexts.lock()?.remove(stream_id) else {
            return Ok(None);
        };
        let samples = {
            let mut ctx = context.lock()?;
            ctx.finish()
        };
        self.recycle(context)?;
        self.logger.debug(&format!(
            "flushed {} samples from stream {}",
            samples.len(),
            stream_id
        ));
        Ok(Some(FlushedStream {
            stream_id: stream_id.to_string(),
            samples,
        }))
    }

    /// Drops the stream without emitting its tail.
    pub fn evict(&self, stream_id: &str) -> FilterResult<bool> {
        let removed = self.contexts.lock()?.remove(stream_id);
        match removed {
            Some(context) => {
                self.recycle(context)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops every stream's state. Returns how many streams were discarded.
    pub fn flush_all(&self) -> FilterResult<usize> {
        let drained: Vec<_> = self.contexts.lock()?.drain().map(|(_, c)| c).collect();
        let count = drained.len();
        for context in drained {
            self.recycle(context)?;
        }
        Ok(count)
    }

    fn recycle(&self, context: Arc<Mutex<StreamContext>>) -> FilterResult<()> {
        // A block still in flight on another thread keeps its own reference.
        let Ok(context) = Arc::try_unwrap(context) else {
            return Ok(());
        };
        let context = context.into_inner()?;
        let mut pool = self.pool.lock()?;
        for buffer in context.overlap.into_buffers() {
            pool.release(buffer);
        }
        Ok(())
    }
}

impl Default for StreamStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::coefficients::{CoefficientSet, Provenance, Taps};

    fn plan(taps: usize, fft_size: usize) -> Arc<TransformPlan> {
        let set = CoefficientSet::manual(Taps::Real(vec![0.1; taps]), Provenance::ManualReal);
        Arc::new(TransformPlan::build(set, fft_size, 0).unwrap())
    }

    #[test]
    fn resolve_reuses_context() {
        let manager = StreamStateManager::new();
        let a = manager.resolve("a").unwrap();
        let again = manager.resolve("a").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!a.lock().unwrap().is_eos_pending());
        assert!(again.lock().unwrap().finish().is_empty());
        assert!(a.lock().unwrap().is_eos_pending());
        manager.resolve("b").unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.stream_ids().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn rebinding_keeps_most_recent_history() {
        let manager = StreamStateManager::new();
        let context = manager.resolve("a").unwrap();
        let mut ctx = context.lock().unwrap();
        assert!(!ctx.bind(plan(4, 16)));
        ctx.overlap.tail = (1..=3).map(|v| Complex32::new(v as f32, 0.0)).collect();

        assert!(ctx.bind(plan(3, 16)));
        assert_eq!(
            ctx.tail(),
            &[Complex32::new(2.0, 0.0), Complex32::new(3.0, 0.0)]
        );

        assert!(ctx.bind(plan(5, 16)));
        let re: Vec<f32> = ctx.tail().iter().map(|v| v.re).collect();
        assert_eq!(re, vec![0.0, 0.0, 2.0, 3.0]);
        assert_eq!(ctx.overlap.window.len(), 16);
    }

    #[test]
    fn flush_and_evict_removes_stream() {
        let manager = StreamStateManager::new();
        let context = manager.resolve("a").unwrap();
        {
            let mut ctx = context.lock().unwrap();
            ctx.observe(100.0, &SampleBuffer::Real(vec![1.0]));
            ctx.bind(plan(4, 16));
        }
        drop(context);

        let flushed = manager.flush_and_evict("a").unwrap().unwrap();
        assert_eq!(flushed.samples.len(), 3);
        assert_eq!(flushed.stream_id, "a");
        assert!(!manager.contains("a").unwrap());
        assert!(manager.flush_and_evict("a").unwrap().is_none());
        assert!(manager.pool.lock().unwrap().available() > 0);
    }

    #[test]
    fn finish_flushes_once() {
        let manager = StreamStateManager::new();
        let context = manager.resolve("a").unwrap();
        let mut ctx = context.lock().unwrap();
        ctx.observe(100.0, &SampleBuffer::Real(vec![1.0]));
        ctx.bind(plan(4, 16));
        assert_eq!(ctx.finish().len(), 3);
        assert!(ctx.is_eos_pending());
        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn unbound_stream_flushes_nothing() {
        let manager = StreamStateManager::new();
        manager.resolve("a").unwrap();
        let flushed = manager.flush_and_evict("a").unwrap().unwrap();
        assert!(flushed.samples.is_empty());
    }

    #[test]
    fn flush_all_discards_everything() {
        let manager = StreamStateManager::new();
        manager.resolve("a").unwrap();
        manager.resolve("b").unwrap();
        assert_eq!(manager.flush_all().unwrap(), 2);
        assert!(manager.is_empty());
        assert!(!manager.evict("a").unwrap());
    }
}
