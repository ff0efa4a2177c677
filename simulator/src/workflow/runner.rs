use crate::generator::profile::{build_blocks, interleave};
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use fastfilter::math::StatsHelper;
use fastfilter::processing::MaskReport;
use fastfilter::{
    output_channel, ConfigQuery, DataMode, FastFilter, FilterDesigner, MetricsSnapshot,
    OutputBlock, Provenance,
};
use log::info;
use num_complex::Complex32;
use std::collections::BTreeMap;
use tokio::runtime::Builder as TokioBuilder;

/// What the consumer saw on one stream.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub id: String,
    pub blocks: usize,
    pub samples_out: usize,
    pub sri_updates: usize,
    pub mode: DataMode,
    pub sample_rate: f64,
    pub output_rms: f32,
    pub ended: bool,
}

/// Mask check of the taps designed for one sample rate.
#[derive(Debug, Clone)]
pub struct DesignSummary {
    pub sample_rate: f64,
    pub taps: usize,
    pub feasible: bool,
    pub report: MaskReport,
}

pub struct WorkflowResult {
    pub streams: Vec<StreamSummary>,
    pub designs: Vec<DesignSummary>,
    pub metrics: MetricsSnapshot,
    pub query: ConfigQuery,
}

#[derive(Default)]
struct Collected {
    blocks: usize,
    sri_updates: usize,
    mode: Option<DataMode>,
    sample_rate: f64,
    samples: Vec<Complex32>,
    ended: bool,
}

impl Collected {
    fn absorb(&mut self, block: OutputBlock) {
        self.blocks += 1;
        if block.sri_changed {
            self.sri_updates += 1;
        }
        self.mode = Some(block.mode());
        self.sample_rate = block.sri.sample_rate();
        self.ended |= block.eos;
        self.samples.extend(block.samples.to_complex());
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Pushes every configured stream through one filter instance on this
    /// thread while a tokio task drains the output port.
    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let (port, mut receiver) = output_channel(self.config.channel_capacity);
        let filter = FastFilter::with_output(port).context("creating filter")?;
        filter
            .configure(self.config.filter.clone())
            .context("applying filter configuration")?;

        let runtime = TokioBuilder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("creating runtime for output consumer")?;
        let consumer = runtime.spawn(async move {
            let mut collected: BTreeMap<String, Collected> = BTreeMap::new();
            while let Some(block) = receiver.recv().await {
                collected
                    .entry(block.stream_id().to_string())
                    .or_default()
                    .absorb(block);
            }
            collected
        });

        let streams = self
            .config
            .streams
            .iter()
            .map(build_blocks)
            .collect::<anyhow::Result<Vec<_>>>()?;
        for block in interleave(streams) {
            let stream_id = block.stream_id.clone();
            filter
                .push(block)
                .with_context(|| format!("filtering block of stream {}", stream_id))?;
        }
        // Dropping the port ends the consumer loop.
        filter.disconnect().context("closing output port")?;

        let collected = runtime
            .block_on(consumer)
            .context("joining output consumer")?;
        let streams = collected
            .into_iter()
            .map(|(id, c)| StreamSummary {
                id,
                blocks: c.blocks,
                samples_out: c.samples.len(),
                sri_updates: c.sri_updates,
                mode: c.mode.unwrap_or(DataMode::Real),
                sample_rate: c.sample_rate,
                output_rms: StatsHelper::rms_complex(&c.samples),
                ended: c.ended,
            })
            .collect();

        let query = filter.query().context("querying configuration")?;
        let designs = self.check_designs(&filter, &query)?;
        let metrics = filter.metrics();
        info!(
            "workflow finished: {} blocks, {} samples in, {} samples out",
            metrics.blocks, metrics.samples_in, metrics.samples_out
        );

        Ok(WorkflowResult {
            streams,
            designs,
            metrics,
            query,
        })
    }

    fn check_designs(
        &self,
        filter: &FastFilter,
        query: &ConfigQuery,
    ) -> anyhow::Result<Vec<DesignSummary>> {
        if query.provenance != Provenance::AutoDesigned {
            return Ok(Vec::new());
        }
        let mut rates: Vec<f64> = self.config.streams.iter().map(|s| s.sample_rate).collect();
        rates.sort_by(f64::total_cmp);
        rates.dedup();

        let complex = query.filter_complex || query.filter_props.filter_complex;
        rates
            .into_iter()
            .map(|sample_rate| -> anyhow::Result<DesignSummary> {
                let set = filter
                    .designed_taps(sample_rate)
                    .with_context(|| format!("designing for {} Hz", sample_rate))?;
                let report = FilterDesigner::verify(
                    &set.taps.to_complex(),
                    &query.filter_props,
                    sample_rate,
                    complex,
                );
                Ok(DesignSummary {
                    sample_rate,
                    taps: set.len(),
                    feasible: set.feasible,
                    report,
                })
            })
            .collect()
    }
}
