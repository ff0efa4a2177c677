use crate::generator::profile::StreamConfig;
use anyhow::{ensure, Context};
use fastfilter::{ConfigUpdate, FilterProps};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Offline run description: the filter configuration to apply and the
/// synthetic streams to push through it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub filter: ConfigUpdate,
    /// Output blocks that may queue before the producer blocks.
    pub channel_capacity: usize,
    pub streams: Vec<StreamConfig>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            filter: ConfigUpdate::default().with_filter_props(FilterProps::default()),
            channel_capacity: 8,
            streams: vec![StreamConfig::default()],
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Lowpass at `cutoff` Hz applied to `stream_count` identical real streams.
    pub fn from_args(
        cutoff: f64,
        sample_rate: f64,
        length: usize,
        block_size: usize,
        stream_count: usize,
    ) -> Self {
        let props = FilterProps::lowpass(cutoff, 400.0, 0.01);
        let streams = (0..stream_count.max(1))
            .map(|index| StreamConfig {
                id: format!("stream-{}", index),
                sample_rate,
                length,
                block_size,
                seed: index as u64,
                ..Default::default()
            })
            .collect();
        Self {
            filter: ConfigUpdate::default().with_filter_props(props),
            streams,
            ..Default::default()
        }
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn with_overrides(mut self, fft_size: Option<usize>, correlate: bool) -> Self {
        if let Some(size) = fft_size {
            self.filter.fft_size = Some(size);
        }
        if correlate {
            self.filter.correlation_mode = Some(true);
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.streams.is_empty(), "workflow defines no streams");
        let mut ids: Vec<&str> = self.streams.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ensure!(
            ids.len() == self.streams.len(),
            "workflow stream ids must be unique"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_builds_streams() {
        let cfg = WorkflowConfig::from_args(1500.0, 8000.0, 4096, 512, 3);
        assert_eq!(cfg.streams.len(), 3);
        assert_eq!(cfg.streams[2].id, "stream-2");
        assert_eq!(cfg.filter.filter_props.unwrap().freq1, 1500.0);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"filter:\n  fftSize: 512\n  realFilterCoefficients: [0.25, 0.5, 0.25]\nchannel_capacity: 2\nstreams:\n  - id: rx-a\n    complex: true\n    tones: [-1200.0]\n  - id: rx-b\n    sample_rate: 20000.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.filter.fft_size, Some(512));
        assert_eq!(cfg.filter.real_filter_coefficients.as_ref().unwrap().len(), 3);
        assert!(cfg.filter.filter_props.is_none());
        assert_eq!(cfg.channel_capacity, 2);
        assert!(cfg.streams[0].complex);
        assert_eq!(cfg.streams[1].sample_rate, 20_000.0);
        assert_eq!(cfg.streams[1].block_size, StreamConfig::default().block_size);
    }

    #[test]
    fn duplicate_stream_ids_are_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"streams:\n  - id: x\n  - id: x\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }

    #[test]
    fn overrides_replace_engine_fields() {
        let cfg = WorkflowConfig::default().with_overrides(Some(4096), true);
        assert_eq!(cfg.filter.fft_size, Some(4096));
        assert_eq!(cfg.filter.correlation_mode, Some(true));
    }
}
