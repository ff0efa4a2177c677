use anyhow::Context;
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline driver for the fastfilter streaming FIR core")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Override the FFT block length
    #[arg(long)]
    fft_size: Option<usize>,
    /// Correlate instead of convolve
    #[arg(long, default_value_t = false)]
    correlate: bool,
    /// Lowpass cutoff in Hz when no workflow file is given
    #[arg(long, default_value_t = 1000.0)]
    cutoff: f64,
    #[arg(long, default_value_t = 10_000.0)]
    sample_rate: f64,
    #[arg(long, default_value_t = 8192)]
    length: usize,
    #[arg(long, default_value_t = 1000)]
    block_size: usize,
    #[arg(long, default_value_t = 2)]
    streams: usize,
    /// Print the final configuration query and metrics as JSON
    #[arg(long, default_value_t = false)]
    query: bool,
    /// Append a one-line summary to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::from_args(
            args.cutoff,
            args.sample_rate,
            args.length,
            args.block_size,
            args.streams,
        ),
    }
    .with_overrides(args.fft_size, args.correlate);

    let result = Runner::new(workflow_config).execute()?;

    for stream in &result.streams {
        println!(
            "stream {} -> blocks {}, samples {}, mode {:?}, rate {} Hz, sri updates {}, rms {:.4}{}",
            stream.id,
            stream.blocks,
            stream.samples_out,
            stream.mode,
            stream.sample_rate,
            stream.sri_updates,
            stream.output_rms,
            if stream.ended { ", ended" } else { "" }
        );
    }
    for design in &result.designs {
        println!(
            "design @ {} Hz -> {} taps{}, passband error {:.5}, stopband gain {:.5} ({})",
            design.sample_rate,
            design.taps,
            if design.feasible { "" } else { " (ceiling)" },
            design.report.passband_error,
            design.report.stopband_gain,
            if design.report.compliant() {
                "compliant"
            } else {
                "out of mask"
            }
        );
    }

    if args.query {
        let json = serde_json::json!({
            "configuration": result.query,
            "metrics": result.metrics,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("serializing query")?
        );
    }

    if let Some(report_path) = args.report {
        let line = format!(
            "fftSize={} version={} provenance={:?} blocks={} samples_in={} samples_out={}\n",
            result.query.fft_size,
            result.query.config_version,
            result.query.provenance,
            result.metrics.blocks,
            result.metrics.samples_in,
            result.metrics.samples_out
        );
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)
            .with_context(|| format!("opening report {}", report_path.display()))?;
        file.write_all(line.as_bytes())?;
    }

    Ok(())
}
