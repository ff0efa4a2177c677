//! Versioned, copy-on-write store for the active filter configuration.
//!
//! Every successful `configure` builds a fresh immutable [`ConfigSnapshot`]
//! and swaps it in. Block transforms clone the current snapshot once and keep
//! it for the whole block, so an update never tears a transform in flight.

use crate::prelude::{FilterError, FilterResult};
use crate::processing::design::{FilterDesigner, FilterProps, TapBounds};
use crate::processing::plan::TransformPlan;
use crate::telemetry::log::LogManager;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub const DEFAULT_FFT_SIZE: usize = 1024;

/// FIR taps, real scalars or complex pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum Taps {
    Real(Vec<f32>),
    Complex(Vec<Complex32>),
}

impl Taps {
    pub fn len(&self) -> usize {
        match self {
            Taps::Real(taps) => taps.len(),
            Taps::Complex(taps) => taps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Taps::Complex(_))
    }

    pub fn to_complex(&self) -> Vec<Complex32> {
        match self {
            Taps::Real(taps) => taps.iter().map(|&t| Complex32::new(t, 0.0)).collect(),
            Taps::Complex(taps) => taps.clone(),
        }
    }

    /// Converts real taps to complex taps with a zero imaginary part.
    pub fn promoted(self) -> Taps {
        match self {
            Taps::Real(_) => Taps::Complex(self.to_complex()),
            complex => complex,
        }
    }
}

/// Where the active taps came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    AutoDesigned,
    ManualReal,
    ManualComplex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMode {
    #[default]
    Convolve,
    Correlate,
}

impl CorrelationMode {
    pub fn from_flag(correlate: bool) -> Self {
        if correlate {
            CorrelationMode::Correlate
        } else {
            CorrelationMode::Convolve
        }
    }
}

/// The taps a plan is built from, with their provenance and mode.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSet {
    pub taps: Taps,
    pub provenance: Provenance,
    pub mode: CorrelationMode,
    /// False when auto-design hit the tap ceiling.
    pub feasible: bool,
    /// Sample rate an auto-designed set was computed for.
    pub designed_for: Option<f64>,
}

impl CoefficientSet {
    pub fn manual(taps: Taps, provenance: Provenance) -> Self {
        Self {
            taps,
            provenance,
            mode: CorrelationMode::Convolve,
            feasible: true,
            designed_for: None,
        }
    }

    pub fn designed(taps: Taps, feasible: bool, sample_rate: f64) -> Self {
        Self {
            taps,
            provenance: Provenance::AutoDesigned,
            mode: CorrelationMode::Convolve,
            feasible,
            designed_for: Some(sample_rate),
        }
    }

    pub fn with_mode(mut self, mode: CorrelationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// One atomic configuration request. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub fft_size: Option<usize>,
    pub filter_complex: Option<bool>,
    pub correlation_mode: Option<bool>,
    pub filter_props: Option<FilterProps>,
    pub real_filter_coefficients: Option<Vec<f32>>,
    pub complex_filter_coefficients: Option<Vec<Complex32>>,
}

impl ConfigUpdate {
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = Some(fft_size);
        self
    }

    pub fn with_filter_complex(mut self, complex: bool) -> Self {
        self.filter_complex = Some(complex);
        self
    }

    pub fn with_correlation(mut self, correlate: bool) -> Self {
        self.correlation_mode = Some(correlate);
        self
    }

    pub fn with_filter_props(mut self, props: FilterProps) -> Self {
        self.filter_props = Some(props);
        self
    }

    pub fn with_real_taps(mut self, taps: Vec<f32>) -> Self {
        self.real_filter_coefficients = Some(taps);
        self
    }

    pub fn with_complex_taps(mut self, taps: Vec<Complex32>) -> Self {
        self.complex_filter_coefficients = Some(taps);
        self
    }

    /// Names of the coefficient sources this update sets.
    pub fn coefficient_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.filter_props.is_some() {
            sources.push("filterProps");
        }
        if self.real_filter_coefficients.is_some() {
            sources.push("realFilterCoefficients");
        }
        if self.complex_filter_coefficients.is_some() {
            sources.push("complexFilterCoefficients");
        }
        sources
    }

    fn validate(&self) -> FilterResult<()> {
        let sources = self.coefficient_sources();
        if sources.len() > 1 {
            return Err(FilterError::ConfigurationConflict(format!(
                "{} cannot be set in the same update",
                sources.join(" and ")
            )));
        }
        if let Some(size) = self.fft_size {
            if size == 0 || !size.is_power_of_two() {
                return Err(FilterError::InvalidConfiguration(format!(
                    "fftSize must be a non-zero power of two, got {}",
                    size
                )));
            }
        }
        if let Some(taps) = &self.real_filter_coefficients {
            check_taps("realFilterCoefficients", taps.len(), taps.iter().all(|t| t.is_finite()))?;
        }
        if let Some(taps) = &self.complex_filter_coefficients {
            check_taps(
                "complexFilterCoefficients",
                taps.len(),
                taps.iter().all(|t| t.re.is_finite() && t.im.is_finite()),
            )?;
        }
        Ok(())
    }
}

fn check_taps(name: &str, len: usize, finite: bool) -> FilterResult<()> {
    if len == 0 {
        return Err(FilterError::InvalidConfiguration(format!("{} is empty", name)));
    }
    if !finite {
        return Err(FilterError::InvalidConfiguration(format!(
            "{} contains non-finite values",
            name
        )));
    }
    Ok(())
}

/// Effective value of every configurable field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigQuery {
    pub fft_size: usize,
    pub filter_complex: bool,
    pub correlation_mode: bool,
    pub filter_props: FilterProps,
    pub real_filter_coefficients: Vec<f32>,
    pub complex_filter_coefficients: Vec<Complex32>,
    pub provenance: Provenance,
    pub config_version: u64,
}

#[derive(Debug, Clone)]
struct Settings {
    fft_size: usize,
    filter_complex: bool,
    correlation: CorrelationMode,
    filter_props: FilterProps,
    real_taps: Vec<f32>,
    complex_taps: Vec<Complex32>,
    provenance: Provenance,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            filter_complex: false,
            correlation: CorrelationMode::Convolve,
            filter_props: FilterProps::default(),
            real_taps: vec![1.0],
            complex_taps: Vec::new(),
            provenance: Provenance::ManualReal,
        }
    }
}

impl Settings {
    fn apply(&mut self, update: ConfigUpdate) {
        if let Some(size) = update.fft_size {
            self.fft_size = size;
        }
        if let Some(complex) = update.filter_complex {
            self.filter_complex = complex;
        }
        if let Some(correlate) = update.correlation_mode {
            self.correlation = CorrelationMode::from_flag(correlate);
        }
        if let Some(props) = update.filter_props {
            self.filter_props = props;
            self.provenance = Provenance::AutoDesigned;
        }
        if let Some(taps) = update.real_filter_coefficients {
            self.real_taps = taps;
            self.provenance = Provenance::ManualReal;
        }
        if let Some(taps) = update.complex_filter_coefficients {
            self.complex_taps = taps;
            self.provenance = Provenance::ManualComplex;
        }
    }

    fn design_complex(&self) -> bool {
        self.filter_complex || self.filter_props.filter_complex
    }

    fn manual_set(&self) -> Option<CoefficientSet> {
        let set = match self.provenance {
            Provenance::AutoDesigned => return None,
            Provenance::ManualReal => {
                let taps = Taps::Real(self.real_taps.clone());
                let taps = if self.filter_complex {
                    taps.promoted()
                } else {
                    taps
                };
                CoefficientSet::manual(taps, Provenance::ManualReal)
            }
            Provenance::ManualComplex => CoefficientSet::manual(
                Taps::Complex(self.complex_taps.clone()),
                Provenance::ManualComplex,
            ),
        };
        Some(set.with_mode(self.correlation))
    }
}

/// Result of looking up the plan for a sample rate.
pub struct PlanLookup {
    pub plan: Arc<TransformPlan>,
    /// True when the taps were auto-designed by this lookup.
    pub fresh_design: bool,
}

/// Immutable view of one configuration version.
pub struct ConfigSnapshot {
    version: u64,
    settings: Settings,
    fft_size: usize,
    manual_plan: Option<Arc<TransformPlan>>,
    designs: Mutex<HashMap<u64, Arc<TransformPlan>>>,
}

impl ConfigSnapshot {
    fn build(version: u64, settings: Settings, logger: &LogManager) -> FilterResult<Self> {
        let (fft_size, manual_plan) = match settings.manual_set() {
            Some(set) => {
                let fft_size = TransformPlan::required_fft_size(settings.fft_size, set.len());
                if fft_size != settings.fft_size {
                    logger.warn(&format!(
                        "{} taps exceed fftSize {}; using block length {}",
                        set.len(),
                        settings.fft_size,
                        fft_size
                    ));
                }
                let plan = TransformPlan::build(set, fft_size, version)?;
                (fft_size, Some(Arc::new(plan)))
            }
            None => (settings.fft_size, None),
        };
        Ok(Self {
            version,
            settings,
            fft_size,
            manual_plan,
            designs: Mutex::new(HashMap::new()),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Effective block length.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn provenance(&self) -> Provenance {
        self.settings.provenance
    }

    /// Plan to apply to a stream running at `sample_rate`. Manual taps ignore
    /// the rate; auto-designed taps are designed once per rate and cached for
    /// the lifetime of this snapshot.
    pub fn plan_for(&self, sample_rate: f64) -> FilterResult<PlanLookup> {
        if let Some(plan) = &self.manual_plan {
            return Ok(PlanLookup {
                plan: plan.clone(),
                fresh_design: false,
            });
        }

        let mut designs = self.designs.lock()?;
        if let Some(plan) = designs.get(&sample_rate.to_bits()) {
            return Ok(PlanLookup {
                plan: plan.clone(),
                fresh_design: false,
            });
        }
        let set = FilterDesigner::design(
            &self.settings.filter_props,
            self.settings.design_complex(),
            sample_rate,
            TapBounds::for_fft_size(self.fft_size),
        )
        .with_mode(self.settings.correlation);
        let plan = Arc::new(TransformPlan::build(set, self.fft_size, self.version)?);
        designs.insert(sample_rate.to_bits(), plan.clone());
        Ok(PlanLookup {
            plan,
            fresh_design: true,
        })
    }

    pub fn query(&self) -> ConfigQuery {
        ConfigQuery {
            fft_size: self.fft_size,
            filter_complex: self.settings.filter_complex,
            correlation_mode: self.settings.correlation == CorrelationMode::Correlate,
            filter_props: self.settings.filter_props.clone(),
            real_filter_coefficients: self.settings.real_taps.clone(),
            complex_filter_coefficients: self.settings.complex_taps.clone(),
            provenance: self.settings.provenance,
            config_version: self.version,
        }
    }
}

/// Holds the current [`ConfigSnapshot`] and serialises updates to it.
pub struct CoefficientStore {
    current: RwLock<Arc<ConfigSnapshot>>,
    writer: Mutex<()>,
    logger: LogManager,
}

impl CoefficientStore {
    pub fn new() -> FilterResult<Self> {
        let logger = LogManager::for_component("coefficients");
        let initial = ConfigSnapshot::build(0, Settings::default(), &logger)?;
        Ok(Self {
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
            logger,
        })
    }

    pub fn snapshot(&self) -> FilterResult<Arc<ConfigSnapshot>> {
        Ok(self.current.read()?.clone())
    }

    /// Applies `update` atomically and returns the new configuration version.
    /// On any error the previous configuration stays active.
    pub fn configure(&self, update: ConfigUpdate) -> FilterResult<u64> {
        let _writer = self.writer.lock()?;
        update.validate()?;

        let current = self.snapshot()?;
        let mut settings = current.settings.clone();
        settings.apply(update);
        let next = ConfigSnapshot::build(current.version + 1, settings, &self.logger)?;
        let version = next.version;
        let provenance = next.settings.provenance;
        *self.current.write()? = Arc::new(next);

        self.logger.record(&format!(
            "configuration version {} active ({:?})",
            version, provenance
        ));
        Ok(version)
    }

    pub fn query(&self) -> FilterResult<ConfigQuery> {
        Ok(self.snapshot()?.query())
    }
}
