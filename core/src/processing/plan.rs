use crate::math::FftHelper;
use crate::prelude::{DataMode, FilterError, FilterResult};
use crate::processing::coefficients::{CoefficientSet, CorrelationMode};
use num_complex::Complex32;
use std::fmt;

/// Arithmetic path for one (taps, data) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPath {
    RealReal,
    RealTapsComplexData,
    ComplexTapsRealData,
    ComplexComplex,
}

impl FilterPath {
    pub fn resolve(taps_complex: bool, data: DataMode) -> Self {
        match (taps_complex, data.is_complex()) {
            (false, false) => FilterPath::RealReal,
            (false, true) => FilterPath::RealTapsComplexData,
            (true, false) => FilterPath::ComplexTapsRealData,
            (true, true) => FilterPath::ComplexComplex,
        }
    }
}

/// Immutable overlap-save plan: block length, kernel spectrum and the FFT
/// plans sized for it. Shared by every stream bound to the same configuration.
pub struct TransformPlan {
    version: u64,
    fft_size: usize,
    coefficients: CoefficientSet,
    spectrum: Vec<Complex32>,
    fft: FftHelper,
}

impl TransformPlan {
    /// Block length needed to hold `taps` taps: the requested size, or the
    /// next power of two at or above twice the tap count when that is larger.
    pub fn required_fft_size(requested: usize, taps: usize) -> usize {
        if taps <= requested {
            requested
        } else {
            (2 * taps).next_power_of_two()
        }
    }

    pub fn build(
        coefficients: CoefficientSet,
        fft_size: usize,
        version: u64,
    ) -> FilterResult<Self> {
        let taps = coefficients.len();
        if taps == 0 {
            return Err(FilterError::InvalidConfiguration(
                "filter has no taps".to_string(),
            ));
        }
        if taps > fft_size {
            return Err(FilterError::Internal(format!(
                "{} taps do not fit block length {}",
                taps, fft_size
            )));
        }

        let mut kernel = coefficients.taps.to_complex();
        if coefficients.mode == CorrelationMode::Correlate {
            kernel.reverse();
            for tap in kernel.iter_mut() {
                *tap = tap.conj();
            }
        }
        let fft = FftHelper::new(fft_size);
        let spectrum = fft.forward(&kernel);

        Ok(Self {
            version,
            fft_size,
            coefficients,
            spectrum,
            fft,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn tap_count(&self) -> usize {
        self.coefficients.len()
    }

    /// Samples carried between blocks, N-1.
    pub fn overlap(&self) -> usize {
        self.tap_count() - 1
    }

    /// Fresh output samples per transform, M-N+1.
    pub fn valid_len(&self) -> usize {
        self.fft_size - self.overlap()
    }

    pub fn taps_complex(&self) -> bool {
        self.coefficients.taps.is_complex()
    }

    pub fn coefficients(&self) -> &CoefficientSet {
        &self.coefficients
    }

    pub fn spectrum(&self) -> &[Complex32] {
        &self.spectrum
    }

    pub fn fft(&self) -> &FftHelper {
        &self.fft
    }
}

impl fmt::Debug for TransformPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformPlan")
            .field("version", &self.version)
            .field("fft_size", &self.fft_size)
            .field("taps", &self.tap_count())
            .field("provenance", &self.coefficients.provenance)
            .field("mode", &self.coefficients.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::coefficients::{Provenance, Taps};

    fn set(taps: Vec<f32>) -> CoefficientSet {
        CoefficientSet::manual(Taps::Real(taps), Provenance::ManualReal)
    }

    #[test]
    fn path_table() {
        assert_eq!(FilterPath::resolve(false, DataMode::Real), FilterPath::RealReal);
        assert_eq!(
            FilterPath::resolve(false, DataMode::Complex),
            FilterPath::RealTapsComplexData
        );
        assert_eq!(
            FilterPath::resolve(true, DataMode::Real),
            FilterPath::ComplexTapsRealData
        );
        assert_eq!(
            FilterPath::resolve(true, DataMode::Complex),
            FilterPath::ComplexComplex
        );
    }

    #[test]
    fn plan_geometry() {
        let plan = TransformPlan::build(set(vec![0.25; 5]), 16, 3).unwrap();
        assert_eq!(plan.overlap(), 4);
        assert_eq!(plan.valid_len(), 12);
        assert_eq!(plan.spectrum().len(), 16);
        assert_eq!(plan.version(), 3);
        assert!(!plan.taps_complex());
    }

    #[test]
    fn correlation_kernel_is_reversed_conjugate() {
        let taps = vec![Complex32::new(1.0, 1.0), Complex32::new(2.0, 0.0)];
        let coefficients =
            CoefficientSet::manual(Taps::Complex(taps), Provenance::ManualComplex)
                .with_mode(CorrelationMode::Correlate);
        let plan = TransformPlan::build(coefficients, 4, 0).unwrap();
        let expected = FftHelper::new(4)
            .forward(&[Complex32::new(2.0, 0.0), Complex32::new(1.0, -1.0)]);
        for (lhs, rhs) in plan.spectrum().iter().zip(&expected) {
            assert!((lhs - rhs).norm() < 1e-6);
        }
    }

    #[test]
    fn oversized_taps_are_rejected() {
        assert!(TransformPlan::build(set(vec![1.0; 9]), 8, 0).is_err());
        assert_eq!(TransformPlan::required_fft_size(8, 9), 32);
        assert_eq!(TransformPlan::required_fft_size(1024, 65), 1024);
    }
}
