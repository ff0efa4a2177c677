//! Windowed FIR design from a frequency-domain band request.
//!
//! The request is turned into a gain mask made of unit-gain bands on
//! the normalised frequency axis. The inverse DTFT of each band is evaluated
//! in closed form around the filter centre and the result is tapered with a
//! Kaiser window whose shape and length follow from the requested ripple and
//! transition width.

use crate::math::fft::{bin_frequencies, FftHelper};
use crate::math::window::{kaiser, kaiser_beta};
use crate::processing::coefficients::{CoefficientSet, Taps};
use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MIN_WINDOW_RIPPLE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

/// Auto-design request (`filterProps`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterProps {
    #[serde(rename = "TransitionWidth")]
    pub transition_width: f64,
    #[serde(rename = "Type")]
    pub filter_type: FilterType,
    #[serde(rename = "Ripple")]
    pub ripple: f64,
    pub freq1: f64,
    pub freq2: f64,
    #[serde(rename = "filterComplex")]
    pub filter_complex: bool,
}

impl Default for FilterProps {
    fn default() -> Self {
        Self {
            transition_width: 800.0,
            filter_type: FilterType::Lowpass,
            ripple: 0.01,
            freq1: 1000.0,
            freq2: 2000.0,
            filter_complex: false,
        }
    }
}

/// Frequency intervals in Hz where a compliant response must pass or stop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandRegions {
    pub passbands: Vec<(f64, f64)>,
    pub stopbands: Vec<(f64, f64)>,
}

impl FilterProps {
    pub fn lowpass(freq1: f64, transition_width: f64, ripple: f64) -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            freq1,
            transition_width,
            ripple,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, filter_type: FilterType) -> Self {
        self.filter_type = filter_type;
        self
    }

    pub fn with_band(mut self, freq1: f64, freq2: f64) -> Self {
        self.freq1 = freq1;
        self.freq2 = freq2;
        self
    }

    pub fn with_complex(mut self, complex: bool) -> Self {
        self.filter_complex = complex;
        self
    }

    fn sorted_band(&self, complex: bool) -> (f64, f64) {
        let (a, b) = if complex {
            (self.freq1, self.freq2)
        } else {
            (self.freq1.abs(), self.freq2.abs())
        };
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Pass/stop regions the response must honour, with `guard` Hz kept
    /// clear on both sides of every band edge.
    pub fn expected_regions(&self, sample_rate: f64, complex: bool, guard: f64) -> BandRegions {
        let nyquist = sample_rate / 2.0;
        let edge = self.freq1.abs();
        let low_band = (-edge + guard, edge - guard);
        let outer = vec![(-nyquist, -edge - guard), (edge + guard, nyquist)];
        match self.filter_type {
            FilterType::Lowpass => BandRegions {
                passbands: vec![low_band],
                stopbands: outer,
            },
            FilterType::Highpass => BandRegions {
                passbands: outer,
                stopbands: vec![low_band],
            },
            FilterType::Bandpass | FilterType::Bandstop => {
                let (fl, fh) = self.sorted_band(complex);
                let (inside, outside) = if complex {
                    (
                        vec![(fl + guard, fh - guard)],
                        vec![(-nyquist, fl - guard), (fh + guard, nyquist)],
                    )
                } else {
                    (
                        vec![(-fh + guard, -fl - guard), (fl + guard, fh - guard)],
                        vec![
                            (-nyquist, -fh - guard),
                            (-fl + guard, fl - guard),
                            (fh + guard, nyquist),
                        ],
                    )
                };
                if self.filter_type == FilterType::Bandpass {
                    BandRegions {
                        passbands: inside,
                        stopbands: outside,
                    }
                } else {
                    BandRegions {
                        passbands: outside,
                        stopbands: inside,
                    }
                }
            }
        }
    }
}

/// Lower and upper bound on the number of designed taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapBounds {
    pub min: usize,
    pub max: usize,
}

impl TapBounds {
    /// Bounds used for a block length of `fft_size`: at least
    /// `max(fft_size/16, 10)` taps and at most `fft_size/2 + 1`.
    pub fn for_fft_size(fft_size: usize) -> Self {
        let max = (fft_size / 2 + 1).max(1);
        let min = (fft_size / 16).max(10).min(max);
        Self { min, max }
    }
}

/// Worst-case deviations of a response measured against a [`BandRegions`] mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskReport {
    pub passband_error: f64,
    pub stopband_gain: f64,
    pub ripple: f64,
}

impl MaskReport {
    pub fn compliant(&self) -> bool {
        self.passband_error < self.ripple && self.stopband_gain < self.ripple
    }
}

pub struct FilterDesigner;

impl FilterDesigner {
    /// Designs taps for `props` at `sample_rate`. Complex taps are produced
    /// when `complex` is set; the returned set is marked infeasible when the
    /// tap count had to be clamped to `bounds.max`.
    pub fn design(
        props: &FilterProps,
        complex: bool,
        sample_rate: f64,
        bounds: TapBounds,
    ) -> CoefficientSet {
        let (len, feasible) = Self::tap_count(props, sample_rate, bounds);
        let attenuation = Self::attenuation_db(Self::window_ripple(props.ripple));
        let window = kaiser(len, kaiser_beta(attenuation));
        let (bands, invert) = Self::mask(props, complex, sample_rate);

        let centre = (len - 1) as f64 / 2.0;
        let response: Vec<Complex64> = window
            .iter()
            .enumerate()
            .map(|(n, &w)| {
                let t = n as f64 - centre;
                let mut h: Complex64 = bands.iter().map(|&(a, b)| band_impulse(a, b, t)).sum();
                if invert {
                    h = -h;
                    if t.abs() < 1e-9 {
                        h += 1.0;
                    }
                }
                h * w
            })
            .collect();

        let taps = if complex {
            Taps::Complex(
                response
                    .iter()
                    .map(|h| Complex32::new(h.re as f32, h.im as f32))
                    .collect(),
            )
        } else {
            Taps::Real(response.iter().map(|h| h.re as f32).collect())
        };
        CoefficientSet::designed(taps, feasible, sample_rate)
    }

    /// Number of taps for `props`, and whether the request fits under
    /// the ceiling. Degenerate requests fall back to the floor.
    pub fn tap_count(props: &FilterProps, sample_rate: f64, bounds: TapBounds) -> (usize, bool) {
        let width_ok = props.transition_width.is_finite() && props.transition_width > 0.0;
        let rate_ok = sample_rate.is_finite() && sample_rate > 0.0;
        let ripple_ok = props.ripple.is_finite() && props.ripple > 0.0;
        if !(width_ok && rate_ok && ripple_ok) {
            return (odd_within(bounds.min, bounds), false);
        }

        let attenuation = Self::attenuation_db(props.ripple);
        let width = 2.0 * PI * props.transition_width / sample_rate;
        let estimate = ((attenuation - 7.95) / (2.285 * width)).ceil() + 1.0;
        // `as` saturates, so absurd estimates land on usize::MAX.
        let needed = if estimate.is_finite() {
            estimate.max(1.0) as usize
        } else {
            usize::MAX
        };
        let feasible = needed <= bounds.max;
        (odd_within(needed.max(bounds.min), bounds), feasible)
    }

    /// Measures `taps` against the regions of `props`, using the transition
    /// width as the guard on every edge.
    pub fn verify(
        taps: &[Complex32],
        props: &FilterProps,
        sample_rate: f64,
        complex: bool,
    ) -> MaskReport {
        let size = (2 * taps.len()).next_power_of_two().max(1024);
        let spectrum = FftHelper::new(size).forward(taps);
        let freqs = bin_frequencies(size, sample_rate);
        let regions = props.expected_regions(sample_rate, complex, props.transition_width);

        let within =
            |f: f64, bands: &[(f64, f64)]| bands.iter().any(|&(lo, hi)| lo <= f && f <= hi);
        let mut report = MaskReport {
            passband_error: 0.0,
            stopband_gain: 0.0,
            ripple: props.ripple,
        };
        for (freq, value) in freqs.iter().zip(&spectrum) {
            let gain = value.norm() as f64;
            if within(*freq, &regions.passbands) {
                report.passband_error = report.passband_error.max((1.0 - gain).abs());
            } else if within(*freq, &regions.stopbands) {
                report.stopband_gain = report.stopband_gain.max(gain);
            }
        }
        report
    }

    fn attenuation_db(ripple: f64) -> f64 {
        -20.0 * ripple.log10()
    }

    /// Ripple the window is shaped for. Zero, negative or vanishing ripples
    /// would push beta past what `bessel_i0` can represent.
    fn window_ripple(ripple: f64) -> f64 {
        if ripple.is_finite() {
            ripple.clamp(MIN_WINDOW_RIPPLE, 1.0)
        } else {
            1.0
        }
    }

    /// Unit-gain bands in cycles/sample and whether the mask is inverted
    /// (all-pass minus the bands).
    fn mask(props: &FilterProps, complex: bool, sample_rate: f64) -> (Vec<(f64, f64)>, bool) {
        let fs = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            1.0
        };
        let norm = |f: f64| (f / fs).clamp(-0.5, 0.5);
        match props.filter_type {
            FilterType::Lowpass | FilterType::Highpass => {
                let cutoff = norm(props.freq1.abs());
                (
                    vec![(-cutoff, cutoff)],
                    props.filter_type == FilterType::Highpass,
                )
            }
            FilterType::Bandpass | FilterType::Bandstop => {
                let (fl, fh) = props.sorted_band(complex);
                let bands = if complex {
                    vec![(norm(fl), norm(fh))]
                } else {
                    vec![(-norm(fh), -norm(fl)), (norm(fl), norm(fh))]
                };
                (bands, props.filter_type == FilterType::Bandstop)
            }
        }
    }
}

/// Inverse DTFT of a unit band `[a, b]` (cycles/sample) at offset `t`.
fn band_impulse(a: f64, b: f64, t: f64) -> Complex64 {
    if t.abs() < 1e-9 {
        return Complex64::new(b - a, 0.0);
    }
    let w = 2.0 * PI * t;
    Complex64::new(
        ((w * b).sin() - (w * a).sin()) / w,
        ((w * a).cos() - (w * b).cos()) / w,
    )
}

/// Clamps into `bounds` and forces an odd length so the filter has an
/// integer group delay.
fn odd_within(len: usize, bounds: TapBounds) -> usize {
    let len = len.clamp(bounds.min.max(1), bounds.max.max(1));
    if len % 2 == 1 {
        len
    } else if len < bounds.max {
        len + 1
    } else {
        len - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::coefficients::Provenance;

    const FS: f64 = 10_000.0;

    fn bounds() -> TapBounds {
        TapBounds::for_fft_size(1024)
    }

    fn check(props: FilterProps, complex: bool) {
        let set = FilterDesigner::design(&props, complex, FS, bounds());
        assert!(set.feasible, "{:?} should be feasible", props);
        assert_eq!(set.taps.is_complex(), complex);
        let report = FilterDesigner::verify(&set.taps.to_complex(), &props, FS, complex);
        assert!(report.compliant(), "{:?} complex={} -> {:?}", props, complex, report);
    }

    #[test]
    fn tap_bounds_follow_block_length() {
        assert_eq!(TapBounds::for_fft_size(1024), TapBounds { min: 64, max: 513 });
        assert_eq!(TapBounds::for_fft_size(64), TapBounds { min: 10, max: 33 });
        assert_eq!(TapBounds::for_fft_size(8), TapBounds { min: 5, max: 5 });
    }

    #[test]
    fn tap_count_grows_with_tighter_requirements() {
        let loose = FilterProps::lowpass(1000.0, 800.0, 0.01);
        let narrow = FilterProps::lowpass(1000.0, 200.0, 0.01);
        let deep = FilterProps::lowpass(1000.0, 200.0, 0.0001);
        let wide = TapBounds { min: 1, max: 4097 };
        let (a, _) = FilterDesigner::tap_count(&loose, FS, wide);
        let (b, _) = FilterDesigner::tap_count(&narrow, FS, wide);
        let (c, _) = FilterDesigner::tap_count(&deep, FS, wide);
        assert!(a < b && b < c, "{} {} {}", a, b, c);
        assert!(a % 2 == 1 && b % 2 == 1 && c % 2 == 1);
    }

    #[test]
    fn designed_real_filter_is_linear_phase() {
        let set = FilterDesigner::design(&FilterProps::default(), false, FS, bounds());
        assert_eq!(set.provenance, Provenance::AutoDesigned);
        let taps = match &set.taps {
            Taps::Real(taps) => taps.clone(),
            Taps::Complex(_) => panic!("expected real taps"),
        };
        let n = taps.len();
        for i in 0..n / 2 {
            assert!((taps[i] - taps[n - 1 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn example_lowpass_meets_mask() {
        let props = FilterProps::lowpass(1000.0, 400.0, 0.01);
        let set = FilterDesigner::design(&props, false, FS, bounds());
        assert_eq!(set.taps.len(), 65);
        check(props, false);
    }

    #[test]
    fn lowpass_with_tight_ripple_meets_mask() {
        check(FilterProps::lowpass(3000.0, 500.0, 0.001), false);
    }

    #[test]
    fn every_type_meets_mask_real_and_complex() {
        for filter_type in [
            FilterType::Lowpass,
            FilterType::Highpass,
            FilterType::Bandpass,
            FilterType::Bandstop,
        ] {
            for complex in [false, true] {
                let props = FilterProps {
                    transition_width: 400.0,
                    ..FilterProps::default()
                }
                .with_type(filter_type);
                check(props, complex);
            }
        }
    }

    #[test]
    fn complex_bands_may_be_negative_reversed_or_straddle_dc() {
        for (f1, f2) in [(-1000.0, -2000.0), (-2000.0, -1000.0), (-1000.0, 2000.0)] {
            let props = FilterProps {
                transition_width: 400.0,
                ..FilterProps::default()
            }
            .with_type(FilterType::Bandpass)
            .with_band(f1, f2);
            check(props, true);
        }
    }

    #[test]
    fn complex_negative_band_rejects_its_mirror_image() {
        let props = FilterProps {
            transition_width: 400.0,
            ..FilterProps::default()
        }
        .with_type(FilterType::Bandpass)
        .with_band(-2000.0, -1000.0);
        let set = FilterDesigner::design(&props, true, FS, bounds());
        let spectrum = FftHelper::new(1024).forward(&set.taps.to_complex());
        let freqs = bin_frequencies(1024, FS);
        let gain_at = |target: f64| {
            let (_, value) = freqs
                .iter()
                .zip(&spectrum)
                .min_by(|a, b| (a.0 - target).abs().total_cmp(&(b.0 - target).abs()))
                .unwrap();
            value.norm()
        };
        assert!((gain_at(-1500.0) - 1.0).abs() < 0.01);
        assert!(gain_at(1500.0) < 0.01);
    }

    #[test]
    fn narrow_transition_is_clamped_and_flagged() {
        let props = FilterProps::lowpass(1000.0, 10.0, 0.01);
        let set = FilterDesigner::design(&props, false, FS, bounds());
        assert!(!set.feasible);
        assert_eq!(set.taps.len(), 513);
    }

    #[test]
    fn degenerate_specs_fall_back_to_floor() {
        for props in [
            FilterProps::lowpass(1000.0, 0.0, 0.01),
            FilterProps::lowpass(1000.0, f64::NAN, 0.01),
            FilterProps::lowpass(1000.0, 9000.0, 0.01),
            FilterProps::lowpass(1000.0, 400.0, 2.0),
            FilterProps::lowpass(1000.0, 400.0, 0.0),
            FilterProps::lowpass(1000.0, 400.0, -0.5),
            FilterProps::lowpass(1000.0, 400.0, f64::NAN),
        ] {
            let set = FilterDesigner::design(&props, false, FS, bounds());
            assert_eq!(set.taps.len(), 65, "{:?}", props);
            assert!(set.taps.to_complex().iter().all(|t| t.re.is_finite()));
        }
        let zero_ripple = FilterProps::lowpass(1000.0, 400.0, 0.0);
        assert!(!FilterDesigner::design(&zero_ripple, true, FS, bounds()).feasible);
    }

    #[test]
    fn vanishing_ripple_still_yields_finite_taps() {
        let props = FilterProps::lowpass(1000.0, 400.0, 1e-300);
        let set = FilterDesigner::design(&props, false, FS, bounds());
        assert!(!set.feasible);
        assert_eq!(set.taps.len(), 513);
        assert!(set.taps.to_complex().iter().all(|t| t.re.is_finite()));
    }

    #[test]
    fn filter_props_use_wire_names() {
        let props: FilterProps = serde_json::from_str(
            r#"{"TransitionWidth":400.0,"Type":"bandstop","Ripple":0.01,"freq1":2000.0,"freq2":1000.0,"filterComplex":true}"#,
        )
        .unwrap();
        assert_eq!(props.filter_type, FilterType::Bandstop);
        assert!(props.filter_complex);
        let defaults: FilterProps = serde_json::from_str(r#"{"Type":"highpass"}"#).unwrap();
        assert_eq!(defaults.transition_width, 800.0);
    }
}
