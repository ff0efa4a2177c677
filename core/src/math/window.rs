const MAX_SERIES_TERMS: u32 = 500;

/// Modified Bessel function of the first kind, order zero. Non-finite
/// arguments return a non-finite value instead of iterating.
pub fn bessel_i0(x: f64) -> f64 {
    let half_x_sq = (x / 2.0) * (x / 2.0);
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..=MAX_SERIES_TERMS {
        let k = f64::from(k);
        term *= half_x_sq / (k * k);
        sum += term;
        if !sum.is_finite() || term < 1e-12 * sum {
            break;
        }
    }
    sum
}

/// Kaiser `beta` that reaches `attenuation_db` of stopband attenuation.
pub fn kaiser_beta(attenuation_db: f64) -> f64 {
    if attenuation_db > 50.0 {
        0.1102 * (attenuation_db - 8.7)
    } else if attenuation_db >= 21.0 {
        0.5842 * (attenuation_db - 21.0).powf(0.4) + 0.07886 * (attenuation_db - 21.0)
    } else {
        0.0
    }
}

/// Symmetric Kaiser window of length `len`.
pub fn kaiser(len: usize, beta: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = bessel_i0(beta);
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let ratio = 2.0 * n as f64 / span - 1.0;
            bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / denom
        })
        .collect()
}
