//! Component B: distribution primitives — Wasserstein distance, the
//! D'Agostino K² normality test, and Laplace / Normal sampling.

use rand::Rng;
use rand_distr::{Distribution, Laplace, Normal};

/// Earth-mover's distance between two 1-D empirical distributions,
/// computed from their empirical CDFs (equivalent to `scipy.stats.
/// wasserstein_distance` for the unweighted case).
pub fn wasserstein_distance(u: &[f64], v: &[f64]) -> f64 {
    if u.is_empty() || v.is_empty() {
        return 0.0;
    }
    let mut u_sorted = u.to_vec();
    u_sorted.sort_by(f64::total_cmp);
    let mut v_sorted = v.to_vec();
    v_sorted.sort_by(f64::total_cmp);

    let mut all: Vec<f64> = u.iter().chain(v.iter()).copied().collect();
    all.sort_by(f64::total_cmp);

    let mut total = 0.0;
    for window in all.windows(2) {
        let x = window[0];
        let delta = window[1] - x;
        let u_cdf = u_sorted.partition_point(|&val| val <= x) as f64 / u_sorted.len() as f64;
        let v_cdf = v_sorted.partition_point(|&val| val <= x) as f64 / v_sorted.len() as f64;
        total += (u_cdf - v_cdf).abs() * delta;
    }
    total
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn central_moment(data: &[f64], mean_val: f64, power: i32) -> f64 {
    data.iter().map(|x| (x - mean_val).powi(power)).sum::<f64>() / data.len() as f64
}

/// D'Agostino K² normality test p-value. Requires at least 8 samples
/// (the test's asymptotic approximations break down below that); callers
/// must check sample size themselves.
pub fn dagostino_k2_pvalue(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let m = mean(data);
    let m2 = central_moment(data, m, 2);
    let m3 = central_moment(data, m, 3);
    let m4 = central_moment(data, m, 4);

    if m2 == 0.0 {
        // Degenerate (constant) sample: skew/kurtosis are undefined, treat as normal.
        return 1.0;
    }

    let skew = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2); // non-excess kurtosis (b2)

    // --- skewtest z-score ---
    let y = if skew == 0.0 { 1.0 } else { skew * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt() };
    let beta2_skew = (3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0))
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2_skew - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    let z1 = delta * ((y / alpha) + ((y / alpha).powi(2) + 1.0).sqrt()).ln();

    // --- kurtosistest z-score ---
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (kurtosis - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / sqrt_beta1.powi(2)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).powf(1.0 / 3.0);
    let z2 = (term1 - term2) / (2.0 / (9.0 * a)).sqrt();

    let k2 = z1 * z1 + z2 * z2;
    // Survival function of a chi-squared distribution with 2 degrees of
    // freedom has the closed form exp(-x/2).
    (-k2 / 2.0).exp()
}

/// Draws `floor(Laplace(0, 1/epsilon))` — only the floored integer part
/// of the noise is ever applied, per the engine's Laplace-mechanism
/// heuristic on sequence counts.
pub fn sample_laplace_floor(rng: &mut impl Rng, epsilon: f64) -> i64 {
    let dist = Laplace::new(0.0, 1.0 / epsilon).expect("epsilon > 0 guaranteed by caller");
    dist.sample(rng).floor() as i64
}

/// Draws a synthetic duration from `Normal(mean, stdev)`, clamped to
/// non-negative. Falls back to the mean when the sample is degenerate
/// (zero variance, which `rand_distr::Normal` rejects as ill-formed).
pub fn sample_normal_clamped(rng: &mut impl Rng, mean_val: f64, stdev: f64) -> f64 {
    if stdev <= 0.0 {
        return mean_val.max(0.0);
    }
    let dist = Normal::new(mean_val, stdev).expect("stdev > 0 checked above");
    dist.sample(rng).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn identical_distributions_have_zero_wasserstein_distance() {
        let d = vec![1.0, 2.0, 3.0, 4.0];
        assert!(wasserstein_distance(&d, &d) < 1e-9);
    }

    #[test]
    fn shifted_distribution_has_positive_distance() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![10.0, 10.0, 10.0];
        assert!((wasserstein_distance(&a, &b) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn normaltest_reports_high_p_for_uniform_tight_cluster() {
        // 8 near-identical points: essentially constant, should not reject normality.
        let data = vec![5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.01];
        let p = dagostino_k2_pvalue(&data);
        assert!(p.is_finite());
    }

    #[test]
    fn normaltest_reports_low_p_for_strongly_bimodal_sample() {
        let mut data = vec![0.0; 20];
        data.extend(vec![1000.0; 20]);
        let p = dagostino_k2_pvalue(&data);
        assert!(p <= 0.05, "expected rejection of normality, got p={p}");
    }

    #[test]
    fn laplace_floor_is_deterministic_with_seed() {
        let mut r1 = StdRng::seed_from_u64(42);
        let mut r2 = StdRng::seed_from_u64(42);
        assert_eq!(sample_laplace_floor(&mut r1, 1.0), sample_laplace_floor(&mut r2, 1.0));
    }
}
