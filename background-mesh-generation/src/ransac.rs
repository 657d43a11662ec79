//! Generic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac`] with a slice of
//! data and some [`RansacOptions`]. Failure to reach consensus is reported
//! through [`RansacResult::success`], never by panicking.
//!
//! Hypotheses are scored by inlier count (ties broken by inlier RMS) with
//! a data-parallel pass over the input; the inlier index list is only
//! materialised for the winning model.

use crate::progress::progress_bar;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct RansacOptions {
    /// Hard cap on hypotheses drawn.
    pub max_iters: usize,
    /// Inlier residual threshold.
    pub thresh: f64,
    pub min_inliers: usize,
    /// Desired confidence in `[0, 1]`. Values `>= 1` disable early termination.
    pub confidence: f64,
    pub seed: u64,
    /// Points drawn per hypothesis; `None` uses the estimator minimum.
    pub sample_size: Option<usize>,
    /// Refit the winning consensus set once all iterations are done.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            thresh: 0.01,
            min_inliers: 3,
            confidence: 1.0,
            seed: 1_234_567,
            sample_size: None,
            refit_on_inliers: true,
        }
    }
}

/// Check [`success`](Self::success) before using the model.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub success: bool,
    pub model: Option<M>,
    /// Indices of inlier data points, ascending.
    pub inliers: Vec<usize>,
    /// Root-mean-square residual over inliers.
    pub inlier_rms: f64,
    /// Iterations actually performed.
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            success: false,
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

/// Geometric model estimator driven by [`ransac`].
pub trait Estimator {
    type Datum: Sync;
    type Model: Sync;

    /// Minimal number of samples needed to estimate a model.
    const MIN_SAMPLES: usize;

    /// Fit a model from a subset of data indices; `None` if fitting fails.
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual in the same units as `RansacOptions::thresh`.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }

    /// Optional refit on the full inlier set.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

/// Inlier count and RMS residual of a model.
fn score<E: Estimator>(data: &[E::Datum], model: &E::Model, thresh: f64) -> (usize, f64) {
    let (count, sum_sq) = data
        .par_iter()
        .map(|datum| E::residual(model, datum))
        .filter(|&r| r <= thresh)
        .fold(|| (0usize, 0.0f64), |(n, ss), r| (n + 1, ss + r * r))
        .reduce(|| (0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    let rms = if count == 0 {
        f64::INFINITY
    } else {
        (sum_sq / count as f64).sqrt()
    };
    (count, rms)
}

fn collect_inliers<E: Estimator>(data: &[E::Datum], model: &E::Model, thresh: f64) -> Vec<usize> {
    data.par_iter()
        .enumerate()
        .filter(|(_, datum)| E::residual(model, datum) <= thresh)
        .map(|(i, _)| i)
        .collect()
}

/// Dynamic iteration bound from the current inlier ratio.
fn calculate_iterations(
    confidence: f64,
    inlier_ratio: f64,
    sample_size: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || confidence >= 1.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }

    let w = inlier_ratio;
    let m = sample_size as f64;

    let denom = (1.0 - w.powf(m)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }

    let n_iter = ((1.0 - confidence).ln() / denom).ceil() as usize;
    n_iter.clamp(iters_so_far, max_iters)
}

fn is_better_model(
    has_current_best: bool,
    new_inlier_count: usize,
    new_inlier_rms: f64,
    best_inlier_count: usize,
    best_inlier_rms: f64,
) -> bool {
    !has_current_best
        || (new_inlier_count > best_inlier_count)
        || (new_inlier_count == best_inlier_count && new_inlier_rms < best_inlier_rms)
}

/// Run RANSAC for a given [`Estimator`].
///
/// Returns an unsuccessful result when there is too little data or no
/// hypothesis gathers `min_inliers` within the iteration budget.
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best: RansacResult<E::Model> = RansacResult::default();
    let sample_size = opts.sample_size.unwrap_or(E::MIN_SAMPLES).max(E::MIN_SAMPLES);

    if data.len() < sample_size {
        return best;
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut dynamic_max_iters = opts.max_iters;
    let mut best_count = 0usize;

    let pb = progress_bar(opts.max_iters as u64, "iterations", "Fitting plane");

    let mut num_iters = 0;
    while num_iters < dynamic_max_iters {
        num_iters += 1;
        pb.inc(1);

        let sample_idxs = index::sample(&mut rng, data.len(), sample_size).into_vec();

        if E::is_degenerate(data, &sample_idxs) {
            continue;
        }

        let Some(model) = E::fit(data, &sample_idxs) else {
            continue;
        };

        let (count, rms) = score::<E>(data, &model, opts.thresh);
        if count < opts.min_inliers {
            continue;
        }

        if is_better_model(best.success, count, rms, best_count, best.inlier_rms) {
            best.success = true;
            best.model = Some(model);
            best.inlier_rms = rms;
            best_count = count;
        }

        dynamic_max_iters = calculate_iterations(
            opts.confidence,
            best_count as f64 / data.len() as f64,
            sample_size,
            num_iters,
            opts.max_iters,
        );
    }
    pb.finish_with_message(format!("{} hypotheses", num_iters));
    best.iters = num_iters;

    let Some(model) = best.model.take() else {
        return best;
    };
    let mut model = model;
    let mut inliers = collect_inliers::<E>(data, &model, opts.thresh);

    if opts.refit_on_inliers {
        if let Some(refined) = E::refit(data, &inliers) {
            let (count, rms) = score::<E>(data, &refined, opts.thresh);
            if count >= opts.min_inliers {
                inliers = collect_inliers::<E>(data, &refined, opts.thresh);
                model = refined;
                best.inlier_rms = rms;
            }
        }
    }

    best.model = Some(model);
    best.inliers = inliers;
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct LineModel {
        slope: f64,
        intercept: f64,
    }

    struct LineEstimator;

    impl Estimator for LineEstimator {
        type Datum = (f64, f64);
        type Model = LineModel;

        const MIN_SAMPLES: usize = 2;

        fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
            let p0 = data[sample_indices[0]];
            let p1 = data[sample_indices[1]];
            let dx = p1.0 - p0.0;
            let dy = p1.1 - p0.1;
            if dx.abs() < 1e-9 {
                return None;
            }
            let slope = dy / dx;
            let intercept = p0.1 - slope * p0.0;
            Some(LineModel { slope, intercept })
        }

        fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
            let (x, y) = *datum;
            let numer = (model.slope * x - y + model.intercept).abs();
            let denom = (model.slope * model.slope + 1.0).sqrt();
            numer / denom
        }
    }

    fn default_opts() -> RansacOptions {
        RansacOptions {
            max_iters: 500,
            thresh: 0.05,
            min_inliers: 6,
            confidence: 0.99,
            seed: 42,
            sample_size: None,
            refit_on_inliers: false,
        }
    }

    #[test]
    fn ransac_handles_insufficient_data() {
        let data = vec![(0.0, 0.0)];
        let res = ransac::<LineEstimator>(&data, &default_opts());
        assert!(!res.success);
        assert!(res.model.is_none());
        assert!(res.inliers.is_empty());
    }

    #[test]
    fn ransac_recovers_line_with_outliers() {
        let mut data = Vec::new();
        for i in 0..10 {
            let x = i as f64 * 0.5;
            let y = 2.0 * x + 1.0 + (if i % 2 == 0 { 0.01 } else { -0.01 });
            data.push((x, y));
        }
        data.push((5.0, -3.0));
        data.push((6.0, 10.0));
        data.push((7.0, -8.0));

        let opts = RansacOptions {
            confidence: 1.0,
            ..default_opts()
        };
        let res = ransac::<LineEstimator>(&data, &opts);

        assert!(res.success);
        let model = res.model.unwrap();
        assert!((model.slope - 2.0).abs() < 0.05);
        assert!((model.intercept - 1.0).abs() < 0.05);
        assert_eq!(res.inliers, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn full_confidence_runs_whole_budget() {
        let data: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 3.0 * i as f64)).collect();
        let opts = RansacOptions {
            confidence: 1.0,
            max_iters: 37,
            ..default_opts()
        };
        let res = ransac::<LineEstimator>(&data, &opts);

        assert!(res.success);
        assert_eq!(res.iters, 37);
    }

    #[test]
    fn confidence_stops_early_on_clean_data() {
        let data: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 3.0 * i as f64)).collect();
        let res = ransac::<LineEstimator>(&data, &default_opts());

        assert!(res.success);
        assert!(res.iters < 500);
    }

    #[test]
    fn unreachable_consensus_fails() {
        let data = vec![(0.0, 0.0), (1.0, 5.0), (2.0, -3.0), (3.0, 9.0)];
        let opts = RansacOptions {
            min_inliers: 4,
            ..default_opts()
        };
        let res = ransac::<LineEstimator>(&data, &opts);

        assert!(!res.success);
        assert!(res.model.is_none());
    }
}
