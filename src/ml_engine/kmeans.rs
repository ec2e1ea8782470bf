//! Batch k-means and silhouette scoring for the bootstrap fit.
//!
//! Seeding uses k-means++ drawn from a seeded `StdRng`, repeated `n_init`
//! times; the run with the lowest inertia wins. Everything is deterministic
//! for a given seed.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::NUM_COMPONENTS;

/// A point in the projected plane.
pub type Point = [f64; NUM_COMPONENTS];

/// Batch k-means configuration.
#[derive(Debug, Clone, Copy)]
pub struct KMeansConfig {
    /// Lloyd iteration cap per run.
    pub max_iterations: usize,
    /// Number of k-means++ restarts; the lowest-inertia run is kept.
    pub n_init: usize,
    /// Stop a run once no centroid moves more than this (squared distance).
    pub tolerance: f64,
    /// Seed for k-means++ sampling.
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            n_init: 10,
            tolerance: 1e-8,
            seed: 42,
        }
    }
}

/// Outcome of a batch k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub centroids: Vec<Point>,
    pub labels: Vec<usize>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub iterations: usize,
}

/// Squared Euclidean distance.
pub fn sq_dist(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest centroid, lowest index on ties.
pub fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best_k = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best_dist {
            best_dist = d;
            best_k = i;
        }
    }
    (best_k, best_dist)
}

/// Partition `points` into `k` clusters.
///
/// Returns `None` when `k` is 0 or exceeds the number of points.
pub fn fit(points: &[Point], k: usize, config: &KMeansConfig) -> Option<KMeansResult> {
    if k == 0 || k > points.len() {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansResult> = None;

    for _ in 0..config.n_init.max(1) {
        let seeds = init_plus_plus(points, k, &mut rng);
        let run = lloyd(points, seeds, config);
        let better = best.as_ref().map_or(true, |b| run.inertia < b.inertia);
        if better {
            best = Some(run);
        }
    }

    best
}

/// k-means++ seeding: each new seed is drawn with probability proportional
/// to its squared distance from the nearest seed chosen so far.
fn init_plus_plus(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut seeds = Vec::with_capacity(k);
    seeds.push(points[rng.gen_range(0..points.len())]);

    let mut d2: Vec<f64> = points.iter().map(|p| sq_dist(p, &seeds[0])).collect();

    while seeds.len() < k {
        // All-zero weights (every point sits on a seed) fall back to uniform
        let idx = match WeightedIndex::new(&d2) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..points.len()),
        };
        let seed = points[idx];
        seeds.push(seed);
        for (d, p) in d2.iter_mut().zip(points.iter()) {
            *d = d.min(sq_dist(p, &seed));
        }
    }

    seeds
}

/// Lloyd iterations from the given seeds. An empty cluster keeps its
/// previous centroid.
fn lloyd(points: &[Point], mut centroids: Vec<Point>, config: &KMeansConfig) -> KMeansResult {
    let k = centroids.len();
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for iter in 0..config.max_iterations.max(1) {
        iterations = iter + 1;

        for (label, p) in labels.iter_mut().zip(points.iter()) {
            *label = nearest(p, &centroids).0;
        }

        let mut sums = vec![[0.0; NUM_COMPONENTS]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(labels.iter()) {
            counts[label] += 1;
            for d in 0..NUM_COMPONENTS {
                sums[label][d] += p[d];
            }
        }

        let mut max_shift = 0.0_f64;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let mut updated = [0.0; NUM_COMPONENTS];
            for d in 0..NUM_COMPONENTS {
                updated[d] = sums[c][d] / counts[c] as f64;
            }
            max_shift = max_shift.max(sq_dist(&updated, &centroids[c]));
            centroids[c] = updated;
        }

        if max_shift <= config.tolerance {
            break;
        }
    }

    // Final labels against the final centroids
    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points.iter()) {
        let (idx, d) = nearest(p, &centroids);
        *label = idx;
        inertia += d;
    }

    KMeansResult {
        centroids,
        labels,
        inertia,
        iterations,
    }
}

/// Mean silhouette coefficient over all points.
///
/// For each point, `a` is the mean distance to the rest of its own cluster
/// and `b` the smallest mean distance to any other non-empty cluster;
/// `s = (b - a) / max(a, b)`. Points in singleton clusters score 0, as do
/// points with `a = b = 0`. Returns `None` when fewer than two clusters are
/// populated, since the score is undefined there.
pub fn silhouette(points: &[Point], labels: &[usize], k: usize) -> Option<f64> {
    if points.is_empty() || points.len() != labels.len() {
        return None;
    }

    let mut sizes = vec![0usize; k];
    for &l in labels {
        if l >= k {
            return None;
        }
        sizes[l] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return None;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0; k];

    for (i, p) in points.iter().enumerate() {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        sums.iter_mut().for_each(|s| *s = 0.0);
        for (j, q) in points.iter().enumerate() {
            if i != j {
                sums[labels[j]] += sq_dist(p, q).sqrt();
            }
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Some(total / points.len() as f64)
}
