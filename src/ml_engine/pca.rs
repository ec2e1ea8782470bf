//! Principal component analysis for the bootstrap fit.
//!
//! Builds the 9×9 sample covariance of the normalized batch and hands it to
//! nalgebra's symmetric eigen solver.

use nalgebra::{SMatrix, SymmetricEigen};

use crate::ml_engine::projector::Projector;
use crate::types::{NormalizedVector, NUM_COMPONENTS, NUM_FEATURES};

type Covariance = SMatrix<f64, NUM_FEATURES, NUM_FEATURES>;

/// Fit a 2-component projection to a normalized batch.
///
/// Components are ordered by descending explained variance. Each component's
/// sign is fixed so its largest-magnitude loading is positive, which makes the
/// projection reproducible across runs.
pub fn fit(data: &[NormalizedVector]) -> Projector {
    let eigen = SymmetricEigen::new(covariance(data));
    let eigenvalues = &eigen.eigenvalues;

    let mut order: Vec<usize> = (0..NUM_FEATURES).collect();
    // Stable sort keeps index order for equal eigenvalues
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total: f64 = eigenvalues.iter().map(|l| l.max(0.0)).sum();
    let mut components = [[0.0; NUM_FEATURES]; NUM_COMPONENTS];
    let mut explained_variance = [0.0; NUM_COMPONENTS];
    let mut explained_variance_ratio = [0.0; NUM_COMPONENTS];

    for (c, &idx) in order.iter().take(NUM_COMPONENTS).enumerate() {
        let mut loadings = [0.0; NUM_FEATURES];
        for (slot, w) in loadings.iter_mut().zip(eigen.eigenvectors.column(idx).iter()) {
            *slot = *w;
        }
        orient(&mut loadings);

        let lambda = eigenvalues[idx].max(0.0);
        components[c] = loadings;
        explained_variance[c] = lambda;
        explained_variance_ratio[c] = if total > 0.0 { lambda / total } else { 0.0 };
    }

    Projector::new(components, explained_variance, explained_variance_ratio)
}

/// Sample covariance (n - 1 denominator; n for a single row).
fn covariance(data: &[NormalizedVector]) -> Covariance {
    let mut cov = Covariance::zeros();
    if data.is_empty() {
        return cov;
    }

    let n = data.len() as f64;
    let mut mean = [0.0; NUM_FEATURES];
    for v in data {
        for (m, x) in mean.iter_mut().zip(v.0.iter()) {
            *m += x / n;
        }
    }

    for v in data {
        for i in 0..NUM_FEATURES {
            let di = v.0[i] - mean[i];
            for j in i..NUM_FEATURES {
                cov[(i, j)] += di * (v.0[j] - mean[j]);
            }
        }
    }

    let denom = if data.len() > 1 { n - 1.0 } else { n };
    for i in 0..NUM_FEATURES {
        for j in i..NUM_FEATURES {
            cov[(i, j)] /= denom;
            cov[(j, i)] = cov[(i, j)];
        }
    }
    cov
}

/// Flip a loading vector so its largest-magnitude entry is positive.
fn orient(loadings: &mut [f64; NUM_FEATURES]) {
    let mut pivot = 0;
    for i in 1..NUM_FEATURES {
        if loadings[i].abs() > loadings[pivot].abs() {
            pivot = i;
        }
    }
    if loadings[pivot] < 0.0 {
        for w in loadings.iter_mut() {
            *w = -*w;
        }
    }
}
