//! Fixed linear projection from 9 normalized features to the 2-D
//! clustering plane.

use serde::{Deserialize, Serialize};

use crate::types::{NormalizedVector, ProjectedPoint, NUM_COMPONENTS, NUM_FEATURES};

/// Two principal directions, ordered by descending explained variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projector {
    /// Row `c` holds the loadings of component `c`.
    components: [[f64; NUM_FEATURES]; NUM_COMPONENTS],
    /// Variance captured along each component.
    explained_variance: [f64; NUM_COMPONENTS],
    /// Share of total variance captured along each component.
    explained_variance_ratio: [f64; NUM_COMPONENTS],
}

impl Projector {
    pub fn new(
        components: [[f64; NUM_FEATURES]; NUM_COMPONENTS],
        explained_variance: [f64; NUM_COMPONENTS],
        explained_variance_ratio: [f64; NUM_COMPONENTS],
    ) -> Self {
        Self {
            components,
            explained_variance,
            explained_variance_ratio,
        }
    }

    pub fn project(&self, v: &NormalizedVector) -> ProjectedPoint {
        let mut out = [0.0; NUM_COMPONENTS];
        for (c, loadings) in self.components.iter().enumerate() {
            out[c] = loadings.iter().zip(v.0.iter()).map(|(w, x)| w * x).sum();
        }
        ProjectedPoint::from(out)
    }

    pub fn components(&self) -> &[[f64; NUM_FEATURES]; NUM_COMPONENTS] {
        &self.components
    }

    pub fn explained_variance(&self) -> &[f64; NUM_COMPONENTS] {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> &[f64; NUM_COMPONENTS] {
        &self.explained_variance_ratio
    }

    pub fn is_valid(&self) -> bool {
        self.components.iter().flatten().all(|w| w.is_finite())
            && self.explained_variance.iter().all(|v| v.is_finite())
    }
}
