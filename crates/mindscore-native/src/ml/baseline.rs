//! Placeholder model for projects without a real scorer

use serde::{Deserialize, Serialize};

/// Model that ignores its input and always returns the same prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    /// Returned score
    pub score: f64,
    /// Returned label
    pub label: i32,
    /// Returned probability
    pub probability: f64,
}

impl Default for BaselineModel {
    #[allow(clippy::approx_constant)]
    fn default() -> Self {
        Self {
            score: 3.14,
            label: 1,
            probability: 0.5,
        }
    }
}
