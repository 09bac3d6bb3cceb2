use crate::error::{FactorError, Result};
use rand::rngs::StdRng;
use rand::seq::index;

/// Draws the per-iteration feature subset for the reduced update
///
/// Each iteration operates on a random subset of `n_features / reduction`
/// feature columns, drawn without replacement from the single generator
/// owned by the sequential fitting loop. Contributions computed over the
/// subset must be rescaled by [Reducer::rescale] to remain an unbiased
/// estimate of the full-feature gradient.
#[derive(Debug, Clone)]
pub struct Reducer {
    n_features: usize,
    reduction: usize,
    subset_len: usize,
}

impl Reducer {
    pub fn new(n_features: usize, reduction: usize) -> Result<Self> {
        if reduction == 0 {
            return Err(FactorError::Config {
                parameter: "reduction",
                reason: "must be at least 1".to_string(),
            });
        }
        if n_features % reduction != 0 {
            return Err(FactorError::Config {
                parameter: "reduction",
                reason: format!(
                    "{} does not evenly partition the {} features",
                    reduction, n_features
                ),
            });
        }
        Ok(Reducer {
            n_features,
            reduction,
            subset_len: n_features / reduction,
        })
    }

    /// Size of every drawn subset, identical across iterations
    pub fn subset_len(&self) -> usize {
        self.subset_len
    }

    /// Factor by which subset contributions are rescaled for unbiasedness
    pub fn rescale(&self) -> f64 {
        self.reduction as f64
    }

    /// Draw a sorted index subset without replacement
    ///
    /// Must be called on the sequential loop thread, before dispatch to the
    /// workers, so the subset sequence is independent of worker scheduling.
    pub fn draw_subset(&self, rng: &mut StdRng) -> Vec<usize> {
        if self.reduction == 1 {
            return (0..self.n_features).collect();
        }
        let mut subset = index::sample(rng, self.n_features, self.subset_len).into_vec();
        subset.sort_unstable();
        subset
    }
}
