use crate::algorithms::{DictionaryLearner, Transform};
use crate::error::{FactorError, Result};
use crate::routines::cache::{CacheKey, ProjectionCache};
use crate::routines::solver::solve_code;
use crate::structs::dictionary::Dictionary;
use crate::structs::loadings::Loadings;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;

/// Read-only, batched projection of samples onto a frozen dictionary
///
/// Every sample is an independent solve against the same dictionary, so the
/// work is embarrassingly parallel over a bounded worker pool; results are
/// concatenated in input order regardless of completion order.
#[derive(Debug)]
pub struct Projector<'a> {
    dictionary: &'a Dictionary,
    alpha: f64,
    batch_size: usize,
    n_jobs: usize,
    cache: Option<&'a ProjectionCache>,
}

impl<'a> Projector<'a> {
    /// Build a projector over an already-frozen dictionary handle
    pub fn new(dictionary: &'a Dictionary, alpha: f64) -> Self {
        Projector {
            dictionary,
            alpha,
            batch_size: 200,
            n_jobs: 1,
            cache: None,
        }
    }

    /// Build a projector from a fitted learner, inheriting its settings
    ///
    /// Fails with [FactorError::NotFitted] unless the learner has frozen its
    /// dictionary.
    pub fn from_learner(learner: &'a DictionaryLearner) -> Result<Self> {
        let dictionary = learner.dictionary()?;
        let config = &learner.settings().config;
        Ok(Projector {
            dictionary,
            alpha: config.alpha,
            batch_size: config.batch_size,
            n_jobs: config.n_jobs,
            cache: None,
        })
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs.max(1);
        self
    }

    /// Attach an injectable memoization service; hits skip the solve phase
    pub fn with_cache(mut self, cache: &'a ProjectionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Encode `samples` against the dictionary, yielding one loading row per
    /// sample in input order
    pub fn project(
        &self,
        samples: ArrayView2<'_, f64>,
        masks: Option<ArrayView2<'_, bool>>,
    ) -> Result<Loadings> {
        self.dictionary.check_width(samples.ncols(), "samples")?;
        if let Some(masks) = masks {
            if masks.dim() != samples.dim() {
                return Err(FactorError::DimensionMismatch {
                    expected: samples.ncols(),
                    found: masks.ncols(),
                    context: "mask matrix".to_string(),
                });
            }
        }

        // The cache key covers the dictionary, sample and alpha bits;
        // masked batches are never memoized.
        let key = match (self.cache, masks) {
            (Some(_), None) => Some(CacheKey::for_projection(
                self.dictionary,
                samples,
                self.alpha,
            )),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (self.cache, key.as_ref()) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!("Projection cache hit for {} samples", samples.nrows());
                return Ok(Loadings::from(hit));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()
            .map_err(|e| FactorError::Config {
                parameter: "n_jobs",
                reason: e.to_string(),
            })?;

        let n_samples = samples.nrows();
        let mut loadings = Array2::zeros((n_samples, self.dictionary.n_components()));

        let indices: Vec<usize> = (0..n_samples).collect();
        for chunk in indices.chunks(self.batch_size) {
            let codes: Result<Vec<Array1<f64>>> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|&i| {
                        let row_mask = masks.map(|m| m.index_axis_move(Axis(0), i));
                        solve_code(samples.row(i), row_mask, self.dictionary, self.alpha)
                    })
                    .collect()
            });
            for (&i, code) in chunk.iter().zip(codes?.iter()) {
                loadings.index_axis_mut(Axis(0), i).assign(code);
            }
        }

        if let (Some(cache), Some(key)) = (self.cache, key) {
            cache.insert(key, loadings.clone());
        }

        Ok(Loadings::from(loadings))
    }
}

impl Transform for Projector<'_> {
    type Output = Loadings;

    fn transform(
        &self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
    ) -> Result<Loadings> {
        self.project(data, mask)
    }
}
