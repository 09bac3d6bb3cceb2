use crate::algorithms::{Fit, Status};
use crate::error::{FactorError, Result};
use crate::routines::initialization::initial_dictionary;
use crate::routines::output::{EpochLog, EpochRecord, FitReport};
use crate::routines::reduction::Reducer;
use crate::routines::settings::Settings;
use crate::routines::solver::solve_code;
use crate::routines::update::Updater;
use crate::structs::dictionary::Dictionary;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::DeviationExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Orchestrates the streaming factorization loop
///
/// The learner owns the dictionary and the sufficient statistics while the
/// run is in progress. Mini-batches are processed sequentially; within one
/// batch the code solves are dispatched over a bounded worker pool against a
/// dictionary snapshot taken at batch start, and the updater then applies
/// each sample sequentially. The feature subset of every batch is drawn on
/// the main loop thread before dispatch, so the result is bit-identical for
/// any worker count given the same seed and sample order.
#[derive(Debug)]
pub struct DictionaryLearner {
    settings: Settings,
    status: Status,
    dictionary: Option<Dictionary>,
    updater: Option<Updater>,
    reducer: Option<Reducer>,
    warm_start: Option<Array2<f64>>,
    rng: StdRng,
    log: EpochLog,
    epochs_done: usize,
    running_error: Option<f64>,
}

impl DictionaryLearner {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let rng = StdRng::seed_from_u64(settings.config.random_state);
        Ok(DictionaryLearner {
            settings,
            status: Status::Uninitialized,
            dictionary: None,
            updater: None,
            reducer: None,
            warm_start: None,
            rng,
            log: EpochLog::new(),
            epochs_done: 0,
            running_error: None,
        })
    }

    /// Create a learner that starts from an externally supplied dictionary
    /// instead of a random one
    pub fn with_warm_start(settings: Settings, dictionary: Array2<f64>) -> Result<Self> {
        let mut learner = DictionaryLearner::new(settings)?;
        learner.warm_start = Some(dictionary);
        Ok(learner)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Per-epoch diagnostic trace accumulated so far
    pub fn epoch_log(&self) -> &EpochLog {
        &self.log
    }

    /// Exponentially weighted running estimate of the reconstruction error
    ///
    /// Advisory only; it never acts as a stopping criterion.
    pub fn running_error(&self) -> Option<f64> {
        self.running_error
    }

    /// The frozen dictionary; fails with [FactorError::NotFitted] until the
    /// learner reaches the `Fitted` state
    pub fn dictionary(&self) -> Result<&Dictionary> {
        match (self.status, self.dictionary.as_ref()) {
            (Status::Fitted, Some(dictionary)) => Ok(dictionary),
            _ => Err(FactorError::NotFitted),
        }
    }

    /// The most recent valid dictionary state, regardless of status
    ///
    /// After a fatal [FactorError::NonFinite] abort this still exposes the
    /// state from just before the offending batch.
    pub fn last_dictionary(&self) -> Option<&Dictionary> {
        self.dictionary.as_ref()
    }

    /// Consume the learner, yielding the frozen dictionary
    pub fn into_dictionary(self) -> Result<Dictionary> {
        match (self.status, self.dictionary) {
            (Status::Fitted, Some(dictionary)) => Ok(dictionary),
            _ => Err(FactorError::NotFitted),
        }
    }

    /// A projector over the frozen dictionary, configured from the learner's
    /// own settings
    pub fn projector(&self) -> Result<crate::algorithms::Projector<'_>> {
        crate::algorithms::Projector::from_learner(self)
    }

    /// Process a single additional pass over `data`, leaving the learner in
    /// the `Fitting` state
    ///
    /// A `Fitted` learner is reopened for fitting; any projector borrowing
    /// the frozen dictionary must be dropped first. Call [Self::freeze] when
    /// the stream is exhausted.
    pub fn partial_fit(
        &mut self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
    ) -> Result<()> {
        self.check_shapes(data, mask, None)?;
        self.ensure_initialized(data.ncols())?;
        self.status = Status::Fitting;

        let pool = self.build_pool()?;
        let epoch = self.epochs_done + 1;
        let error = self.process_pass(data, mask, None, &pool)?;
        self.record_epoch(epoch, error);
        Ok(())
    }

    /// Freeze the dictionary, transitioning `Fitting → Fitted`
    pub fn freeze(&mut self) -> Result<()> {
        match self.status {
            Status::Fitting | Status::Fitted => {
                self.status = Status::Fitted;
                Ok(())
            }
            Status::Uninitialized => Err(FactorError::NotFitted),
        }
    }

    /// Fit with optional per-sample weights scaling each sample's
    /// contribution to the sufficient statistics
    pub fn fit_weighted(
        &mut self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
        weights: Option<ArrayView1<'_, f64>>,
    ) -> Result<FitReport> {
        self.check_shapes(data, mask, weights)?;
        self.ensure_initialized(data.ncols())?;
        self.status = Status::Fitting;

        let pool = self.build_pool()?;
        let n_epochs = self.settings.config.n_epochs;
        let mut final_error = f64::NAN;

        for epoch_offset in 0..n_epochs {
            let epoch = self.epochs_done + 1;
            let span = tracing::info_span!("", "{}", format!("Epoch {}", epoch));
            let _enter = span.enter();

            let error = self.process_pass(data, mask, weights, &pool)?;
            self.record_epoch(epoch, error);
            final_error = error;

            tracing::info!(
                "Epoch {}/{}: reconstruction error {:.6}",
                epoch_offset + 1,
                n_epochs,
                error
            );
        }

        self.status = Status::Fitted;
        Ok(FitReport {
            status: self.status,
            epochs: self.epochs_done,
            final_error,
            log: self.log.clone(),
        })
    }

    fn check_shapes(
        &self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
        weights: Option<ArrayView1<'_, f64>>,
    ) -> Result<()> {
        if let Some(mask) = mask {
            if mask.dim() != data.dim() {
                return Err(FactorError::DimensionMismatch {
                    expected: data.ncols(),
                    found: mask.ncols(),
                    context: format!(
                        "mask matrix ({}x{} against {}x{} data)",
                        mask.nrows(),
                        mask.ncols(),
                        data.nrows(),
                        data.ncols()
                    ),
                });
            }
        }
        if let Some(weights) = weights {
            if weights.len() != data.nrows() {
                return Err(FactorError::DimensionMismatch {
                    expected: data.nrows(),
                    found: weights.len(),
                    context: "sample weights".to_string(),
                });
            }
        }
        Ok(())
    }

    fn ensure_initialized(&mut self, n_features: usize) -> Result<()> {
        match self.status {
            Status::Uninitialized => {
                let config = &self.settings.config;
                self.reducer = Some(Reducer::new(n_features, config.reduction)?);
                let warm_start = self.warm_start.take();
                self.dictionary = Some(initial_dictionary(
                    &self.settings,
                    n_features,
                    warm_start,
                    &mut self.rng,
                )?);
                self.updater = Some(Updater::new(
                    config.n_components,
                    n_features,
                    config.learning_rate,
                ));
                Ok(())
            }
            _ => match self.dictionary.as_ref() {
                Some(dictionary) => dictionary.check_width(n_features, "resumed data"),
                None => Err(FactorError::NotFitted),
            },
        }
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.config.n_jobs)
            .build()
            .map_err(|e| FactorError::Config {
                parameter: "n_jobs",
                reason: e.to_string(),
            })
    }

    fn record_epoch(&mut self, epoch: usize, error: f64) {
        self.epochs_done = epoch;
        let samples_seen = self
            .updater
            .as_ref()
            .map(|updater| updater.stats().counter())
            .unwrap_or(0);
        let max_row_norm = self
            .dictionary
            .as_ref()
            .map(Dictionary::max_row_norm)
            .unwrap_or(0.0);
        self.log.push(EpochRecord {
            epoch,
            samples_seen,
            reconstruction_error: error,
            max_row_norm,
        });
    }

    /// One pass over the sample stream, returning the mean reconstruction
    /// error of the epoch
    fn process_pass(
        &mut self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
        weights: Option<ArrayView1<'_, f64>>,
        pool: &rayon::ThreadPool,
    ) -> Result<f64> {
        let alpha = self.settings.config.alpha;
        let batch_size = self.settings.config.batch_size;
        let verbose = self.settings.config.verbose;

        let reducer = self.reducer.as_ref().ok_or(FactorError::NotFitted)?;
        let indices: Vec<usize> = (0..data.nrows()).collect();

        let mut epoch_error = 0.0;
        let mut counted = 0usize;

        for (batch_idx, chunk) in indices.chunks(batch_size).enumerate() {
            // The subset draw happens here, on the sequential loop thread,
            // so the subset sequence is independent of worker scheduling.
            let subset = reducer.draw_subset(&mut self.rng);

            let snapshot = match self.dictionary.as_ref() {
                Some(dictionary) => dictionary.clone(),
                None => return Err(FactorError::NotFitted),
            };

            let codes: Result<Vec<Array1<f64>>> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|&i| {
                        let row_mask = mask.map(|m| m.index_axis_move(Axis(0), i));
                        solve_code(data.row(i), row_mask, &snapshot, alpha)
                    })
                    .collect()
            });
            let codes = codes?;

            let updater = self.updater.as_mut().ok_or(FactorError::NotFitted)?;
            let dictionary = self.dictionary.as_mut().ok_or(FactorError::NotFitted)?;

            for (&i, code) in chunk.iter().zip(codes.iter()) {
                let weight = weights.map(|w| w[i]).unwrap_or(1.0);
                if let Err(fatal) = updater.update(
                    dictionary,
                    code.view(),
                    data.row(i),
                    &subset,
                    reducer.rescale(),
                    weight,
                    batch_idx,
                ) {
                    // Roll back to the batch-start snapshot so the caller
                    // can still inspect the last valid dictionary state.
                    *dictionary = snapshot;
                    tracing::error!(
                        "Aborting fit at batch {} (sample {}): {}",
                        batch_idx,
                        i,
                        fatal
                    );
                    return Err(fatal);
                }

                // Diagnostics only accumulate for accepted samples, so an
                // aborted batch cannot poison the running estimate.
                let row_mask = mask.map(|m| m.index_axis_move(Axis(0), i));
                let error = reconstruction_error(data.row(i), row_mask, &snapshot, code);
                epoch_error += error;
                counted += 1;
                self.running_error = Some(match self.running_error {
                    Some(previous) => 0.99 * previous + 0.01 * error,
                    None => error,
                });
            }

            if verbose > 0 {
                tracing::debug!(
                    "Batch {}: {} samples, running error {:.6}",
                    batch_idx,
                    chunk.len(),
                    self.running_error.unwrap_or(f64::NAN)
                );
            }
        }

        Ok(epoch_error / counted.max(1) as f64)
    }
}

impl Fit for DictionaryLearner {
    type Report = FitReport;

    fn fit(
        &mut self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
    ) -> Result<FitReport> {
        self.fit_weighted(data, mask, None)
    }
}

/// Mean squared residual of one sample over its observed entries
fn reconstruction_error(
    sample: ArrayView1<'_, f64>,
    mask: Option<ArrayView1<'_, bool>>,
    dictionary: &Dictionary,
    code: &Array1<f64>,
) -> f64 {
    let reconstruction = code.dot(dictionary.matrix());
    match mask {
        Some(mask) => {
            let mut sum = 0.0;
            let mut observed = 0usize;
            for j in 0..sample.len() {
                if mask[j] {
                    let diff = sample[j] - reconstruction[j];
                    sum += diff * diff;
                    observed += 1;
                }
            }
            if observed == 0 {
                0.0
            } else {
                sum / observed as f64
            }
        }
        None => {
            let distance = sample.l2_dist(&reconstruction).unwrap_or(f64::NAN);
            distance * distance / sample.len() as f64
        }
    }
}
