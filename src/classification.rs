use crate::error::{FactorError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Regularization strength of the classifier, either fixed or searched over
/// an explicit grid
#[derive(Debug, Clone)]
pub enum Regularization {
    Fixed(f64),
    Grid(Vec<f64>),
}

/// Maps arbitrary labels to dense class indices and back
#[derive(Debug, Clone)]
pub struct LabelEncoder<T> {
    classes: Vec<T>,
}

impl<T: Clone + Ord> LabelEncoder<T> {
    pub fn fit(labels: &[T]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        LabelEncoder { classes }
    }

    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    pub fn transform(&self, labels: &[T]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.classes
                    .binary_search(label)
                    .map_err(|_| FactorError::Config {
                        parameter: "labels",
                        reason: "label not seen during fit".to_string(),
                    })
            })
            .collect()
    }

    pub fn inverse_transform(&self, encoded: &[usize]) -> Vec<T> {
        encoded.iter().map(|&i| self.classes[i].clone()).collect()
    }
}

/// Centers and scales features using statistics from the fitting data only
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scale = x
            .var_axis(Axis(0), 0.0)
            .mapv(f64::sqrt)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        StandardScaler { mean, scale }
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.scale
    }
}

/// A fitted multinomial (softmax) regression model
#[derive(Debug, Clone)]
struct SoftmaxModel {
    weights: Array2<f64>,
    intercept: Array1<f64>,
}

impl SoftmaxModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<usize> {
        let mut logits = x.dot(&self.weights.t());
        logits += &self.intercept;
        logits
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 {
                            (j, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Train a softmax regression by full-gradient descent
///
/// `c` follows the usual inverse-regularization convention: the l2 penalty
/// on the weights is `1 / (c * n_samples)`. The intercept is not penalized.
fn train_softmax(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    n_classes: usize,
    c: f64,
    tol: f64,
    max_iter: usize,
) -> SoftmaxModel {
    let (n, d) = x.dim();
    let lambda = 1.0 / (c * n as f64);
    let max_sq_norm = x
        .rows()
        .into_iter()
        .map(|row| row.dot(&row))
        .fold(0.0, f64::max);
    // Gradient Lipschitz bound for the softmax loss plus penalty
    let step = 1.0 / (0.5 * (max_sq_norm + 1.0) + lambda);

    let mut weights: Array2<f64> = Array2::zeros((n_classes, d));
    let mut intercept: Array1<f64> = Array1::zeros(n_classes);

    for _ in 0..max_iter {
        let mut probs = x.dot(&weights.t());
        probs += &intercept;
        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        for (i, &class) in y.iter().enumerate() {
            probs[[i, class]] -= 1.0;
        }

        let mut grad_weights = probs.t().dot(&x) / n as f64;
        grad_weights.scaled_add(lambda, &weights);
        let grad_intercept = probs.sum_axis(Axis(0)) / n as f64;

        let max_grad = grad_weights
            .iter()
            .chain(grad_intercept.iter())
            .fold(0.0f64, |m, v| m.max(v.abs()));

        weights.scaled_add(-step, &grad_weights);
        intercept.scaled_add(-step, &grad_intercept);

        if max_grad < tol {
            break;
        }
    }

    SoftmaxModel { weights, intercept }
}

/// Multinomial logistic classifier over dictionary loadings
///
/// Standardization statistics are always fit on the training fold only.
/// With [Regularization::Grid], the strength is selected by seeded shuffle
/// splits at a loose tolerance (`tol * 1e2`, a tenth of the iterations) and
/// the final model is refit at the strict tolerance; the two phases are
/// deliberately distinct.
#[derive(Debug)]
pub struct LoadingClassifier<T> {
    regularization: Regularization,
    standardize: bool,
    tol: f64,
    max_iter: usize,
    n_splits: usize,
    test_size: f64,
    random_state: u64,
    encoder: Option<LabelEncoder<T>>,
    scaler: Option<StandardScaler>,
    model: Option<SoftmaxModel>,
    best_c: Option<f64>,
}

impl<T: Clone + Ord + Send + Sync> LoadingClassifier<T> {
    pub fn new(regularization: Regularization) -> Self {
        LoadingClassifier {
            regularization,
            standardize: true,
            tol: 1e-6,
            max_iter: 1000,
            n_splits: 5,
            test_size: 0.1,
            random_state: 42,
            encoder: None,
            scaler: None,
            model: None,
            best_c: None,
        }
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_splits(mut self, n_splits: usize, test_size: f64) -> Self {
        self.n_splits = n_splits;
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// The regularization strength selected by the search phase, if any
    pub fn best_c(&self) -> Option<f64> {
        self.best_c
    }

    pub fn fit(&mut self, loadings: ArrayView2<'_, f64>, labels: &[T]) -> Result<()> {
        if labels.len() != loadings.nrows() {
            return Err(FactorError::DimensionMismatch {
                expected: loadings.nrows(),
                found: labels.len(),
                context: "labels".to_string(),
            });
        }

        let candidates = match &self.regularization {
            Regularization::Fixed(c) => vec![*c],
            Regularization::Grid(grid) => grid.clone(),
        };
        if candidates.is_empty() {
            return Err(FactorError::Config {
                parameter: "regularization",
                reason: "search grid is empty".to_string(),
            });
        }
        if let Some(bad) = candidates.iter().find(|&&c| !(c > 0.0)) {
            return Err(FactorError::Config {
                parameter: "regularization",
                reason: format!("strengths must be positive, got {}", bad),
            });
        }

        let encoder = LabelEncoder::fit(labels);
        let y = encoder.transform(labels)?;
        let n_classes = encoder.classes().len();
        if n_classes < 2 {
            return Err(FactorError::Config {
                parameter: "labels",
                reason: "need at least two distinct classes".to_string(),
            });
        }

        let best = if candidates.len() == 1 {
            candidates[0]
        } else {
            self.search(loadings, &y, n_classes, &candidates)?
        };

        // Strict-tolerance refit on the full training data
        let scaler = self.standardize.then(|| StandardScaler::fit(loadings));
        let x = match &scaler {
            Some(scaler) => scaler.transform(loadings),
            None => loadings.to_owned(),
        };
        let model = train_softmax(x.view(), &y, n_classes, best, self.tol, self.max_iter);

        self.encoder = Some(encoder);
        self.scaler = scaler;
        self.model = Some(model);
        self.best_c = Some(best);
        Ok(())
    }

    /// Loose-tolerance grid search over shuffled splits
    fn search(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
        candidates: &[f64],
    ) -> Result<f64> {
        let n = x.nrows();
        let n_test = ((n as f64 * self.test_size).ceil() as usize).clamp(1, n - 1);

        // Splits are drawn up front from the seeded generator so the search
        // is deterministic and candidates can be evaluated in parallel.
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let splits: Vec<(Vec<usize>, Vec<usize>)> = (0..self.n_splits)
            .map(|_| {
                let mut indices: Vec<usize> = (0..n).collect();
                indices.shuffle(&mut rng);
                let (test, train) = indices.split_at(n_test);
                (train.to_vec(), test.to_vec())
            })
            .collect();

        let loose_tol = self.tol * 1e2;
        let loose_iter = (self.max_iter / 10).max(1);

        let scores: Vec<f64> = candidates
            .par_iter()
            .map(|&c| {
                let mut accuracy = 0.0;
                for (train, test) in &splits {
                    let x_train = x.select(Axis(0), train);
                    let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
                    let x_test = x.select(Axis(0), test);

                    let scaler = self.standardize.then(|| StandardScaler::fit(x_train.view()));
                    let (x_train, x_test) = match &scaler {
                        Some(scaler) => (
                            scaler.transform(x_train.view()),
                            scaler.transform(x_test.view()),
                        ),
                        None => (x_train, x_test),
                    };

                    let model =
                        train_softmax(x_train.view(), &y_train, n_classes, c, loose_tol, loose_iter);
                    let predicted = model.predict(x_test.view());
                    let hits = predicted
                        .iter()
                        .zip(test.iter())
                        .filter(|&(&p, &i)| p == y[i])
                        .count();
                    accuracy += hits as f64 / test.len() as f64;
                }
                accuracy / splits.len() as f64
            })
            .collect();

        let mut best = candidates[0];
        let mut best_score = f64::NEG_INFINITY;
        for (&c, &score) in candidates.iter().zip(scores.iter()) {
            if score > best_score {
                best = c;
                best_score = score;
            }
        }
        tracing::info!(
            "Selected regularization strength {} (held-out accuracy {:.3})",
            best,
            best_score
        );
        Ok(best)
    }

    pub fn predict(&self, loadings: ArrayView2<'_, f64>) -> Result<Vec<T>> {
        let model = self.model.as_ref().ok_or(FactorError::NotFitted)?;
        let encoder = self.encoder.as_ref().ok_or(FactorError::NotFitted)?;
        if loadings.ncols() != model.weights.ncols() {
            return Err(FactorError::DimensionMismatch {
                expected: model.weights.ncols(),
                found: loadings.ncols(),
                context: "loadings".to_string(),
            });
        }

        let x = match &self.scaler {
            Some(scaler) => scaler.transform(loadings),
            None => loadings.to_owned(),
        };
        let encoded = model.predict(x.view());
        Ok(encoder.inverse_transform(&encoded))
    }

    /// Fraction of samples predicted correctly
    pub fn score(&self, loadings: ArrayView2<'_, f64>, labels: &[T]) -> Result<f64>
    where
        T: PartialEq,
    {
        let predicted = self.predict(loadings)?;
        let hits = predicted
            .iter()
            .zip(labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        Ok(hits as f64 / labels.len() as f64)
    }
}
