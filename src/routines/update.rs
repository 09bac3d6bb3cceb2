use crate::error::{FactorError, Result};
use crate::structs::dictionary::{project_row, Dictionary};
use crate::structs::stats::SuffStats;
use ndarray::{ArrayView1, Axis};

/// Number of block-coordinate descent passes per update
const BCD_PASSES: usize = 2;

/// Pivots smaller than this are skipped during the descent
const PIVOT_FLOOR: f64 = 1e-12;

/// Applies one sample's contribution to the sufficient statistics and
/// recomputes the dictionary rows restricted to the subset columns
///
/// This is the sole writer of the shared mutable state (A, B and the
/// dictionary). It runs sequentially between the parallel solve phases, so a
/// single-writer discipline replaces locking.
#[derive(Debug)]
pub struct Updater {
    stats: SuffStats,
    learning_rate: f64,
}

impl Updater {
    pub fn new(n_components: usize, n_features: usize, learning_rate: f64) -> Self {
        Updater {
            stats: SuffStats::new(n_components, n_features),
            learning_rate,
        }
    }

    pub fn stats(&self) -> &SuffStats {
        &self.stats
    }

    /// Forgetting weight of the sample with counter value `t`
    fn forget_weight(&self, t: u64) -> f64 {
        (t as f64).powf(-self.learning_rate)
    }

    /// Fold one sample into A and B and refresh the dictionary
    ///
    /// The accumulators decay by `1 - w_t` across all columns while only the
    /// `subset` columns of B receive the new contribution, rescaled by
    /// `rescale` so its expectation matches the full-feature update. The
    /// dictionary rows are then recomputed on the subset columns by a few
    /// block-coordinate descent steps against the updated statistics, and
    /// every touched row is projected back onto the bounded-norm feasible
    /// set.
    pub fn update(
        &mut self,
        dictionary: &mut Dictionary,
        code: ArrayView1<f64>,
        sample: ArrayView1<f64>,
        subset: &[usize],
        rescale: f64,
        sample_weight: f64,
        batch: usize,
    ) -> Result<()> {
        // Reject bad input before A, B or the counter are touched, so a
        // fatal abort leaves the statistics valid for a later resume.
        if !sample_weight.is_finite()
            || code.iter().any(|value| !value.is_finite())
            || subset.iter().any(|&j| !sample[j].is_finite())
        {
            return Err(FactorError::NonFinite { batch });
        }

        let t = self.stats.bump();
        let w = sample_weight * self.forget_weight(t);

        let outer = code.insert_axis(Axis(1)).dot(&code.insert_axis(Axis(0)));
        let a = self.stats.a_mut();
        *a *= 1.0 - w;
        a.scaled_add(w, &outer);

        let b = self.stats.b_mut();
        *b *= 1.0 - w;
        for &j in subset {
            let mut column = b.column_mut(j);
            column.scaled_add(w * rescale * sample[j], &code);
        }

        self.descend(dictionary, subset);

        if dictionary
            .matrix()
            .iter()
            .any(|value| !value.is_finite())
        {
            return Err(FactorError::NonFinite { batch });
        }
        Ok(())
    }

    /// Block-coordinate descent of the dictionary rows over the subset columns
    fn descend(&self, dictionary: &mut Dictionary, subset: &[usize]) {
        let a = self.stats.a();
        let b = self.stats.b();
        let n_components = a.nrows();
        let matrix = dictionary.matrix_mut();

        for _ in 0..BCD_PASSES {
            for row in 0..n_components {
                let pivot = a[[row, row]];
                if pivot.abs() < PIVOT_FLOOR {
                    continue;
                }
                for &col in subset {
                    let mut projection = 0.0;
                    for other in 0..n_components {
                        projection += a[[row, other]] * matrix[[other, col]];
                    }
                    matrix[[row, col]] += (b[[row, col]] - projection) / pivot;
                }
                project_row(matrix.row_mut(row));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn full_subset(n_features: usize) -> Vec<usize> {
        (0..n_features).collect()
    }

    #[test]
    fn test_first_sample_overwrites_statistics() {
        // At t = 1 the forgetting weight is 1, so A is exactly the code outer
        // product and B the code-feature product.
        let mut rng = StdRng::seed_from_u64(5);
        let mut dictionary = Dictionary::random(2, 4, &mut rng);
        let mut updater = Updater::new(2, 4, 0.9);

        let code = array![1.0, -2.0];
        let sample = array![0.5, 0.0, -0.5, 1.0];
        updater
            .update(
                &mut dictionary,
                code.view(),
                sample.view(),
                &full_subset(4),
                1.0,
                1.0,
                0,
            )
            .unwrap();

        let a = updater.stats().a();
        assert_relative_eq!(a[[0, 0]], 1.0);
        assert_relative_eq!(a[[0, 1]], -2.0);
        assert_relative_eq!(a[[1, 1]], 4.0);
        let b = updater.stats().b();
        assert_relative_eq!(b[[1, 3]], -2.0);
        assert_eq!(updater.stats().counter(), 1);
    }

    #[test]
    fn test_accumulator_stays_symmetric() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut dictionary = Dictionary::random(3, 6, &mut rng);
        let mut updater = Updater::new(3, 6, 0.8);

        for step in 0..20 {
            let code = Array1::from_shape_fn(3, |i| ((step + i) as f64 * 0.37).sin());
            let sample = Array1::from_shape_fn(6, |j| ((step * j) as f64 * 0.11).cos());
            updater
                .update(
                    &mut dictionary,
                    code.view(),
                    sample.view(),
                    &full_subset(6),
                    1.0,
                    1.0,
                    step,
                )
                .unwrap();
        }

        let a = updater.stats().a();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a[[i, j]], a[[j, i]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_row_norms_stay_bounded() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut dictionary = Dictionary::random(4, 10, &mut rng);
        let mut updater = Updater::new(4, 10, 0.9);

        for step in 0..50 {
            let code = Array1::from_shape_fn(4, |i| (step as f64 + i as f64) * 0.5);
            let sample = Array1::from_shape_fn(10, |j| (j as f64 - 4.0) * 2.0);
            updater
                .update(
                    &mut dictionary,
                    code.view(),
                    sample.view(),
                    &full_subset(10),
                    1.0,
                    1.0,
                    step,
                )
                .unwrap();
            assert!(dictionary.max_row_norm() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_subset_update_leaves_other_columns_decayed() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut dictionary = Dictionary::random(2, 4, &mut rng);
        let mut updater = Updater::new(2, 4, 0.9);

        let code = array![1.0, 1.0];
        let sample = array![1.0, 1.0, 1.0, 1.0];
        // First step touches everything
        updater
            .update(
                &mut dictionary,
                code.view(),
                sample.view(),
                &full_subset(4),
                1.0,
                1.0,
                0,
            )
            .unwrap();
        let b_before = updater.stats().b().clone();

        // Second step only touches columns 0 and 2, rescaled by 2
        updater
            .update(
                &mut dictionary,
                code.view(),
                sample.view(),
                &[0, 2],
                2.0,
                1.0,
                0,
            )
            .unwrap();

        let w = 2f64.powf(-0.9);
        let b = updater.stats().b();
        assert_relative_eq!(b[[0, 1]], (1.0 - w) * b_before[[0, 1]], epsilon = 1e-12);
        assert_relative_eq!(
            b[[0, 0]],
            (1.0 - w) * b_before[[0, 0]] + w * 2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_non_finite_sample_is_fatal() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut dictionary = Dictionary::random(2, 4, &mut rng);
        let mut updater = Updater::new(2, 4, 0.9);

        let code = array![f64::NAN, 0.0];
        let sample = array![1.0, 1.0, 1.0, 1.0];
        let result = updater.update(
            &mut dictionary,
            code.view(),
            sample.view(),
            &full_subset(4),
            1.0,
            1.0,
            3,
        );
        assert!(matches!(result, Err(FactorError::NonFinite { batch: 3 })));
    }

    #[test]
    fn test_failed_update_leaves_statistics_untouched() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut dictionary = Dictionary::random(2, 4, &mut rng);
        let mut updater = Updater::new(2, 4, 0.9);

        let bad_code = array![f64::NAN, 0.0];
        let sample = array![1.0, 1.0, 1.0, 1.0];
        let result = updater.update(
            &mut dictionary,
            bad_code.view(),
            sample.view(),
            &full_subset(4),
            1.0,
            1.0,
            0,
        );
        assert!(result.is_err());
        assert_eq!(updater.stats().counter(), 0);
        assert!(updater.stats().a().iter().all(|v| v.is_finite()));
        assert!(updater.stats().b().iter().all(|v| v.is_finite()));

        // A clean sample right after the abort must be accepted
        let code = array![1.0, -1.0];
        updater
            .update(
                &mut dictionary,
                code.view(),
                sample.view(),
                &full_subset(4),
                1.0,
                1.0,
                1,
            )
            .unwrap();
        assert_eq!(updater.stats().counter(), 1);
    }
}
