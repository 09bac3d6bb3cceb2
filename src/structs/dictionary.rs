use crate::error::{FactorError, Result};
use anyhow::Context;
use ndarray::{Array2, ArrayViewMut1, Axis};
use rand::rngs::StdRng;
use rand::Rng;

/// The learned basis matrix, with one row per component and one column per feature
///
/// Rows are constrained to the unit l2 ball; every mutation re-projects the
/// affected rows. The matrix is owned by the learner while fitting and frozen
/// once fitting completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    matrix: Array2<f64>,
}

impl Dictionary {
    /// Initialize with centered uniform noise, rows projected onto the feasible set
    pub fn random(n_components: usize, n_features: usize, rng: &mut StdRng) -> Self {
        let matrix =
            Array2::from_shape_fn((n_components, n_features), |_| rng.gen_range(-1.0..1.0));
        let mut dictionary = Dictionary { matrix };
        for row in dictionary.matrix.axis_iter_mut(Axis(0)) {
            project_row(row);
        }
        dictionary
    }

    /// Warm-start from an externally supplied matrix
    ///
    /// Rows with a norm above the bound are rescaled onto the feasible set.
    pub fn warm_start(mut matrix: Array2<f64>) -> Self {
        for row in matrix.axis_iter_mut(Axis(0)) {
            project_row(row);
        }
        Dictionary { matrix }
    }

    /// Get the matrix containing the component values
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut Array2<f64> {
        &mut self.matrix
    }

    /// The number of components, equal to the number of rows in the matrix
    pub fn n_components(&self) -> usize {
        self.matrix.nrows()
    }

    /// The number of features, equal to the number of columns in the matrix
    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    /// The largest row norm, which never exceeds the bound after an update
    pub fn max_row_norm(&self) -> f64 {
        self.matrix
            .axis_iter(Axis(0))
            .map(|row| row.dot(&row).sqrt())
            .fold(0.0, f64::max)
    }

    /// Verify that the sample width matches the dictionary width
    pub(crate) fn check_width(&self, width: usize, context: &str) -> Result<()> {
        if width != self.n_features() {
            return Err(FactorError::DimensionMismatch {
                expected: self.n_features(),
                found: width,
                context: context.to_string(),
            });
        }
        Ok(())
    }

    /// Write the matrix to a CSV file
    pub fn write(&self, path: &str) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create dictionary file at {}", path))?;
        for row in self.matrix.rows() {
            writer.write_record(row.iter().map(|x| x.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl From<Array2<f64>> for Dictionary {
    fn from(matrix: Array2<f64>) -> Self {
        Dictionary::warm_start(matrix)
    }
}

/// Rescale a row onto the unit l2 ball if it lies outside
pub(crate) fn project_row(mut row: ArrayViewMut1<f64>) {
    let norm = row.dot(&row).sqrt();
    if norm > 1.0 {
        row.mapv_inplace(|x| x / norm);
    }
}
