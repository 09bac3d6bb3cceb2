use anyhow::Context;
use ndarray::Array2;

/// Low-dimensional representations of a batch of samples against a frozen
/// dictionary, one row per sample and one column per component
#[derive(Debug, Clone, PartialEq)]
pub struct Loadings {
    matrix: Array2<f64>,
}

impl Loadings {
    /// Get the matrix of loadings
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.matrix.ncols()
    }

    /// Write the loadings to a CSV file
    pub fn write(&self, path: &str) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create loadings file at {}", path))?;
        for row in self.matrix.rows() {
            writer.write_record(row.iter().map(|x| x.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl From<Array2<f64>> for Loadings {
    fn from(matrix: Array2<f64>) -> Self {
        Loadings { matrix }
    }
}
