use ndarray::Array2;

/// Accumulated sufficient statistics for the incremental dictionary update
///
/// `a` holds the code-code correlation (k×k) and `b` the code-feature
/// correlation (k×p). Both are maintained as exponentially weighted moving
/// accumulations keyed by the monotone sample counter, so past samples never
/// need to be replayed.
#[derive(Debug, Clone)]
pub struct SuffStats {
    a: Array2<f64>,
    b: Array2<f64>,
    counter: u64,
}

impl SuffStats {
    pub fn new(n_components: usize, n_features: usize) -> Self {
        SuffStats {
            a: Array2::zeros((n_components, n_components)),
            b: Array2::zeros((n_components, n_features)),
            counter: 0,
        }
    }

    /// Code-code correlation accumulator
    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    /// Code-feature correlation accumulator
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }

    pub(crate) fn a_mut(&mut self) -> &mut Array2<f64> {
        &mut self.a
    }

    pub(crate) fn b_mut(&mut self) -> &mut Array2<f64> {
        &mut self.b
    }

    /// Number of samples accumulated so far
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Advance the sample counter, returning its new value
    pub(crate) fn bump(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}
