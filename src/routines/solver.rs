use crate::error::{FactorError, Result};
use crate::structs::dictionary::Dictionary;
use linfa_linalg::cholesky::Cholesky;
use linfa_linalg::triangular::{SolveTriangular, UPLO};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Maximum number of regularization bumps before a degenerate system is surfaced
const MAX_ALPHA_BUMPS: usize = 12;

/// Solve the regularized code regression for one (possibly masked) sample
///
/// Minimizes `0.5 * ||mask ⊙ (sample - code · D)||² + 0.5 * alpha * ||code||²`
/// restricted to the observed columns, through the normal equations
/// `(D_m D_mᵀ + alpha I) code = D_m x_m` where `D_m` is the masked
/// sub-dictionary. The solve is a small k×k Cholesky factorization.
///
/// A rank-deficient masked sub-dictionary is recovered locally by bumping
/// `alpha` and retrying rather than failing outward. An all-zero mask
/// returns the zero code with no computation.
pub fn solve_code(
    sample: ArrayView1<f64>,
    mask: Option<ArrayView1<bool>>,
    dictionary: &Dictionary,
    alpha: f64,
) -> Result<Array1<f64>> {
    let n_components = dictionary.n_components();
    dictionary.check_width(sample.len(), "sample")?;
    if let Some(mask) = mask {
        dictionary.check_width(mask.len(), "mask")?;
    }

    let observed: Vec<usize> = match mask {
        Some(mask) => mask
            .iter()
            .enumerate()
            .filter(|(_, &seen)| seen)
            .map(|(j, _)| j)
            .collect(),
        None => (0..sample.len()).collect(),
    };
    if observed.is_empty() {
        return Ok(Array1::zeros(n_components));
    }

    let (gram, rhs) = if observed.len() == sample.len() {
        let d = dictionary.matrix();
        (d.dot(&d.t()), d.dot(&sample))
    } else {
        let d_masked = dictionary.matrix().select(Axis(1), &observed);
        let x_masked = sample.select(Axis(0), &observed);
        let rhs = d_masked.dot(&x_masked);
        (d_masked.dot(&d_masked.t()), rhs)
    };
    let rhs = rhs.insert_axis(Axis(1));

    let mut penalty = alpha;
    for attempt in 0..MAX_ALPHA_BUMPS {
        let mut system = gram.clone();
        let mut diagonal = system.diag_mut();
        diagonal += penalty;

        match factor_and_solve(&system, &rhs) {
            Ok(code) => return Ok(code),
            Err(_) => {
                penalty = if penalty > 0.0 { penalty * 10.0 } else { 1e-10 };
                tracing::debug!(
                    "Masked system is rank-deficient (attempt {}), bumping alpha to {:e}",
                    attempt + 1,
                    penalty
                );
            }
        }
    }

    Err(FactorError::SingularSystem {
        attempts: MAX_ALPHA_BUMPS,
    })
}

fn factor_and_solve(
    system: &Array2<f64>,
    rhs: &Array2<f64>,
) -> std::result::Result<Array1<f64>, linfa_linalg::LinalgError> {
    let lower = system.cholesky()?;
    let halfway = lower.solve_triangular(rhs, UPLO::Lower)?;
    let solution = lower.t().solve_triangular(&halfway, UPLO::Upper)?;
    Ok(solution.column(0).to_owned())
}
