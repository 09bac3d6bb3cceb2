use crate::error::Result;
use crate::routines::settings::Settings;
use crate::structs::dictionary::Dictionary;
use ndarray::Array2;
use rand::rngs::StdRng;

/// Build the initial dictionary, either from a warm start or at random
///
/// A warm start must match the configured component count and the width of
/// the incoming samples; its rows are projected onto the feasible set.
pub fn initial_dictionary(
    settings: &Settings,
    n_features: usize,
    warm_start: Option<Array2<f64>>,
    rng: &mut StdRng,
) -> Result<Dictionary> {
    let n_components = settings.config.n_components;
    match warm_start {
        Some(matrix) => {
            // The incoming data defines the expected width, not the
            // supplied matrix
            if matrix.ncols() != n_features {
                return Err(crate::error::FactorError::DimensionMismatch {
                    expected: n_features,
                    found: matrix.ncols(),
                    context: "warm start".to_string(),
                });
            }
            if matrix.nrows() != n_components {
                return Err(crate::error::FactorError::DimensionMismatch {
                    expected: n_components,
                    found: matrix.nrows(),
                    context: "warm start components".to_string(),
                });
            }
            let dictionary = Dictionary::warm_start(matrix);
            tracing::info!(
                "Warm-starting dictionary with {} components over {} features",
                n_components,
                n_features
            );
            Ok(dictionary)
        }
        None => {
            tracing::info!(
                "Initializing random dictionary with {} components over {} features",
                n_components,
                n_features
            );
            Ok(Dictionary::random(n_components, n_features, rng))
        }
    }
}
