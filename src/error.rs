use thiserror::Error;

/// Errors raised by the factorization engine
///
/// Configuration and dimension errors are surfaced to the caller with enough
/// context to reproduce the offending call. Numeric degeneracies inside the
/// code solver are recovered locally and only escape when recovery is
/// exhausted.
#[derive(Debug, Error)]
pub enum FactorError {
    /// An invalid setting, rejected before any fitting state is created
    #[error("invalid value for `{parameter}`: {reason}")]
    Config {
        parameter: &'static str,
        reason: String,
    },

    /// A sample or mask whose width disagrees with the dictionary
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        context: String,
    },

    /// The masked regression stayed degenerate after exhausting the
    /// regularization fallback
    #[error("masked system still singular after {attempts} regularization bumps")]
    SingularSystem { attempts: usize },

    /// The update step produced a non-finite value; the learner retains the
    /// last valid dictionary state
    #[error("non-finite value produced while processing batch {batch}")]
    NonFinite { batch: usize },

    /// Projection was requested before the dictionary was frozen
    #[error("dictionary is not fitted, call fit() or freeze() first")]
    NotFitted,
}

pub type Result<T> = std::result::Result<T, FactorError>;
