use crate::error::Result;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

pub mod learner;
pub mod projector;

pub use learner::DictionaryLearner;
pub use projector::Projector;

/// Represents the lifecycle of a learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// No dictionary has been created yet
    Uninitialized,
    /// The dictionary is being mutated by the streaming loop
    Fitting,
    /// The dictionary is frozen and may be shared with projectors
    Fitted,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Uninitialized => write!(f, "Uninitialized"),
            Status::Fitting => write!(f, "Fitting"),
            Status::Fitted => write!(f, "Fitted"),
        }
    }
}

/// Types that learn state from a sample matrix with an optional mask
pub trait Fit {
    type Report;

    fn fit(
        &mut self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
    ) -> Result<Self::Report>;
}

/// Types that map a sample matrix to a derived representation without
/// mutating any learned state
pub trait Transform {
    type Output;

    fn transform(
        &self,
        data: ArrayView2<'_, f64>,
        mask: Option<ArrayView2<'_, bool>>,
    ) -> Result<Self::Output>;
}
