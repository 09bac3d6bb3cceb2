pub mod algorithms;
pub mod classification;
pub mod error;
pub mod logger;
pub mod routines {
    pub mod cache;
    pub mod initialization;
    pub mod output;
    pub mod reduction;
    pub mod settings;
    pub mod solver;
    pub mod update;
}
pub mod structs {
    pub mod dictionary;
    pub mod loadings;
    pub mod stats;
}

pub mod prelude {
    pub use crate::algorithms::{DictionaryLearner, Fit, Projector, Status, Transform};
    pub use crate::classification::{LoadingClassifier, Regularization};
    pub use crate::error::{FactorError, Result};
    pub use crate::logger::setup_log;
    pub use crate::routines::cache::ProjectionCache;
    pub use crate::routines::output::FitReport;
    pub use crate::routines::settings::{self, Settings};
    pub use crate::structs::dictionary::Dictionary;
    pub use crate::structs::loadings::Loadings;
}

use algorithms::{DictionaryLearner, Fit};
use anyhow::{Context, Result};
use ndarray::ArrayView2;
use routines::output::FitReport;
use routines::settings::Settings;

/// Fit a dictionary to a sample matrix and write the configured outputs
///
/// This is the batteries-included entrypoint: it configures logging, runs
/// the streaming fit over `data` (optionally masked) and writes the epoch
/// log, final dictionary and settings to the output folder. For finer
/// control, drive [DictionaryLearner] directly.
pub fn fit(
    data: ArrayView2<'_, f64>,
    mask: Option<ArrayView2<'_, bool>>,
    settings: Settings,
) -> Result<(DictionaryLearner, FitReport)> {
    logger::setup_log(&settings)?;
    tracing::info!(
        "Fitting {} components to {} samples of {} features",
        settings.config.n_components,
        data.nrows(),
        data.ncols()
    );

    let mut learner = DictionaryLearner::new(settings.clone())?;
    let report = learner
        .fit(data, mask)
        .context("Failed to fit the dictionary")?;

    if settings.output.write {
        report
            .write_outputs(&settings)
            .context("Failed to write output files")?;
        let path = std::path::Path::new(&settings.output.path).join("dictionary.csv");
        learner
            .dictionary()?
            .write(&path.to_string_lossy())
            .context("Failed to write the dictionary")?;
    }

    Ok((learner, report))
}
