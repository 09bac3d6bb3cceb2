use anyhow::Result;
use dlcore::prelude::*;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn fitted_learner() -> Result<DictionaryLearner> {
    let mut rng = StdRng::seed_from_u64(11);
    let basis = Array2::<f64>::from_shape_fn((4, 16), |_| rng.gen_range(-1.0..1.0));
    let codes = Array2::<f64>::from_shape_fn((60, 4), |_| rng.gen_range(0.0..1.0));
    let data = codes.dot(&basis);

    let mut settings = Settings::new();
    settings.config.n_components = 4;
    settings.config.n_epochs = 5;
    let mut learner = DictionaryLearner::new(settings)?;
    learner.fit(data.view(), None)?;
    Ok(learner)
}

fn query(seed: u64, n: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::<f64>::from_shape_fn((n, 16), |_| rng.gen_range(-1.0..1.0))
}

/// Projecting the same batch twice yields bit-identical loadings
#[test]
fn test_projection_is_reproducible() -> Result<()> {
    let learner = fitted_learner()?;
    let projector = learner.projector()?;
    let samples = query(1, 30);

    let first = projector.project(samples.view(), None)?;
    let second = projector.project(samples.view(), None)?;
    assert_eq!(first.matrix(), second.matrix());
    assert_eq!(first.n_samples(), 30);
    assert_eq!(first.n_components(), 4);
    Ok(())
}

/// Rows of the loadings line up with rows of the input, independent of the
/// batch size and worker count
#[test]
fn test_projection_preserves_order() -> Result<()> {
    let learner = fitted_learner()?;
    let samples = query(2, 25);

    let whole = learner.projector()?.project(samples.view(), None)?;
    let chunked = learner
        .projector()?
        .with_batch_size(4)
        .with_n_jobs(4)
        .project(samples.view(), None)?;
    assert_eq!(whole.matrix(), chunked.matrix());

    // Row i of the batch result equals projecting sample i alone
    let row = samples.row(7).insert_axis(Axis(0));
    let single = learner.projector()?.project(row, None)?;
    assert_eq!(whole.matrix().row(7), single.matrix().row(0));
    Ok(())
}

/// A sample with no observed entries projects to the zero code
#[test]
fn test_fully_masked_sample_yields_zero_code() -> Result<()> {
    let learner = fitted_learner()?;
    let samples = query(3, 3);
    let mut mask = Array2::from_elem((3, 16), true);
    mask.row_mut(1).fill(false);

    let loadings = learner.projector()?.project(samples.view(), Some(mask.view()))?;
    assert!(loadings.matrix().row(1).iter().all(|&v| v == 0.0));
    assert!(loadings.matrix().row(0).iter().any(|&v| v != 0.0));
    Ok(())
}

/// Masked projection differs from the unmasked one when entries are hidden
#[test]
fn test_mask_changes_the_solution() -> Result<()> {
    let learner = fitted_learner()?;
    let samples = query(4, 5);
    let mask = Array2::from_shape_fn((5, 16), |(_, j)| j % 2 == 0);

    let unmasked = learner.projector()?.project(samples.view(), None)?;
    let masked = learner
        .projector()?
        .project(samples.view(), Some(mask.view()))?;
    assert_ne!(unmasked.matrix(), masked.matrix());
    Ok(())
}

/// The cache memoizes unmasked projections and replays them verbatim
#[test]
fn test_cache_hit_replays_result() -> Result<()> {
    let learner = fitted_learner()?;
    let cache = ProjectionCache::new();
    let samples = query(5, 20);

    let projector = learner.projector()?;
    let projector = projector.with_cache(&cache);
    let first = projector.project(samples.view(), None)?;
    assert_eq!(cache.len(), 1);

    let second = projector.project(samples.view(), None)?;
    assert_eq!(cache.len(), 1);
    assert_eq!(first.matrix(), second.matrix());

    // A different batch gets its own entry
    let other = query(6, 20);
    projector.project(other.view(), None)?;
    assert_eq!(cache.len(), 2);
    Ok(())
}

/// Masked batches bypass the cache entirely
#[test]
fn test_masked_projection_is_not_cached() -> Result<()> {
    let learner = fitted_learner()?;
    let cache = ProjectionCache::new();
    let samples = query(7, 10);
    let mask = Array2::from_elem((10, 16), true);

    let projector = learner.projector()?;
    projector
        .with_cache(&cache)
        .project(samples.view(), Some(mask.view()))?;
    assert!(cache.is_empty());
    Ok(())
}

/// A projector cannot be built from a learner that never froze a dictionary
#[test]
fn test_projector_requires_fitted_learner() -> Result<()> {
    let learner = DictionaryLearner::new(Settings::new())?;
    assert!(matches!(learner.projector(), Err(FactorError::NotFitted)));
    Ok(())
}

/// Samples of the wrong width are rejected
#[test]
fn test_projection_width_checked() -> Result<()> {
    let learner = fitted_learner()?;
    let narrow = Array2::<f64>::zeros((3, 9));
    assert!(matches!(
        learner.projector()?.project(narrow.view(), None),
        Err(FactorError::DimensionMismatch { expected: 16, found: 9, .. })
    ));
    Ok(())
}
