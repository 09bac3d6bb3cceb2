use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dlcore::prelude::*;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn fitted_learner() -> DictionaryLearner {
    let mut rng = StdRng::seed_from_u64(42);
    let basis = Array2::<f64>::from_shape_fn((20, 100), |_| rng.gen_range(-1.0..1.0));
    let codes = Array2::<f64>::from_shape_fn((500, 20), |_| rng.gen_range(0.0..1.0));
    let data = codes.dot(&basis);

    let mut settings = Settings::new();
    settings.config.n_components = 20;
    settings.config.n_epochs = 2;
    let mut learner = DictionaryLearner::new(settings).unwrap();
    learner.fit(data.view(), None).unwrap();
    learner
}

/// Benchmark projecting 500 samples of 100 features onto 20 components
fn benchmark_projection(c: &mut Criterion) {
    let learner = fitted_learner();
    let mut rng = StdRng::seed_from_u64(1);
    let samples = Array2::<f64>::from_shape_fn((500, 100), |_| rng.gen_range(-1.0..1.0));

    c.bench_function("project_500x100", |b| {
        b.iter(|| {
            let projector = learner.projector().unwrap();
            let _ = projector.project(black_box(samples.view()), None).unwrap();
        });
    });

    c.bench_function("project_500x100_parallel", |b| {
        b.iter(|| {
            let projector = learner.projector().unwrap().with_n_jobs(4);
            let _ = projector.project(black_box(samples.view()), None).unwrap();
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(std::time::Duration::from_secs(10))
        .noise_threshold(0.10);
    targets = benchmark_projection
}
criterion_main!(benches);
