use criterion::{criterion_group, criterion_main, Criterion};
use env_logger::{Builder, Env};
use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use sobox::{
    AcquisitionFunction, Domain, Experiments, InputFeature, Inputs, Objective, OutputFeature,
    Outputs, SoboConfig, SoboStrategy, SOBOX_LOG,
};

/// Himmelblau test function: min f(x)=0 at x=(3, 2) among others
fn himmelblau(x: &ArrayView2<f64>) -> Array2<f64> {
    x.map_axis(Axis(1), |r| {
        (r[0] * r[0] + r[1] - 11.).powi(2) + (r[0] + r[1] * r[1] - 7.).powi(2)
    })
    .insert_axis(Axis(1))
}

fn criterion_sobo(c: &mut Criterion) {
    let env = Env::new().filter_or(SOBOX_LOG, "error");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let domain = Domain::new(
        Inputs::new(vec![
            InputFeature::continuous("x1", -6., 6.),
            InputFeature::continuous("x2", -6., 6.),
        ]),
        Outputs::new(vec![OutputFeature::new("y", Objective::minimize())]),
        vec![],
    )
    .expect("Domain");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = domain.inputs().sample(10, &mut rng);
    let experiments = Experiments::new(&x, &himmelblau(&x.view())).expect("Experiments");

    let mut group = c.benchmark_group("sobo");
    group.sample_size(10);
    for (name, acqf) in [
        ("qLogNEI", AcquisitionFunction::default()),
        ("qUCB", AcquisitionFunction::QUCB { beta: 0.2 }),
    ] {
        let config = SoboConfig::default()
            .acquisition_function(Some(acqf))
            .num_mc_samples(128)
            .num_raw_samples(256)
            .num_restarts(4)
            .seed(42);
        let mut strategy = SoboStrategy::new(domain.clone(), config).expect("Sobo configured");
        strategy.tell(&experiments).expect("Training");
        group.bench_function(format!("sobo ask {name} himmelblau"), |b| {
            b.iter(|| std::hint::black_box(strategy.ask(2, false).expect("Candidates")))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_sobo);
criterion_main!(benches);
