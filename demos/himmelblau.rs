use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use sobox::{
    AcquisitionFunction, Constraint, Domain, Experiments, InputFeature, Inputs, LocalSearchConfig,
    Objective, OutputFeature, Outputs, SoboConfig, SoboStrategy,
};

/// Himmelblau function, 4 global minima at 0.
fn himmelblau(x: &ArrayView2<f64>) -> Array2<f64> {
    x.map_axis(Axis(1), |r| {
        (r[0] * r[0] + r[1] - 11.).powi(2) + (r[0] + r[1] * r[1] - 7.).powi(2)
    })
    .insert_axis(Axis(1))
}

fn main() -> anyhow::Result<()> {
    let domain = Domain::new(
        Inputs::new(vec![
            InputFeature::continuous("x1", -6., 6.).with_local_relative_bounds(1., 1.),
            InputFeature::continuous("x2", -6., 6.).with_local_relative_bounds(1., 1.),
        ]),
        Outputs::new(vec![OutputFeature::new("y", Objective::minimize())]),
        // restrict the search to the x1 + x2 <= 4 half plane
        vec![Constraint::linear_inequality(&["x1", "x2"], &[1., 1.], 4.)],
    )?;

    let config = SoboConfig::default()
        .acquisition_function(Some(AcquisitionFunction::QEI))
        .local_search_config(Some(LocalSearchConfig::lsrbo(0.1)))
        .num_mc_samples(128)
        .num_raw_samples(256)
        .num_restarts(4)
        .seed(42);
    let mut strategy = SoboStrategy::new(domain.clone(), config)?;

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = domain.inputs().sample(10, &mut rng);
    strategy.tell(&Experiments::new(&x, &himmelblau(&x.view()))?)?;

    for iter in 0..10 {
        let candidates = strategy.ask(2, false)?;
        let y = himmelblau(&candidates.x.view());
        println!(
            "iter {iter}: x = {}, y = {}, predicted = {}",
            candidates.x,
            y.column(0),
            candidates.y_pred.column(0)
        );
        strategy.tell(&Experiments::new(&candidates.x, &y)?)?;
    }

    if let Some(exps) = strategy.experiments() {
        let best = exps.y().column(0).argmin()?;
        println!(
            "Best of {} experiments: f({}) = {}",
            exps.nrows(),
            exps.x().row(best),
            exps.y()[[best, 0]]
        );
    }
    Ok(())
}
