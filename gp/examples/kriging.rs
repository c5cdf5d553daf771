use linfa::prelude::*;
use ndarray::{arr2, concatenate, Array, Array1, Array2, Axis};
use sobox_gp::{cross_val_score, CorrelationKind, GaussianProcess, MeanKind};

fn xsinx(x: &Array2<f64>) -> Array1<f64> {
    ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).column(0).to_owned()
}

fn main() {
    let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
    let yt = xsinx(&xt);

    for corr in [CorrelationKind::SquaredExponential, CorrelationKind::Matern52] {
        let params = GaussianProcess::params(MeanKind::Constant, corr);
        let score = cross_val_score(&params, &xt, &yt, 7).expect("cross validation");
        println!("{corr}: rmse={:.3} q2={:.3}", score.rmse, score.q2);
    }

    println!("Train kriging surrogate of 'xsinx' at {}", xt.column(0));
    let kriging = GaussianProcess::params(MeanKind::Constant, CorrelationKind::SquaredExponential)
        .fit(&Dataset::new(xt, yt))
        .expect("GP fitting");
    println!("{kriging}");

    let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
    let ytest = xsinx(&xtest);
    let (ypred, yvar) = kriging.predict_valvar(&xtest).expect("Kriging prediction");
    let ysigma = yvar.mapv(f64::sqrt);

    println!("Compute prediction errors (x, err(x), sigma(x))");
    println!(
        "{}",
        concatenate![
            Axis(1),
            xtest,
            (ypred - ytest).insert_axis(Axis(1)),
            ysigma.insert_axis(Axis(1))
        ]
    );
}
