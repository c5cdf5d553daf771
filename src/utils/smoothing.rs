use libm::{exp, log, log1p};
use ndarray::{Array1, ArrayView1};

/// `log(1 + exp(x))` without overflow
pub fn softplus(x: f64) -> f64 {
    if x > 20. {
        x
    } else if x < -20. {
        exp(x)
    } else {
        log1p(exp(x))
    }
}

/// `log(tau * softplus(x / tau))`, a smooth approximation of `log(max(x, 0))`
pub fn log_softplus(x: f64, tau: f64) -> f64 {
    let u = x / tau;
    let lsp = if u > 20. {
        log(u)
    } else if u < -20. {
        // softplus(u) ~ exp(u)
        u
    } else {
        log(log1p(exp(u)))
    };
    lsp + log(tau)
}

/// Logistic function `1 / (1 + exp(-x))`
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + exp(-x))
    } else {
        let e = exp(x);
        e / (1. + e)
    }
}

/// `log(sigmoid(x))` without underflow
pub fn log_sigmoid(x: f64) -> f64 {
    -softplus(-x)
}

/// `log(sum(exp(v)))`
pub fn logsumexp(v: &ArrayView1<f64>) -> f64 {
    let vmax = v.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if !vmax.is_finite() {
        return vmax;
    }
    vmax + log(v.fold(0., |acc, &x| acc + exp(x - vmax)))
}

/// `log(mean(exp(v)))`
pub fn logmeanexp(v: &ArrayView1<f64>) -> f64 {
    logsumexp(v) - log(v.len() as f64)
}

/// Smooth maximum `tau * logsumexp(v / tau)`
pub fn smooth_amax(v: &ArrayView1<f64>, tau: f64) -> f64 {
    let scaled: Array1<f64> = v.mapv(|x| x / tau);
    tau * logsumexp(&scaled.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_softplus() {
        assert_abs_diff_eq!(softplus(0.), 2f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(softplus(50.), 50., epsilon = 1e-12);
        assert!(softplus(-800.) >= 0.);
        assert_abs_diff_eq!(log_sigmoid(0.), -(2f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn test_log_softplus_approximates_log_relu() {
        let tau = 1e-6;
        assert_abs_diff_eq!(log_softplus(0.5, tau), 0.5f64.ln(), epsilon = 1e-6);
        assert!(log_softplus(-0.5, tau) < -1e4);
        assert!(log_softplus(-0.5, tau).is_finite());
    }

    #[test]
    fn test_sigmoid() {
        assert_abs_diff_eq!(sigmoid(0.), 0.5);
        assert_abs_diff_eq!(sigmoid(-1000.), 0.);
        assert_abs_diff_eq!(sigmoid(1000.), 1.);
        assert_abs_diff_eq!(sigmoid(2.) + sigmoid(-2.), 1., epsilon = 1e-15);
    }

    #[test]
    fn test_logsumexp() {
        let v = array![1000., 1000.];
        assert_abs_diff_eq!(logsumexp(&v.view()), 1000. + 2f64.ln(), epsilon = 1e-9);
        assert_abs_diff_eq!(logmeanexp(&v.view()), 1000., epsilon = 1e-9);
        let v = array![0.1, 0.3, 0.2];
        assert_abs_diff_eq!(smooth_amax(&v.view(), 1e-3), 0.3, epsilon = 1e-3);
    }
}
