//! Noise samplers
//!
//! Randomness comes from the thread-local generator, so samplers may be
//! called from any thread without coordination.

use rand::Rng;

use crate::{OpalError, OpalResult};

fn check_scale(scale: f64) -> OpalResult<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(OpalError::FailedFunction(format!(
            "noise scale must be positive and finite, got {}",
            scale
        )));
    }
    Ok(())
}

/// Sample from Laplace(0, scale) by inverse CDF
pub fn sample_laplace(scale: f64) -> OpalResult<f64> {
    check_scale(scale)?;
    let mut rng = rand::thread_rng();
    // u in (-0.5, 0.5)
    let u: f64 = loop {
        let u = rng.gen::<f64>() - 0.5;
        if u.abs() < 0.5 {
            break u;
        }
    };
    Ok(-scale * u.signum() * (1.0 - 2.0 * u.abs()).ln())
}

/// Sample from N(0, scale²) with the Box-Muller transform
pub fn sample_gaussian(scale: f64) -> OpalResult<f64> {
    check_scale(scale)?;
    let mut rng = rand::thread_rng();
    let u1: f64 = loop {
        let u = rng.gen::<f64>();
        if u > 0.0 {
            break u;
        }
    };
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    Ok(scale * z)
}

/// Sample from the two-sided geometric distribution with
/// `P(k) ∝ exp(-|k| / scale)`, as the difference of two one-sided draws
pub fn sample_two_sided_geometric(scale: f64) -> OpalResult<i128> {
    check_scale(scale)?;
    let mut rng = rand::thread_rng();
    // ln(1 - p) where p is the success probability of each one-sided draw
    let log_q = -1.0 / scale;
    let mut one_sided = || -> i128 {
        let u: f64 = loop {
            let u = rng.gen::<f64>();
            if u > 0.0 {
                break u;
            }
        };
        (u.ln() / log_q).floor() as i128
    };
    Ok(one_sided() - one_sided())
}
