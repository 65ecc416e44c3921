use std::f64::consts::PI;

use rand::{Rng, distr::Distribution};

/// Standard normal samples drawn with the Box-Muller transform.
///
/// Both uniforms are taken from `(0, 1]` so the logarithm never sees a zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxMuller;

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u1 = 1. - rng.random::<f64>();
        let u2 = 1. - rng.random::<f64>();

        (-2. * u1.ln()).sqrt() * (2. * PI * u2).sin()
    }
}
