use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Smallest positive `f64`, keeps `Mape` defined when both values of a pair are zero.
const TINY: f64 = 5e-324;

/// The cost functions used to compare a network's output to the expected one.
///
/// `CrossEntropy` and `Mape` keep their historical derivatives, which are not the exact
/// gradients of their costs: weight files trained with them must keep behaving the same.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostFn {
    #[default]
    Mse,
    CrossEntropy,
    Msle,
    Mape,
}
use CostFn::*;

impl CostFn {
    /// Every cost function, in declaration order.
    pub const ALL: [CostFn; 4] = [Mse, CrossEntropy, Msle, Mape];

    /// Computes the cost of a prediction.
    ///
    /// # Arguments
    /// * `output` - The network's output.
    /// * `expected` - The expected output, same length as `output`.
    ///
    /// # Returns
    /// The cost of `output`.
    pub fn cost(&self, output: ArrayView1<f64>, expected: ArrayView1<f64>) -> f64 {
        let n = output.len() as f64;
        let pairs = output.iter().zip(expected.iter());

        match self {
            Mse => pairs.map(|(o, e)| (o - e).powi(2)).sum::<f64>() / n,
            // one-hot targets only, anything else costs a flat 1
            CrossEntropy => expected
                .iter()
                .position(|&e| e == 1.)
                .map_or(1., |k| -output[k].ln()),
            Msle => pairs
                .map(|(o, e)| ((o + 1.).ln() - (e + 1.).ln()).powi(2))
                .sum(),
            Mape => pairs.map(|(o, e)| ((e - o) / (e + TINY)).abs()).sum::<f64>() / n,
        }
    }

    /// Computes the derivative of the cost with respect to the `i`-th output.
    ///
    /// # Arguments
    /// * `output` - The network's output.
    /// * `expected` - The expected output, same length as `output`.
    /// * `i` - The output node.
    ///
    /// # Returns
    /// `dC / do_i`.
    pub fn derivative(&self, output: ArrayView1<f64>, expected: ArrayView1<f64>, i: usize) -> f64 {
        let (o, e) = (output[i], expected[i]);

        match self {
            Mse => 2. * (o - e) / output.len() as f64,
            CrossEntropy => {
                if e == 0. {
                    1.
                } else {
                    -1. / o
                }
            }
            Msle => 2. * ((o + 1.).ln() - (e + 1.).ln()) / (o + 1.),
            Mape => (o / (e * e) - 1. / e) / self.cost(output, expected),
        }
    }
}
