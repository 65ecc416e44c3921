use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// The activation functions a layer can apply to its weighted sums.
///
/// Every function receives the whole pre-activation vector `z` and the index of the node to
/// evaluate, since `Softmax` depends on every node of the layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActFn {
    Sigmoid,
    TanH,
    ReLU,
    SiLU,
    Softmax,
    #[default]
    Linear,
}
use ActFn::*;

impl ActFn {
    /// Every activation function, in declaration order.
    pub const ALL: [ActFn; 6] = [Sigmoid, TanH, ReLU, SiLU, Softmax, Linear];

    /// Activates the `i`-th node of the layer.
    ///
    /// # Arguments
    /// * `z` - The pre-activation values of the whole layer.
    /// * `i` - The node to activate.
    ///
    /// # Returns
    /// The activated value of the node.
    pub fn activate(&self, z: ArrayView1<f64>, i: usize) -> f64 {
        match self {
            Sigmoid => sigmoid(z[i]),
            TanH => tanh(z[i]),
            ReLU => z[i].max(0.),
            SiLU => z[i] * sigmoid(z[i]),
            Softmax => {
                let sum = exp_sum(z);
                z[i].exp() / sum
            }
            Linear => z[i],
        }
    }

    /// Computes the derivative of the activation of the `i`-th node with respect to its
    /// pre-activation value.
    ///
    /// # Arguments
    /// * `z` - The pre-activation values of the whole layer.
    /// * `i` - The node to differentiate.
    ///
    /// # Returns
    /// `da_i / dz_i`.
    pub fn derivative(&self, z: ArrayView1<f64>, i: usize) -> f64 {
        match self {
            Sigmoid => {
                let a = sigmoid(z[i]);
                a * (1. - a)
            }
            TanH => {
                let t = tanh(z[i]);
                1. - t * t
            }
            ReLU => {
                if z[i] > 0. {
                    1.
                } else {
                    0.
                }
            }
            SiLU => {
                let s = sigmoid(z[i]);
                z[i] * s * (1. - s) + s
            }
            Softmax => {
                let sum = exp_sum(z);
                let ex = z[i].exp();
                (ex * sum - ex * ex) / (sum * sum)
            }
            Linear => 1.,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1. / (1. + (-z).exp())
}

// The ratio turns into inf / inf for large |z|.
fn tanh(z: f64) -> f64 {
    let (pos, neg) = (z.exp(), (-z).exp());
    let t = (pos - neg) / (pos + neg);

    if t.is_nan() { z.signum() } else { t }
}

fn exp_sum(z: ArrayView1<f64>) -> f64 {
    z.iter().map(|z| z.exp()).sum()
}
