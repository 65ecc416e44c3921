use ndarray::{Array1, Array2, ArrayView1, Zip};
use parking_lot::Mutex;

use crate::{NetErr, Result};

/// The gradient of the cost with respect to one layer's weights and biases, summed over every
/// example that went through a backward pass since it was last cleared.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradient {
    pub(crate) w: Array2<f64>,
    pub(crate) b: Array1<f64>,
}

impl LayerGradient {
    /// Creates a zeroed gradient for a layer of `dim = (in, out)`.
    pub fn zeros(dim: (usize, usize)) -> Self {
        let (nodes_in, nodes_out) = dim;

        Self {
            w: Array2::zeros((nodes_out, nodes_in)),
            b: Array1::zeros(nodes_out),
        }
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.w
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.b
    }

    /// Adds one example's contribution: `w[i][j] += memo[i] * left[j]` and `b[i] += memo[i]`.
    ///
    /// # Arguments
    /// * `grad_memo` - `dC/dz` of the layer's nodes for the example.
    /// * `left` - What the layer received as input for the example.
    pub(crate) fn add_example(&mut self, grad_memo: ArrayView1<f64>, left: ArrayView1<f64>) {
        Zip::from(self.w.rows_mut())
            .and(&grad_memo)
            .for_each(|mut row, &d| row.scaled_add(d, &left));

        self.b += &grad_memo;
    }

    pub(crate) fn merge(&mut self, other: &LayerGradient) {
        self.w += &other.w;
        self.b += &other.b;
    }

    /// Zeroes out the gradient.
    pub fn clear(&mut self) {
        self.w.fill(0.);
        self.b.fill(0.);
    }

    pub fn is_zero(&self) -> bool {
        self.w.iter().chain(self.b.iter()).all(|&g| g == 0.)
    }
}

/// The network-wide gradient buffers every worker of a batch writes into.
///
/// Each layer's buffer has its own lock, so workers only contend when they write to the same
/// layer at the same time.
#[derive(Debug, Default)]
pub struct GradientAccumulator {
    layers: Vec<Mutex<LayerGradient>>,
}

impl GradientAccumulator {
    /// Creates an empty `GradientAccumulator`, with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a zeroed buffer for a layer of `dim = (in, out)`.
    pub(crate) fn push(&mut self, dim: (usize, usize)) {
        self.layers.push(Mutex::new(LayerGradient::zeros(dim)));
    }

    /// The amount of layers this accumulator holds gradients for.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Adds one example's contribution to the `layer`-th buffer, holding its lock for the
    /// whole write.
    pub(crate) fn add_example(
        &self,
        layer: usize,
        grad_memo: ArrayView1<f64>,
        left: ArrayView1<f64>,
    ) {
        self.layers[layer].lock().add_example(grad_memo, left);
    }

    /// Sums a worker's gradients into the shared buffers, one layer lock at a time.
    ///
    /// # Arguments
    /// * `grads` - One gradient per layer, in order.
    ///
    /// # Returns
    /// An error if `grads` doesn't have one gradient per layer.
    pub fn accumulate(&self, grads: &[LayerGradient]) -> Result<()> {
        if grads.len() != self.layers.len() {
            return Err(NetErr::InputShapeMismatch {
                what: "gradient layers",
                got: grads.len(),
                expected: self.layers.len(),
            });
        }

        for (acc, grad) in self.layers.iter().zip(grads) {
            acc.lock().merge(grad);
        }

        Ok(())
    }

    /// Gives exclusive access to every buffer. No worker can be writing while this borrow is
    /// alive, so no lock is taken.
    pub(crate) fn layers_mut(&mut self) -> impl Iterator<Item = &mut LayerGradient> {
        self.layers.iter_mut().map(Mutex::get_mut)
    }

    /// Returns a copy of the `layer`-th buffer.
    pub fn snapshot(&self, layer: usize) -> Option<LayerGradient> {
        self.layers.get(layer).map(|grad| grad.lock().clone())
    }

    pub fn is_zero(&self) -> bool {
        self.layers.iter().all(|grad| grad.lock().is_zero())
    }
}
