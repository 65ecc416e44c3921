use ndarray::{Array1, Array2, ArrayView1, Zip};
use rand::{Rng, distr::Distribution};

use super::ActivationTrace;
use crate::{
    NetErr::InputShapeMismatch,
    Result,
    arch::{activations::ActFn, init::BoxMuller},
    training::LayerGradient,
};

/// A fully connected layer.
///
/// The weights are stored as an `(out, in)` matrix, so `w[[i, j]]` connects the `j`-th input
/// with the `i`-th node of this layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Dense {
    act_fn: ActFn,
    w: Array2<f64>,
    b: Array1<f64>,

    // Momentum state
    w_velocity: Array2<f64>,
    b_velocity: Array1<f64>,
}

impl Dense {
    /// Creates a new `Dense` layer with gaussian weights and zeroed biases.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer, in that order.
    /// * `act_fn` - The activation function of the layer.
    /// * `rng` - The source of randomness for the weights.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new<R: Rng + ?Sized>(dim: (usize, usize), act_fn: ActFn, rng: &mut R) -> Self {
        let (nodes_in, nodes_out) = dim;
        let w =
            Array2::from_shape_simple_fn((nodes_out, nodes_in), || BoxMuller.sample(&mut *rng));

        Self::with_params(w, Array1::zeros(nodes_out), act_fn)
    }

    /// Creates a new `Dense` layer out of existing parameters.
    ///
    /// # Arguments
    /// * `w` - The `(out, in)` weight matrix.
    /// * `b` - The biases, one per output node.
    /// * `act_fn` - The activation function of the layer.
    ///
    /// # Returns
    /// A new `Dense` instance or an error if `b` doesn't have one value per row of `w`.
    pub fn from_params(w: Array2<f64>, b: Array1<f64>, act_fn: ActFn) -> Result<Self> {
        if w.nrows() != b.len() {
            return Err(InputShapeMismatch {
                what: "biases",
                got: b.len(),
                expected: w.nrows(),
            });
        }

        Ok(Self::with_params(w, b, act_fn))
    }

    fn with_params(w: Array2<f64>, b: Array1<f64>, act_fn: ActFn) -> Self {
        Self {
            act_fn,
            w_velocity: Array2::zeros(w.dim()),
            b_velocity: Array1::zeros(b.len()),
            w,
            b,
        }
    }

    /// The amount of inputs this layer takes.
    pub fn nodes_in(&self) -> usize {
        self.w.ncols()
    }

    /// The amount of nodes of this layer.
    pub fn nodes_out(&self) -> usize {
        self.w.nrows()
    }

    pub fn act_fn(&self) -> ActFn {
        self.act_fn
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.w
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.b
    }

    pub fn weight_velocities(&self) -> &Array2<f64> {
        &self.w_velocity
    }

    pub fn bias_velocities(&self) -> &Array1<f64> {
        &self.b_velocity
    }

    pub(crate) fn set_weight(&mut self, (i, j): (usize, usize), value: f64, velocity: f64) {
        self.w[[i, j]] = value;
        self.w_velocity[[i, j]] = velocity;
    }

    pub(crate) fn set_bias(&mut self, i: usize, value: f64, velocity: f64) {
        self.b[i] = value;
        self.b_velocity[i] = velocity;
    }

    /// Evaluates the layer on `x`. The caller guarantees `x.len() == self.nodes_in()`.
    ///
    /// # Arguments
    /// * `x` - The input of the layer.
    ///
    /// # Returns
    /// The trace of the evaluation, its activations being the output of the layer.
    pub fn forward(&self, x: ArrayView1<f64>) -> ActivationTrace {
        let z = self.w.dot(&x) + &self.b;
        let a = Array1::from_shape_fn(z.len(), |i| self.act_fn.activate(z.view(), i));

        ActivationTrace::new(z, a)
    }

    /// Fills the trace's gradient memo given the derivative of the cost with respect to
    /// this layer's activations.
    ///
    /// # Arguments
    /// * `trace` - The trace this layer produced for the current example.
    /// * `d_a` - `dC/da` for every node of this layer.
    pub(crate) fn delta(&self, trace: &mut ActivationTrace, d_a: ArrayView1<f64>) {
        let ActivationTrace { z, grad_memo, .. } = trace;

        for (i, memo) in grad_memo.iter_mut().enumerate() {
            *memo = d_a[i] * self.act_fn.derivative(z.view(), i);
        }
    }

    /// Computes `dC/da` for the layer on the left, weighting this layer's gradient memo by
    /// the transposed weights.
    pub(crate) fn propagate(&self, grad_memo: ArrayView1<f64>) -> Array1<f64> {
        self.w.t().dot(&grad_memo)
    }

    /// Updates the parameters with the given gradient and zeroes it out.
    ///
    /// Velocities follow `v = momentum * v + scale * g` and parameters `p -= learn_rate * v`, so
    /// a momentum of `0` is a plain gradient descent step.
    ///
    /// # Arguments
    /// * `learn_rate` - The length of the step.
    /// * `momentum` - How much of the previous velocity is kept.
    /// * `scale` - Turns the accumulated sum into a mean, `1 / n` for a batch of `n` examples.
    /// * `grad` - The gradient accumulated for this layer.
    ///
    /// # Returns
    /// An error if `grad` doesn't have the shape of this layer.
    pub fn apply(
        &mut self,
        learn_rate: f64,
        momentum: f64,
        scale: f64,
        grad: &mut LayerGradient,
    ) -> Result<()> {
        if grad.w.dim() != self.w.dim() {
            return Err(InputShapeMismatch {
                what: "gradient",
                got: grad.w.len(),
                expected: self.w.len(),
            });
        }

        let step = |p: &mut f64, v: &mut f64, &g: &f64| {
            *v = momentum * *v + scale * g;
            *p -= learn_rate * *v;
        };

        Zip::from(&mut self.w)
            .and(&mut self.w_velocity)
            .and(&grad.w)
            .for_each(step);

        Zip::from(&mut self.b)
            .and(&mut self.b_velocity)
            .and(&grad.b)
            .for_each(step);

        grad.clear();
        Ok(())
    }
}
