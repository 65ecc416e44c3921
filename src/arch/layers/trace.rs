use ndarray::Array1;

/// What a layer computed for one example: kept between the forward and the backward pass.
///
/// A trace belongs to a single example, which is what lets examples of the same batch be
/// processed by different threads.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationTrace {
    pub(crate) z: Array1<f64>,
    pub(crate) a: Array1<f64>,
    pub(crate) grad_memo: Array1<f64>,
}

impl ActivationTrace {
    pub(crate) fn new(z: Array1<f64>, a: Array1<f64>) -> Self {
        Self {
            grad_memo: Array1::zeros(z.len()),
            z,
            a,
        }
    }

    /// The weighted sums of the layer.
    pub fn z(&self) -> &Array1<f64> {
        &self.z
    }

    /// The activations of the layer.
    pub fn a(&self) -> &Array1<f64> {
        &self.a
    }

    /// `dC/dz` for every node, filled in by the backward pass.
    pub fn grad_memo(&self) -> &Array1<f64> {
        &self.grad_memo
    }
}
