use std::{num::NonZeroUsize, path::Path};

use log::debug;
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use super::{
    Topology,
    activations::ActFn,
    layers::{ActivationTrace, Dense},
    loss::CostFn,
};
use crate::{
    NetErr, Result,
    dataset::{TrainingExample, batches},
    storage::weight_file,
    training::{
        CostSummary, GradientAccumulator, HyperParameters, LayerGradient, LogReporter, Telemetry,
    },
};

/// A sequential network: information flows forward when computing an output and backward when
/// computing the gradients of its layers.
///
/// Examples of a batch are spread over a worker pool, each worker keeping its own traces and
/// partial gradients. Those are summed into the network's [`GradientAccumulator`] and applied
/// once every worker is done.
pub struct Sequential {
    input_size: usize,
    layers: Vec<Dense>,
    cost_fn: CostFn,
    momentum: f64,
    accumulator: GradientAccumulator,
    pool: Option<ThreadPool>,
    telemetry: Option<Telemetry>,
}

impl Sequential {
    /// Creates a new `Sequential` with no layers, trained with plain gradient descent on the
    /// global worker pool.
    ///
    /// # Arguments
    /// * `input_size` - The amount of inputs of the network.
    /// * `cost_fn` - The cost function to minimize.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new(input_size: usize, cost_fn: CostFn) -> Self {
        Self {
            input_size,
            layers: Vec::new(),
            cost_fn,
            momentum: 0.,
            accumulator: GradientAccumulator::new(),
            pool: None,
            telemetry: None,
        }
    }

    /// Creates a new `Sequential` with no layers, configured out of the given hyper parameters.
    ///
    /// A dedicated worker pool is built if `params.workers` is set, and training progress is
    /// logged if `params.report_every` is.
    ///
    /// # Arguments
    /// * `input_size` - The amount of inputs of the network.
    /// * `cost_fn` - The cost function to minimize.
    /// * `params` - The hyper parameters.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if the parameters are invalid.
    pub fn with_hyper_parameters(
        input_size: usize,
        cost_fn: CostFn,
        params: &HyperParameters,
    ) -> Result<Self> {
        params.validate()?;

        let pool = params
            .workers
            .map(|workers| ThreadPoolBuilder::new().num_threads(workers.get()).build())
            .transpose()
            .map_err(|e| NetErr::Config(format!("failed to build the worker pool: {e}")))?;

        let telemetry = params
            .report_every
            .map(|every| Telemetry::new(every, LogReporter));

        Ok(Self {
            momentum: params.momentum,
            pool,
            telemetry,
            ..Self::new(input_size, cost_fn)
        })
    }

    /// Replaces the telemetry of the network.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn cost_fn(&self) -> CostFn {
        self.cost_fn
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Dense] {
        &mut self.layers
    }

    /// The gradients accumulated since the last update.
    pub fn accumulator(&self) -> &GradientAccumulator {
        &self.accumulator
    }

    /// The amount of outputs of the network, its input size while it has no layers.
    pub fn nodes_out(&self) -> usize {
        self.layers
            .last()
            .map_or(self.input_size, |layer| layer.nodes_out())
    }

    pub fn topology(&self) -> Topology {
        let layers = self
            .layers
            .iter()
            .map(|layer| (layer.nodes_out(), layer.nodes_in()))
            .collect();

        Topology::new(self.input_size, layers)
    }

    /// Appends a layer at the end of the network.
    ///
    /// # Arguments
    /// * `layer` - The new layer, its inputs must match the current outputs of the network.
    ///
    /// # Returns
    /// An error if the layer doesn't fit.
    pub fn add_layer(&mut self, layer: Dense) -> Result<()> {
        expect_len("layer inputs", layer.nodes_in(), self.nodes_out())?;
        self.push(layer);
        Ok(())
    }

    /// Appends one randomly initialized layer per entry of `sizes`, chaining each one to the
    /// previous.
    ///
    /// # Arguments
    /// * `act_fn` - The activation function of the new layers.
    /// * `sizes` - The amount of nodes of every new layer.
    /// * `rng` - The source of randomness for the weights.
    pub fn add_layers<R: Rng + ?Sized>(&mut self, act_fn: ActFn, sizes: &[usize], rng: &mut R) {
        for &size in sizes {
            let layer = Dense::new((self.nodes_out(), size), act_fn, rng);
            self.push(layer);
        }
    }

    fn push(&mut self, layer: Dense) {
        debug!(nodes_in = layer.nodes_in(), nodes_out = layer.nodes_out(); "adding layer");
        self.accumulator.push((layer.nodes_in(), layer.nodes_out()));
        self.layers.push(layer);
    }

    /// Computes the output of the network for the given input.
    ///
    /// # Arguments
    /// * `input` - One value per input of the network.
    ///
    /// # Returns
    /// The activations of the last layer or an error if the input doesn't fit.
    pub fn predict(&self, input: &[f64]) -> Result<Array1<f64>> {
        if self.layers.is_empty() {
            return Err(NetErr::EmptyNetwork);
        }

        expect_len("input", input.len(), self.input_size)?;

        forward_pass(&self.layers, ArrayView1::from(input))
            .pop()
            .map(|trace| trace.a)
            .ok_or(NetErr::EmptyNetwork)
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `example` - The example to evaluate.
    ///
    /// # Returns
    /// The trace of every layer and the cost of the output, or an error if the example doesn't
    /// fit the network.
    pub fn forward(&self, example: &TrainingExample) -> Result<(Vec<ActivationTrace>, f64)> {
        self.check(example)?;

        let traces = forward_pass(&self.layers, example.input());
        let output = traces.last().ok_or(NetErr::EmptyNetwork)?;
        let cost = self.cost_fn.cost(output.a.view(), example.expected());

        Ok((traces, cost))
    }

    /// Makes a backward pass through the network, adding the example's gradients to the
    /// accumulator. Parameters are left untouched.
    ///
    /// # Arguments
    /// * `traces` - The traces [`Sequential::forward`] produced for `example`.
    /// * `example` - The example being trained on.
    ///
    /// # Returns
    /// An error if the example or the traces don't fit the network.
    pub fn backward(
        &self,
        traces: &mut [ActivationTrace],
        example: &TrainingExample,
    ) -> Result<()> {
        self.check(example)?;
        expect_len("traces", traces.len(), self.layers.len())?;

        for (layer, trace) in self.layers.iter().zip(traces.iter()) {
            let nodes = layer.nodes_out();
            expect_len("trace pre-activations", trace.z.len(), nodes)?;
            expect_len("trace activations", trace.a.len(), nodes)?;
            expect_len("trace gradient memo", trace.grad_memo.len(), nodes)?;
        }

        deltas(&self.layers, self.cost_fn, traces, example.expected());

        for (l, trace) in traces.iter().enumerate() {
            let left = left_activations(example, traces, l);
            self.accumulator.add_example(l, trace.grad_memo.view(), left);
        }

        Ok(())
    }

    /// Trains the network on a single example, updating the parameters right away.
    ///
    /// # Arguments
    /// * `example` - The example to train on.
    /// * `learn_rate` - The learning rate.
    ///
    /// # Returns
    /// The cost of the example before the update, or an error if it doesn't fit the network.
    pub fn train_one(&mut self, example: &TrainingExample, learn_rate: f64) -> Result<f64> {
        let (mut traces, cost) = self.forward(example)?;
        self.backward(&mut traces, example)?;
        self.apply(learn_rate, 1.)?;

        let mut summary = CostSummary::default();
        if let Some(output) = traces.last() {
            summary.record(cost, output.a.view(), example.expected());
        }
        self.report(summary);

        Ok(cost)
    }

    /// Trains the network on a batch of examples, processed in parallel. The parameters are
    /// updated once, with the mean gradient of the batch.
    ///
    /// Every example is checked before any work is done, so an error leaves the network as it
    /// was. An empty batch is a no-op.
    ///
    /// # Arguments
    /// * `examples` - The batch.
    /// * `learn_rate` - The learning rate.
    ///
    /// # Returns
    /// The mean cost of the batch before the update, or an error if an example doesn't fit the
    /// network.
    pub fn train_batch(&mut self, examples: &[TrainingExample], learn_rate: f64) -> Result<f64> {
        if examples.is_empty() {
            return Ok(0.);
        }

        for example in examples {
            self.check(example)?;
        }

        let layers = &self.layers;
        let cost_fn = self.cost_fn;
        let accumulator = &self.accumulator;

        let job = || {
            examples
                .par_iter()
                .fold(
                    || Partial::new(layers),
                    |mut partial, example| {
                        partial.add(layers, cost_fn, example);
                        partial
                    },
                )
                .map(|partial| -> Result<CostSummary> {
                    accumulator.accumulate(&partial.grads)?;
                    Ok(partial.summary)
                })
                .try_reduce(CostSummary::default, |a, b| Ok(a.combine(b)))
        };

        let summary = match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }?;

        self.apply(learn_rate, 1. / examples.len() as f64)?;

        let cost = summary.mean();
        debug!(examples = examples.len(), cost = cost; "batch applied");
        self.report(summary);

        Ok(cost)
    }

    /// Trains the network on consecutive batches of the dataset, in order.
    ///
    /// # Arguments
    /// * `examples` - The dataset.
    /// * `batch_size` - The size of every batch, the last one holds the remainder.
    /// * `learn_rate` - The learning rate.
    ///
    /// # Returns
    /// The mean cost over the dataset, or an error if an example doesn't fit the network. In
    /// that case no batch is trained.
    pub fn train_dataset(
        &mut self,
        examples: &[TrainingExample],
        batch_size: NonZeroUsize,
        learn_rate: f64,
    ) -> Result<f64> {
        for example in examples {
            self.check(example)?;
        }

        let mut total = 0.;
        for batch in batches(examples, batch_size) {
            total += self.train_batch(batch, learn_rate)? * batch.len() as f64;
        }

        if examples.is_empty() {
            return Ok(0.);
        }

        Ok(total / examples.len() as f64)
    }

    /// Writes the network's parameters to a weight file, creating it if needed.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        weight_file::save(self, path)
    }

    /// Reads the network's parameters from a weight file written for the same topology.
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        weight_file::load(self, path)
    }

    fn check(&self, example: &TrainingExample) -> Result<()> {
        let last = self.layers.last().ok_or(NetErr::EmptyNetwork)?;

        expect_len("input", example.input.len(), self.input_size)?;
        expect_len("expected output", example.expected.len(), last.nodes_out())
    }

    /// Steps every layer with its accumulated gradient, scaled by `scale` first.
    fn apply(&mut self, learn_rate: f64, scale: f64) -> Result<()> {
        let momentum = self.momentum;

        for (layer, grad) in self.layers.iter_mut().zip(self.accumulator.layers_mut()) {
            layer.apply(learn_rate, momentum, scale, grad)?;
        }

        Ok(())
    }

    fn report(&mut self, summary: CostSummary) {
        if let Some(telemetry) = &mut self.telemetry {
            telemetry.record(summary);
        }
    }
}

/// The gradients and costs a single worker piled up.
struct Partial {
    grads: Vec<LayerGradient>,
    summary: CostSummary,
}

impl Partial {
    fn new(layers: &[Dense]) -> Self {
        let grads = layers
            .iter()
            .map(|layer| LayerGradient::zeros((layer.nodes_in(), layer.nodes_out())))
            .collect();

        Self {
            grads,
            summary: CostSummary::default(),
        }
    }

    /// Runs the forward and backward passes of an already checked example.
    fn add(&mut self, layers: &[Dense], cost_fn: CostFn, example: &TrainingExample) {
        let mut traces = forward_pass(layers, example.input());
        let Some(output) = traces.last() else {
            return;
        };

        let cost = cost_fn.cost(output.a.view(), example.expected());
        self.summary.record(cost, output.a.view(), example.expected());

        deltas(layers, cost_fn, &mut traces, example.expected());

        for (l, grad) in self.grads.iter_mut().enumerate() {
            let left = left_activations(example, &traces, l);
            grad.add_example(traces[l].grad_memo.view(), left);
        }
    }
}

fn forward_pass(layers: &[Dense], input: ArrayView1<f64>) -> Vec<ActivationTrace> {
    let mut traces: Vec<ActivationTrace> = Vec::with_capacity(layers.len());

    for layer in layers {
        let trace = match traces.last() {
            Some(prev) => layer.forward(prev.a.view()),
            None => layer.forward(input),
        };

        traces.push(trace);
    }

    traces
}

/// Fills the gradient memo of every trace, from the output layer back to the first one.
fn deltas(
    layers: &[Dense],
    cost_fn: CostFn,
    traces: &mut [ActivationTrace],
    expected: ArrayView1<f64>,
) {
    let Some(last) = layers.len().checked_sub(1) else {
        return;
    };

    let output = &mut traces[last];
    let d_a = Array1::from_shape_fn(output.a.len(), |i| {
        cost_fn.derivative(output.a.view(), expected, i)
    });
    layers[last].delta(output, d_a.view());

    for l in (0..last).rev() {
        let d_a = layers[l + 1].propagate(traces[l + 1].grad_memo.view());
        layers[l].delta(&mut traces[l], d_a.view());
    }
}

/// What the `layer`-th layer received as input for the example.
fn left_activations<'a>(
    example: &'a TrainingExample,
    traces: &'a [ActivationTrace],
    layer: usize,
) -> ArrayView1<'a, f64> {
    match layer.checked_sub(1) {
        Some(prev) => traces[prev].a.view(),
        None => example.input(),
    }
}

fn expect_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(NetErr::InputShapeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn network() -> Sequential {
        let mut net = Sequential::new(2, CostFn::Mse);
        let hidden = Dense::from_params(
            array![[0.5, -1.], [1., 1.], [0.25, 0.]],
            array![0., 0.1, -0.2],
            ActFn::Sigmoid,
        )
        .unwrap();
        let output =
            Dense::from_params(array![[1., -0.5, 2.]], array![0.3], ActFn::Linear).unwrap();

        net.add_layer(hidden).unwrap();
        net.add_layer(output).unwrap();
        net
    }

    fn example() -> TrainingExample {
        TrainingExample::new(vec![0.4, -0.7], vec![1.])
    }

    #[test]
    fn add_layer_checks_the_chain() {
        let mut net = Sequential::new(3, CostFn::Mse);
        let mut rng = StdRng::seed_from_u64(0);

        let err = net.add_layer(Dense::new((2, 4), ActFn::ReLU, &mut rng));
        assert!(matches!(
            err,
            Err(NetErr::InputShapeMismatch {
                got: 2,
                expected: 3,
                ..
            })
        ));

        net.add_layers(ActFn::ReLU, &[4, 5], &mut rng);
        net.add_layer(Dense::new((5, 1), ActFn::Linear, &mut rng)).unwrap();

        assert_eq!(net.topology(), Topology::new(3, vec![(4, 3), (5, 4), (1, 5)]));
        assert_eq!(net.accumulator().len(), 3);
        assert_eq!(net.nodes_out(), 1);
    }

    #[test]
    fn empty_networks_refuse_to_run() {
        let mut net = Sequential::new(2, CostFn::Mse);

        assert!(matches!(net.predict(&[1., 2.]), Err(NetErr::EmptyNetwork)));
        assert!(matches!(net.forward(&example()), Err(NetErr::EmptyNetwork)));
        assert!(matches!(net.train_one(&example(), 0.1), Err(NetErr::EmptyNetwork)));
    }

    #[test]
    fn predict_matches_forward() {
        let net = network();
        let (traces, cost) = net.forward(&example()).unwrap();
        let output = net.predict(&example().input).unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(&output, traces[1].a());
        assert_eq!(cost, (output[0] - 1.).powi(2));
    }

    #[test]
    fn backward_only_accumulates() {
        let net = network();
        let before = net.layers().to_vec();

        let (mut traces, _) = net.forward(&example()).unwrap();
        net.backward(&mut traces, &example()).unwrap();

        assert_eq!(net.layers(), before.as_slice());
        assert!(!net.accumulator().is_zero());

        // output layer: dC/dz = 2 * (o - e) for a single linear output
        let o = traces[1].a()[0];
        let memo = traces[1].grad_memo()[0];
        assert_eq!(memo, 2. * (o - 1.));

        let grad = net.accumulator().snapshot(1).unwrap();
        assert_eq!(grad.biases(), &array![memo]);
        assert_eq!(grad.weights().row(0), traces[0].a() * memo);
    }

    #[test]
    fn backward_rejects_foreign_traces() {
        let net = network();
        let (mut traces, _) = net.forward(&example()).unwrap();

        assert!(net.backward(&mut traces[..1], &example()).is_err());
        assert!(net.accumulator().is_zero());

        // same depth, wider hidden layer
        let mut wide = Sequential::new(2, CostFn::Mse);
        let mut rng = StdRng::seed_from_u64(2);
        wide.add_layers(ActFn::Sigmoid, &[4], &mut rng);
        wide.add_layers(ActFn::Linear, &[1], &mut rng);

        let (mut foreign, _) = wide.forward(&example()).unwrap();
        assert!(matches!(
            net.backward(&mut foreign, &example()),
            Err(NetErr::InputShapeMismatch {
                got: 4,
                expected: 3,
                ..
            })
        ));
        assert!(net.accumulator().is_zero());
    }

    #[test]
    fn training_clears_the_accumulator() {
        let mut net = network();
        let before = net.layers().to_vec();

        net.train_one(&example(), 0.1).unwrap();
        assert!(net.accumulator().is_zero());
        assert_ne!(net.layers(), before.as_slice());

        net.train_batch(&[example(), example()], 0.1).unwrap();
        assert!(net.accumulator().is_zero());
    }

    #[test]
    fn empty_batches_are_a_no_op() {
        let mut net = network();
        let before = net.layers().to_vec();

        assert_eq!(net.train_batch(&[], 0.1).unwrap(), 0.);
        assert_eq!(net.train_dataset(&[], NonZeroUsize::MIN, 0.1).unwrap(), 0.);
        assert_eq!(net.layers(), before.as_slice());
    }

    #[test]
    fn dedicated_pool_matches_global_pool() {
        let params = HyperParameters {
            workers: NonZeroUsize::new(3),
            ..Default::default()
        };

        let mut pooled = network();
        pooled.pool = Sequential::with_hyper_parameters(2, CostFn::Mse, &params)
            .unwrap()
            .pool;
        assert!(pooled.pool.is_some());

        let mut global = network();
        let batch = vec![example(); 16];

        let a = pooled.train_batch(&batch, 0.05).unwrap();
        let b = global.train_batch(&batch, 0.05).unwrap();

        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        for (p, g) in pooled.layers().iter().zip(global.layers()) {
            let params = |layer: &Dense| -> Vec<f64> {
                layer.weights().iter().chain(layer.biases()).copied().collect()
            };

            for (x, y) in params(p).into_iter().zip(params(g)) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn invalid_hyper_parameters_are_rejected() {
        let params = HyperParameters {
            momentum: 1.5,
            ..Default::default()
        };

        assert!(matches!(
            Sequential::with_hyper_parameters(2, CostFn::Mse, &params),
            Err(NetErr::Config(_))
        ));
    }
}
