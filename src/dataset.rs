use std::{num::NonZeroUsize, slice::Chunks};

use ndarray::ArrayView1;
use rand::{Rng, seq::SliceRandom};

/// A single supervised sample: what goes into the network and what should come out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub input: Vec<f64>,
    pub expected: Vec<f64>,
}

impl TrainingExample {
    pub fn new(input: Vec<f64>, expected: Vec<f64>) -> Self {
        Self { input, expected }
    }

    pub fn input(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.input)
    }

    pub fn expected(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.expected)
    }
}

/// Shuffles the examples in place. Training never reorders examples on its own, this is meant
/// to be called between epochs.
pub fn shuffle_examples<R: Rng + ?Sized>(examples: &mut [TrainingExample], rng: &mut R) {
    examples.shuffle(rng);
}

/// Splits the examples in consecutive batches of `batch_size`, the last one holding whatever
/// remains.
pub fn batches(
    examples: &[TrainingExample],
    batch_size: NonZeroUsize,
) -> Chunks<'_, TrainingExample> {
    examples.chunks(batch_size.get())
}
