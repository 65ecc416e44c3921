use std::num::NonZeroUsize;

use log::info;
use ndarray::ArrayView1;

/// What gets handed to a [`Reporter`] every so many examples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    /// Mean cost of the examples processed since the previous report.
    pub average_cost: f64,
    /// First output of the last example processed.
    pub sample_output: f64,
    /// First expected value of the last example processed.
    pub sample_expected: f64,
}

/// A sink for training reports.
pub trait Reporter: Send {
    fn report(&mut self, report: &TrainingReport);
}

impl<F> Reporter for F
where
    F: FnMut(&TrainingReport) + Send,
{
    fn report(&mut self, report: &TrainingReport) {
        self(report)
    }
}

/// Writes every report to the log at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: &TrainingReport) {
        info!(
            average_cost = report.average_cost,
            sample_output = report.sample_output,
            sample_expected = report.sample_expected;
            "training progress"
        );
    }
}

/// Running cost totals of a set of examples.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct CostSummary {
    pub(crate) total: f64,
    pub(crate) count: usize,
    pub(crate) sample: Option<(f64, f64)>,
}

impl CostSummary {
    /// Records one processed example.
    pub(crate) fn record(
        &mut self,
        cost: f64,
        output: ArrayView1<f64>,
        expected: ArrayView1<f64>,
    ) {
        self.total += cost;
        self.count += 1;
        self.sample = output.first().copied().zip(expected.first().copied());
    }

    /// Joins two summaries, `other` being the most recent one.
    pub(crate) fn combine(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            count: self.count + other.count,
            sample: other.sample.or(self.sample),
        }
    }

    pub(crate) fn mean(&self) -> f64 {
        match self.count {
            0 => 0.,
            n => self.total / n as f64,
        }
    }
}

/// Aggregates the costs of trained examples and reports them periodically.
pub struct Telemetry {
    every: NonZeroUsize,
    pending: CostSummary,
    reporter: Box<dyn Reporter>,
}

impl Telemetry {
    /// Creates a new `Telemetry`.
    ///
    /// # Arguments
    /// * `every` - The amount of examples between reports.
    /// * `reporter` - Where reports are sent.
    ///
    /// # Returns
    /// A new `Telemetry` instance.
    pub fn new<R: Reporter + 'static>(every: NonZeroUsize, reporter: R) -> Self {
        Self {
            every,
            pending: CostSummary::default(),
            reporter: Box::new(reporter),
        }
    }

    /// Adds the costs of a training step, reporting once enough examples piled up.
    pub(crate) fn record(&mut self, summary: CostSummary) {
        self.pending = self.pending.combine(summary);

        if self.pending.count < self.every.get() {
            return;
        }

        let (sample_output, sample_expected) = self.pending.sample.unwrap_or((f64::NAN, f64::NAN));
        let report = TrainingReport {
            average_cost: self.pending.mean(),
            sample_output,
            sample_expected,
        };

        self.reporter.report(&report);
        self.pending = CostSummary::default();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ndarray::array;

    use super::*;

    fn summary(costs: &[f64]) -> CostSummary {
        costs.iter().fold(CostSummary::default(), |mut acc, &c| {
            acc.record(c, array![c * 10.].view(), array![c].view());
            acc
        })
    }

    #[test]
    fn summaries_combine_in_order() {
        let summary = summary(&[1., 2.]).combine(summary(&[3.]));

        assert_eq!(summary.count, 3);
        assert_eq!(summary.mean(), 2.);
        assert_eq!(summary.sample, Some((30., 3.)));
        assert_eq!(CostSummary::default().mean(), 0.);
    }

    #[test]
    fn reports_every_n_examples() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);

        let every = NonZeroUsize::new(3).unwrap();
        let mut telemetry = Telemetry::new(every, move |r: &TrainingReport| {
            sink.lock().unwrap().push(*r);
        });

        telemetry.record(summary(&[1., 2.]));
        assert!(reports.lock().unwrap().is_empty());

        telemetry.record(summary(&[6.]));
        telemetry.record(summary(&[4.]));

        let reports = reports.lock().unwrap();
        assert_eq!(
            *reports,
            [TrainingReport {
                average_cost: 3.,
                sample_output: 60.,
                sample_expected: 6.,
            }]
        );
    }
}
