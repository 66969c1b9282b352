use serde::{Deserialize, Serialize};

use crate::integrator::Trajectory;
use crate::matrix::Matrix;

/// A read-only summary of how a simulation behaved numerically.
///
/// Design intent:
/// - Observers cannot alter the simulation; they only look at its outputs.
/// - Divergence is reported, never repaired, so results stay reproducible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub samples: usize,
    pub non_finite_values: usize,
    /// Index of the first sample holding a NaN/Inf, if any.
    pub first_non_finite_sample: Option<usize>,
    pub max_abs_excitatory: f64,
    pub non_finite_fc_entries: usize,
}

impl StabilityReport {
    pub fn is_unstable(&self) -> bool {
        self.non_finite_values > 0 || self.non_finite_fc_entries > 0
    }
}

pub struct TrajectoryObserver<'a> {
    traj: &'a Trajectory,
}

impl<'a> TrajectoryObserver<'a> {
    pub fn new(traj: &'a Trajectory) -> Self {
        Self { traj }
    }

    pub fn report(&self) -> StabilityReport {
        let n = self.traj.node_count();
        let mut report = StabilityReport {
            samples: self.traj.len(),
            ..StabilityReport::default()
        };

        for t in 0..self.traj.len() {
            let sample = self.traj.sample(t);
            let bad = sample.iter().filter(|v| !v.is_finite()).count();
            if bad > 0 && report.first_non_finite_sample.is_none() {
                report.first_non_finite_sample = Some(t);
            }
            report.non_finite_values += bad;

            for &e in &sample[..n] {
                if e.is_finite() {
                    report.max_abs_excitatory = report.max_abs_excitatory.max(e.abs());
                }
            }
        }
        report
    }

    /// Same report, also counting non-finite entries of the derived FC.
    pub fn report_with_fc(&self, fc: &Matrix) -> StabilityReport {
        let mut report = self.report();
        report.non_finite_fc_entries = fc.as_slice().iter().filter(|v| !v.is_finite()).count();
        report
    }
}
