//! Bound bookkeeping and termination tests.

use super::DecompositionError;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

/// Relative change below which two iterates count as equal.
const STABLE_TOL: f64 = 1e-9;

/// Smallest relative slack allowed before crossed bounds are an error.
const CROSSING_TOL: f64 = 1e-6;

/// One row of the iteration table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub eta_or_future_cost: f64,
    /// Largest coupling slack among the subs of the iteration
    pub lambda_max: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub gap: f64,
    pub master_objective: f64,
    /// SDDP: forward-pass cost of this iteration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound_latest: Option<f64>,
    /// SDDP: standard deviation of the upper-bound window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound_stddev: Option<f64>,
}

/// Inputs of one Benders check.
#[derive(Debug, Clone, Default)]
pub struct BendersObservation {
    pub master_objective: f64,
    pub eta: f64,
    pub lambda_max: f64,
    /// Every sub ended with `Λ ≤ ε`, so the master point is implementable
    pub feasible: bool,
    /// `master − eta + Σ sub costs + extra` of this iteration; ignored
    /// unless `feasible`
    pub upper_bound_candidate: f64,
    /// Master values handed to the subs, in a fixed order
    pub decisions: Vec<f64>,
}

#[derive(Debug, Clone)]
enum Criterion {
    Gap { stop_on_stable_capacity: bool },
    Window { size: usize, lambda_epsilon: f64 },
}

/// Tracks bounds across iterations and decides termination.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    tolerance: f64,
    criterion: Criterion,
    upper_bound: f64,
    /// SDDP: forward-pass cost and coupling slack
    window: VecDeque<(f64, f64)>,
    previous: Option<(Vec<f64>, f64)>,
    records: Vec<IterationRecord>,
}

impl ConvergenceTracker {
    /// Gap test `UB − LB ≤ tol · max(1, |UB|)`, optionally also stopping
    /// once capacities and lower bound stop moving.
    pub fn benders(tolerance: f64, stop_on_stable_capacity: bool) -> Self {
        Self::with_criterion(
            tolerance,
            Criterion::Gap {
                stop_on_stable_capacity,
            },
        )
    }

    /// Statistical test over the last `window` forward-pass costs. Only a
    /// window whose passes all kept `Λ ≤ lambda_epsilon` can stop the run.
    pub fn sddp(tolerance: f64, window: usize, lambda_epsilon: f64) -> Self {
        Self::with_criterion(
            tolerance,
            Criterion::Window {
                size: window.max(1),
                lambda_epsilon,
            },
        )
    }

    fn with_criterion(tolerance: f64, criterion: Criterion) -> Self {
        Self {
            tolerance,
            criterion,
            upper_bound: f64::INFINITY,
            window: VecDeque::new(),
            previous: None,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<IterationRecord> {
        self.records
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// `0 ≤ gap ≤ tol · max(1, |scale|)`, up to the crossing slack below
    /// zero. An infinite or NaN gap never passes.
    fn within_gap(&self, gap: f64, scale: f64) -> bool {
        let scale = scale.abs().max(1.0);
        gap.is_finite() && gap >= -self.crossing_slack(scale) && gap <= self.tolerance * scale
    }

    fn crossing_slack(&self, scale: f64) -> f64 {
        self.tolerance.max(CROSSING_TOL) * scale.abs().max(1.0)
    }

    /// Record a Benders iteration; returns the record and whether to stop.
    /// An upper bound below the lower bound means a cut was invalid.
    pub fn observe_benders(
        &mut self,
        iteration: usize,
        obs: BendersObservation,
    ) -> Result<(IterationRecord, bool), DecompositionError> {
        let lower_bound = obs.master_objective;
        if let Some(prev) = self.records.last() {
            let slack = self.tolerance * prev.lower_bound.abs().max(1.0);
            if lower_bound < prev.lower_bound - slack {
                warn!(
                    iteration,
                    previous = prev.lower_bound,
                    current = lower_bound,
                    "lower bound decreased; a cut is invalid"
                );
            }
        }
        if obs.feasible && obs.upper_bound_candidate.is_finite() {
            self.upper_bound = self.upper_bound.min(obs.upper_bound_candidate);
        }
        let gap = self.upper_bound - lower_bound;
        if gap < -self.crossing_slack(self.upper_bound) {
            return Err(DecompositionError::BoundsCrossed {
                iteration,
                lower_bound,
                upper_bound: self.upper_bound,
            });
        }

        let stable = match (&self.criterion, &self.previous) {
            (
                Criterion::Gap {
                    stop_on_stable_capacity: true,
                },
                Some((caps, lb)),
            ) => {
                caps.len() == obs.decisions.len()
                    && caps
                        .iter()
                        .zip(&obs.decisions)
                        .all(|(a, b)| (a - b).abs() <= STABLE_TOL * a.abs().max(1.0))
                    && (lb - lower_bound).abs() <= STABLE_TOL * lb.abs().max(1.0)
            }
            _ => false,
        };
        // a stable master only stops the run once its point is implementable
        let converged = self.within_gap(gap, self.upper_bound)
            || (stable && obs.feasible && self.upper_bound.is_finite());
        self.previous = Some((obs.decisions, lower_bound));

        let record = IterationRecord {
            iteration,
            eta_or_future_cost: obs.eta,
            lambda_max: obs.lambda_max,
            lower_bound,
            upper_bound: self.upper_bound,
            gap,
            master_objective: obs.master_objective,
            upper_bound_latest: None,
            upper_bound_stddev: None,
        };
        self.records.push(record.clone());
        Ok((record, converged))
    }

    /// Record an SDDP iteration whose forward pass cost `forward_cost`
    /// (penalty excluded) and left at most `lambda_max` coupling slack.
    pub fn observe_sddp(
        &mut self,
        iteration: usize,
        master_objective: f64,
        eta: f64,
        lambda_max: f64,
        forward_cost: f64,
    ) -> (IterationRecord, bool) {
        let (size, lambda_epsilon) = match self.criterion {
            Criterion::Window {
                size,
                lambda_epsilon,
            } => (size, lambda_epsilon),
            Criterion::Gap { .. } => (1, f64::INFINITY),
        };
        self.window.push_back((forward_cost, lambda_max));
        while self.window.len() > size {
            self.window.pop_front();
        }
        let (mean, stddev) = mean_stddev(self.window.iter().map(|(cost, _)| *cost));
        self.upper_bound = mean;
        let lower_bound = master_objective;
        let gap = mean - lower_bound;
        let implementable = self.window.iter().all(|(_, lambda)| *lambda <= lambda_epsilon);
        let converged = self.window.len() == size
            && implementable
            && gap.is_finite()
            && gap <= stddev.max(self.tolerance * mean.abs());

        let record = IterationRecord {
            iteration,
            eta_or_future_cost: eta,
            lambda_max,
            lower_bound,
            upper_bound: mean,
            gap,
            master_objective,
            upper_bound_latest: Some(forward_cost),
            upper_bound_stddev: Some(stddev),
        };
        self.records.push(record.clone());
        (record, converged)
    }
}

/// Mean and population standard deviation.
fn mean_stddev(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(lb: f64, ub: f64, caps: &[f64]) -> BendersObservation {
        BendersObservation {
            master_objective: lb,
            upper_bound_candidate: ub,
            feasible: true,
            decisions: caps.to_vec(),
            ..Default::default()
        }
    }

    fn infeasible(lb: f64, ub: f64, caps: &[f64]) -> BendersObservation {
        BendersObservation {
            lambda_max: 44.0,
            feasible: false,
            ..obs(lb, ub, caps)
        }
    }

    #[test]
    fn test_upper_bound_is_running_minimum() {
        let mut tracker = ConvergenceTracker::benders(1e-6, false);
        let (r1, done) = tracker.observe_benders(1, obs(10.0, 50.0, &[1.0])).unwrap();
        assert!(!done);
        assert_eq!(r1.gap, 40.0);
        let (r2, _) = tracker.observe_benders(2, obs(20.0, 70.0, &[2.0])).unwrap();
        assert_eq!(r2.upper_bound, 50.0);
        let (r3, done) = tracker.observe_benders(3, obs(30.0, 30.0, &[3.0])).unwrap();
        assert!(done);
        assert_eq!(r3.gap, 0.0);
    }

    #[test]
    fn test_gap_is_relative_to_upper_bound() {
        let mut tracker = ConvergenceTracker::benders(1e-3, false);
        let (_, done) = tracker.observe_benders(1, obs(1.0e6 - 500.0, 1.0e6, &[])).unwrap();
        assert!(done);
    }

    #[test]
    fn test_infeasible_candidate_is_not_an_upper_bound() {
        let mut tracker = ConvergenceTracker::benders(1e-6, true);
        // the sub still needs slack, so its cheap cost proves nothing
        let (record, done) = tracker
            .observe_benders(1, infeasible(19.99e6, 2.08e6, &[5.0]))
            .unwrap();
        assert!(!done);
        assert!(record.upper_bound.is_infinite());
        assert!(!record.gap.is_finite());
        // a stable but infeasible master does not stop the run either
        let (_, done) = tracker
            .observe_benders(2, infeasible(19.99e6, 2.08e6, &[5.0]))
            .unwrap();
        assert!(!done);
        let (record, done) = tracker
            .observe_benders(3, obs(22.9e6, 22.9e6, &[5.0]))
            .unwrap();
        assert!(done);
        assert_eq!(record.upper_bound, 22.9e6);
    }

    #[test]
    fn test_crossed_bounds_are_an_error() {
        let mut tracker = ConvergenceTracker::benders(1e-6, false);
        let err = tracker
            .observe_benders(1, obs(19.99e6, 2.08e6, &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::BoundsCrossed { iteration: 1, .. }
        ));
    }

    #[test]
    fn test_gap_test_rejects_nan_and_large_negative_gaps() {
        let tracker = ConvergenceTracker::benders(1e-3, false);
        assert!(tracker.within_gap(0.0, 100.0));
        assert!(tracker.within_gap(-0.01, 100.0));
        assert!(!tracker.within_gap(-5.0, 100.0));
        assert!(!tracker.within_gap(f64::NAN, 100.0));
        assert!(!tracker.within_gap(f64::INFINITY, 100.0));
    }

    #[test]
    fn test_stable_capacity_stops() {
        let mut tracker = ConvergenceTracker::benders(1e-9, true);
        let (_, done) = tracker.observe_benders(1, obs(10.0, 20.0, &[5.0, 7.0])).unwrap();
        assert!(!done);
        let (_, done) = tracker.observe_benders(2, obs(10.0, 20.0, &[5.0, 7.0])).unwrap();
        assert!(done);

        let mut tracker = ConvergenceTracker::benders(1e-9, false);
        tracker.observe_benders(1, obs(10.0, 20.0, &[5.0, 7.0])).unwrap();
        let (_, done) = tracker.observe_benders(2, obs(10.0, 20.0, &[5.0, 7.0])).unwrap();
        assert!(!done);
    }

    #[test]
    fn test_sddp_waits_for_full_window() {
        let mut tracker = ConvergenceTracker::sddp(1e-6, 3, 1e-6);
        let (_, done) = tracker.observe_sddp(1, 100.0, 0.0, 0.0, 100.0);
        assert!(!done);
        let (_, done) = tracker.observe_sddp(2, 100.0, 0.0, 0.0, 100.0);
        assert!(!done);
        let (record, done) = tracker.observe_sddp(3, 100.0, 0.0, 0.0, 100.0);
        assert!(done);
        assert_eq!(record.upper_bound_stddev, Some(0.0));
    }

    #[test]
    fn test_sddp_noise_tolerated_by_stddev() {
        let mut tracker = ConvergenceTracker::sddp(1e-9, 2, 1e-6);
        tracker.observe_sddp(1, 95.0, 0.0, 0.0, 90.0);
        let (record, done) = tracker.observe_sddp(2, 95.0, 0.0, 0.0, 110.0);
        assert!((record.upper_bound - 100.0).abs() < 1e-12);
        assert!((record.upper_bound_stddev.unwrap() - 10.0).abs() < 1e-12);
        assert!(done);
    }

    #[test]
    fn test_sddp_window_with_slack_does_not_stop() {
        let mut tracker = ConvergenceTracker::sddp(1e-6, 2, 1e-6);
        tracker.observe_sddp(1, 100.0, 0.0, 0.4168, 90.0);
        let (_, done) = tracker.observe_sddp(2, 100.0, 0.0, 0.0, 110.0);
        assert!(!done);
        // the slack pass leaves the window
        let (_, done) = tracker.observe_sddp(3, 100.0, 0.0, 0.0, 100.0);
        assert!(done);
    }

    #[test]
    fn test_mean_stddev() {
        let (m, s) = mean_stddev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter());
        assert!((m - 5.0).abs() < 1e-12);
        assert!((s - 2.0).abs() < 1e-12);
    }
}
