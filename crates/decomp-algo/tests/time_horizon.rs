//! Time-horizon decomposition against the whole-model solve.

mod common;

use common::{approx, single_site, two_sites, with_battery};
use decomp_core::ModelData;
use decomp_algo::decomposition::{Coordinator, Phase, TimeHorizonConfig};
use decomp_algo::model::{SubPass, CAP_PRO};
use decomp_algo::solver::{ClarabelBackend, SolverSettings};
use decomp_algo::{
    decompose, solve_normal, CouplingPolicy, DecompositionConfig, Method, TimeHorizon,
};
use std::collections::BTreeMap;

fn config(support_steps: Vec<u32>) -> DecompositionConfig {
    DecompositionConfig {
        method: Method::TimeHorizon,
        max_iterations: 20,
        time_horizon: TimeHorizonConfig { support_steps },
        ..Default::default()
    }
}

#[test]
fn one_support_step_matches_normal() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let backend = ClarabelBackend::new();
    let normal = solve_normal(&data, &backend, &SolverSettings::default()).unwrap();
    let expected = normal.objective().unwrap();

    let result = decompose(&data, &config(vec![2]), BTreeMap::new(), &backend).unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    assert!(result.iterations() <= 5, "{} iterations", result.iterations());
    assert!(
        approx(result.total_cost, expected, 1e-4),
        "decomposed {} vs normal {}",
        result.total_cost,
        expected
    );
    let cap = result
        .capacities
        .iter()
        .find(|c| c.variable == CAP_PRO)
        .unwrap();
    assert!(approx(cap.value, 80.0, 1e-4), "cap = {}", cap.value);
}

#[test]
fn bounds_move_monotonically() {
    let data = single_site(&[50.0, 80.0, 30.0, 60.0]);
    let backend = ClarabelBackend::new();
    let result = decompose(&data, &config(vec![2]), BTreeMap::new(), &backend).unwrap();
    for pair in result.records.windows(2) {
        let scale = pair[0].upper_bound.abs().max(1.0);
        assert!(pair[1].lower_bound >= pair[0].lower_bound - 1e-6 * scale);
        assert!(pair[1].upper_bound <= pair[0].upper_bound);
    }
    for record in &result.records {
        let scale = record.upper_bound.abs().max(1.0);
        assert!(record.gap >= -1e-6 * scale, "gap {}", record.gap);
    }
}

#[test]
fn coordinator_walks_the_phases() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let backend = ClarabelBackend::new();
    let config = config(vec![2]);
    let policy = TimeHorizon::new(&data, &[2]).unwrap();
    let mut coordinator = Coordinator::new(&policy, &config, &backend, None);

    assert_eq!(coordinator.phase(), Phase::Init);
    assert_eq!(coordinator.step().unwrap(), Phase::BuildMaster);
    assert_eq!(coordinator.subs().len(), 2);
    assert_eq!(coordinator.step().unwrap(), Phase::SolveMaster);
    assert_eq!(coordinator.step().unwrap(), Phase::SyncSubs);
    assert_eq!(coordinator.iteration(), 1);
    assert_eq!(coordinator.step().unwrap(), Phase::SolveSubs);
    assert_eq!(coordinator.step().unwrap(), Phase::GenerateCuts);
    assert_eq!(coordinator.step().unwrap(), Phase::CheckConvergence);
    let next = coordinator.step().unwrap();
    assert!(matches!(
        next,
        Phase::SolveMaster | Phase::Converged | Phase::IterationLimitReached
    ));

    let result = coordinator.run().unwrap();
    assert!(result.converged());
}

#[test]
fn cuts_from_converged_subs_are_redundant() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let backend = ClarabelBackend::new();
    let config = config(vec![2]);
    let policy = TimeHorizon::new(&data, &[2]).unwrap();
    let mut coordinator = Coordinator::new(&policy, &config, &backend, None);
    while !coordinator.phase().is_terminal() {
        coordinator.step().unwrap();
    }
    assert_eq!(coordinator.phase(), Phase::Converged);

    let master = coordinator.master().unwrap();
    let scale = master.objective().unwrap().abs().max(1.0);
    for sub in coordinator.subs() {
        assert_eq!(sub.pass, SubPass::Cost, "{} still needs slack", sub.name);
        let cut = policy
            .generate_cut(sub, master, coordinator.iteration() + 1, config.lambda_epsilon)
            .unwrap();
        if let Some(cut) = cut {
            let violation = cut.violation(master).unwrap();
            assert!(
                violation <= 1e-5 * scale,
                "{} cuts off the master by {violation}",
                sub.name
            );
        }
    }
}

#[test]
fn converged_subs_leave_no_slack() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let backend = ClarabelBackend::new();
    let result = decompose(&data, &config(vec![2]), BTreeMap::new(), &backend).unwrap();
    assert_eq!(result.residual_lambda.len(), 2);
    assert!(result.residual_lambda.contains_key("t0-t2"));
    for lambda in result.residual_lambda.values() {
        assert!(*lambda < 1e-4, "lambda {lambda}");
    }
}

#[test]
fn readable_cuts_scale_eta_to_one() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let backend = ClarabelBackend::new();
    let config = DecompositionConfig {
        readable_cuts: true,
        ..config(vec![2])
    };
    let result = decompose(&data, &config, BTreeMap::new(), &backend).unwrap();
    for cut in &result.cuts {
        if let Some((_, coef)) = cut.coefficients.iter().find(|(l, _)| l.var == "eta") {
            assert!((coef.abs() - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn unknown_support_step_is_a_configuration_error() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let err = decompose(
        &data,
        &config(vec![7]),
        BTreeMap::new(),
        &ClarabelBackend::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("7"), "{err}");
}

/// Decompose `data` and hold the run to the whole-model optimum: the lower
/// bound never passes it, the reported cost matches it and no sub keeps
/// coupling slack.
fn assert_matches_normal(data: &ModelData, support_steps: Vec<u32>) {
    let backend = ClarabelBackend::new();
    let expected = solve_normal(data, &backend, &SolverSettings::default())
        .unwrap()
        .objective()
        .unwrap();
    let config = DecompositionConfig {
        max_iterations: 100,
        tolerance: 1e-5,
        ..config(support_steps)
    };

    let result = decompose(data, &config, BTreeMap::new(), &backend).unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    assert!(
        approx(result.total_cost, expected, 1e-4),
        "decomposed {} vs normal {}",
        result.total_cost,
        expected
    );
    for record in &result.records {
        assert!(
            record.lower_bound <= expected + 1e-6 * expected.abs(),
            "iteration {}: lower bound {} above optimum {}",
            record.iteration,
            record.lower_bound,
            expected
        );
    }
    for (sub, lambda) in &result.residual_lambda {
        assert!(*lambda <= 1e-4, "{sub} kept slack {lambda}");
    }
}

#[test]
fn battery_state_is_handed_across_blocks() {
    let data = with_battery(single_site(&[50.0, 80.0, 30.0, 60.0]), "Mid");
    assert_matches_normal(&data, vec![2]);
}

#[test]
fn battery_next_to_a_link_matches_normal() {
    let data = with_battery(two_sites(), "South");
    assert_matches_normal(&data, vec![1]);
}

#[test]
fn plant_only_model_matches_normal_with_two_cuts() {
    assert_matches_normal(&single_site(&[50.0, 80.0, 30.0, 60.0, 70.0]), vec![2, 4]);
}
