//! SDDP on the single-site toy. The uncertain commodity is absent, so
//! every realization sees the same data and the run must reach the
//! deterministic optimum.

mod common;

use common::{approx, single_site, wind_realized, with_battery, with_wind};
use decomp_algo::decomposition::{RealizationConfig, SddpConfig};
use decomp_algo::solver::{ClarabelBackend, SolverSettings};
use decomp_algo::{decompose, solve_normal, DecompositionConfig, Method};
use std::collections::BTreeMap;

const DEMAND: [f64; 4] = [50.0, 60.0, 30.0, 80.0];

fn config(realizations: BTreeMap<String, RealizationConfig>) -> DecompositionConfig {
    DecompositionConfig {
        method: Method::Sddp,
        max_iterations: 30,
        window: 3,
        seed: 7,
        sddp: SddpConfig {
            support_steps: vec![2],
            realizations,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn normal_objective() -> f64 {
    solve_normal(
        &single_site(&DEMAND),
        &ClarabelBackend::new(),
        &SolverSettings::default(),
    )
    .unwrap()
    .objective()
    .unwrap()
}

#[test]
fn default_realization_reaches_normal_optimum() {
    let data = single_site(&DEMAND);
    let result = decompose(
        &data,
        &config(BTreeMap::new()),
        BTreeMap::new(),
        &ClarabelBackend::new(),
    )
    .unwrap();
    let expected = normal_objective();

    assert!(result.converged(), "status {:?}", result.status);
    assert!(result.iterations() >= 3, "window must fill first");
    assert!(
        approx(result.lower_bound, expected, 1e-4),
        "lower bound {} vs normal {}",
        result.lower_bound,
        expected
    );
    let last = result.records.last().unwrap();
    assert!(approx(last.upper_bound_latest.unwrap(), expected, 1e-4));
    assert!(result.residual_lambda.contains_key("stage1-mid"));
}

#[test]
fn weighted_realizations_share_one_cut_per_stage() {
    let realizations = BTreeMap::from([
        (
            "low".to_string(),
            RealizationConfig {
                probability: 0.3,
                factor: -0.5,
            },
        ),
        (
            "high".to_string(),
            RealizationConfig {
                probability: 0.7,
                factor: 0.5,
            },
        ),
    ]);
    let data = single_site(&DEMAND);
    let result = decompose(
        &data,
        &config(realizations),
        BTreeMap::new(),
        &ClarabelBackend::new(),
    )
    .unwrap();
    assert!(approx(result.lower_bound, normal_objective(), 1e-4));
    for cut in &result.cuts {
        assert_eq!(cut.source, "stage1");
    }
    assert_eq!(result.residual_lambda.len(), 2);

    // the stopping window holds only samples that met the master point,
    // so none of them carries the slack penalty
    assert_eq!(result.window, Some(5));
    let tail = &result.records[result.records.len().saturating_sub(5)..];
    for record in tail {
        assert!(record.lambda_max <= config.lambda_epsilon, "lambda {}", record.lambda_max);
        let latest = record.upper_bound_latest.unwrap();
        assert!(
            latest >= windy * (1.0 - 1e-3) && latest <= 2.0 * calm,
            "iteration {}: forward cost {latest} outside [{windy}, {}]",
            record.iteration,
            2.0 * calm
        );
    }
}

#[test]
fn same_seed_same_run() {
    let data = single_site(&DEMAND);
    let backend = ClarabelBackend::new();
    let a = decompose(&data, &config(BTreeMap::new()), BTreeMap::new(), &backend).unwrap();
    let b = decompose(&data, &config(BTreeMap::new()), BTreeMap::new(), &backend).unwrap();
    assert_eq!(a.iterations(), b.iterations());
    for (x, y) in a.records.iter().zip(&b.records) {
        assert!(approx(x.lower_bound, y.lower_bound, 1e-9));
    }
}

#[test]
fn probabilities_must_sum_to_one() {
    let realizations = BTreeMap::from([(
        "only".to_string(),
        RealizationConfig {
            probability: 0.4,
            factor: 0.0,
        },
    )]);
    let data = single_site(&DEMAND);
    assert!(decompose(
        &data,
        &config(realizations),
        BTreeMap::new(),
        &ClarabelBackend::new()
    )
    .is_err());
}

fn realizations(low: f64, high: f64) -> BTreeMap<String, RealizationConfig> {
    BTreeMap::from([
        (
            "low".to_string(),
            RealizationConfig {
                probability: 0.5,
                factor: low,
            },
        ),
        (
            "high".to_string(),
            RealizationConfig {
                probability: 0.5,
                factor: high,
            },
        ),
    ])
}

#[test]
fn battery_state_crosses_the_stage_boundary() {
    let data = with_battery(single_site(&DEMAND), "Mid");
    let backend = ClarabelBackend::new();
    let expected = solve_normal(&data, &backend, &SolverSettings::default())
        .unwrap()
        .objective()
        .unwrap();
    let config = DecompositionConfig {
        max_iterations: 60,
        window: 5,
        ..config(BTreeMap::new())
    };

    let result = decompose(&data, &config, BTreeMap::new(), &backend).unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    for record in &result.records {
        assert!(
            record.lower_bound <= expected * (1.0 + 1e-4),
            "iteration {}: lower bound {} above optimum {}",
            record.iteration,
            record.lower_bound,
            expected
        );
    }
    assert!(
        result.lower_bound >= expected * (1.0 - 1e-3),
        "lower bound {} vs normal {}",
        result.lower_bound,
        expected
    );
    for (stage, lambda) in &result.residual_lambda {
        assert!(*lambda <= config.lambda_epsilon, "{stage} kept slack {lambda}");
    }
}

#[test]
fn wind_realizations_bracket_the_expected_cost() {
    let data = with_wind(single_site(&DEMAND), "Mid", &[0.5, 0.2, 0.6, 0.3]);
    let backend = ClarabelBackend::new();
    let settings = SolverSettings::default();
    let normal = |factor: f64| {
        solve_normal(&wind_realized(&data, 2, factor), &backend, &settings)
            .unwrap()
            .objective()
            .unwrap()
    };
    let calm = normal(-0.5);
    let windy = normal(0.5);
    assert!(windy < calm, "windy {windy} vs calm {calm}");

    let config = DecompositionConfig {
        max_iterations: 80,
        window: 5,
        ..config(realizations(-0.5, 0.5))
    };
    let result = decompose(&data, &config, BTreeMap::new(), &backend).unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    for record in &result.records {
        assert!(
            record.lower_bound <= calm * (1.0 + 1e-4),
            "iteration {}: lower bound {} above the calm optimum {}",
            record.iteration,
            record.lower_bound,
            calm
        );
    }
    assert!(
        result.lower_bound >= windy * (1.0 - 1e-3),
        "lower bound {} below the windy optimum {}",
        result.lower_bound,
        windy
    );
    assert_eq!(result.residual_lambda.len(), 2);

    // the stopping window holds only samples that met the master point,
    // so none of them carries the slack penalty
    assert_eq!(result.window, Some(5));
    let tail = &result.records[result.records.len().saturating_sub(5)..];
    for record in tail {
        assert!(record.lambda_max <= config.lambda_epsilon, "lambda {}", record.lambda_max);
        let latest = record.upper_bound_latest.unwrap();
        assert!(
            latest >= windy * (1.0 - 1e-3) && latest <= 2.0 * calm,
            "iteration {}: forward cost {latest} outside [{windy}, {}]",
            record.iteration,
            2.0 * calm
        );
    }
}

