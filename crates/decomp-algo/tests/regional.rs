//! Regional decomposition of the two-site toy.

mod common;

use common::{approx, harbor_region, two_sites, with_battery};
use decomp_algo::decomposition::{Coordinator, Phase, RegionalConfig};
use decomp_algo::model::Role;
use decomp_algo::solver::{ClarabelBackend, SolverSettings};
use decomp_algo::{decompose, solve_normal, DecompositionConfig, Method, Regional};
use std::collections::BTreeMap;

fn config() -> DecompositionConfig {
    DecompositionConfig {
        method: Method::Regional,
        max_iterations: 40,
        ..Default::default()
    }
}

#[test]
fn one_region_per_site_matches_normal() {
    let data = two_sites();
    let backend = ClarabelBackend::new();
    let normal = solve_normal(&data, &backend, &SolverSettings::default()).unwrap();
    let expected = normal.objective().unwrap();

    let result = decompose(&data, &config(), BTreeMap::new(), &backend).unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    assert!(
        approx(result.total_cost, expected, 1e-4),
        "decomposed {} vs normal {}",
        result.total_cost,
        expected
    );
    assert!(result.lower_bound <= result.total_cost + 1e-6 * expected.abs());
    assert_eq!(
        result.residual_lambda.keys().cloned().collect::<Vec<_>>(),
        vec!["North".to_string(), "South".to_string()]
    );
}

#[test]
fn regions_from_config() {
    let data = two_sites();
    let regions = BTreeMap::from([("Coast".to_string(), vec!["South".to_string()])]);
    let policy = Regional::new(&data, &regions, BTreeMap::new()).unwrap();
    assert_eq!(policy.region_names(), vec!["Coast", "North"]);

    let config = DecompositionConfig {
        regional: RegionalConfig {
            regions,
            coupled_files: BTreeMap::new(),
        },
        ..config()
    };
    let result = decompose(&data, &config, BTreeMap::new(), &ClarabelBackend::new()).unwrap();
    assert!(result.residual_lambda.contains_key("Coast"));
}

#[test]
fn site_in_two_regions_is_rejected() {
    let data = two_sites();
    let regions = BTreeMap::from([
        ("A".to_string(), vec!["South".to_string()]),
        ("B".to_string(), vec!["South".to_string(), "North".to_string()]),
    ]);
    assert!(Regional::new(&data, &regions, BTreeMap::new()).is_err());
}

#[test]
fn battery_in_importing_region_matches_normal() {
    let data = with_battery(two_sites(), "South");
    let backend = ClarabelBackend::new();
    let expected = solve_normal(&data, &backend, &SolverSettings::default())
        .unwrap()
        .objective()
        .unwrap();
    let config = DecompositionConfig {
        max_iterations: 100,
        tolerance: 1e-5,
        ..config()
    };

    let result = decompose(&data, &config, BTreeMap::new(), &backend).unwrap();
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
    for (region, lambda) in &result.residual_lambda {
        assert!(*lambda <= 1e-4, "{region} kept slack {lambda}");
    }
}

#[test]
fn region_from_own_directory_matches_merged_model() {
    let (master, harbor, merged) = harbor_region();
    let backend = ClarabelBackend::new();
    let expected = solve_normal(&merged, &backend, &SolverSettings::default())
        .unwrap()
        .objective()
        .unwrap();

    let config = DecompositionConfig {
        max_iterations: 100,
        tolerance: 1e-5,
        ..config()
    };
    let coupled = BTreeMap::from([("South".to_string(), harbor)]);
    let policy = Regional::new(&master, &BTreeMap::new(), coupled).unwrap();
    assert_eq!(policy.region_names(), vec!["North", "South"]);
    assert!(policy.neighbors("North").unwrap().contains("South"));

    let mut coordinator = Coordinator::new(&policy, &config, &backend, None);
    assert_eq!(coordinator.step().unwrap(), Phase::BuildMaster);
    let roles: BTreeMap<&str, Role> = coordinator
        .subs()
        .iter()
        .map(|s| (s.name.as_str(), s.role))
        .collect();
    assert_eq!(roles["North"], Role::Sub);
    assert_eq!(roles["South"], Role::SubWithCoupledFile);

    let result = coordinator.run().unwrap();
    assert!(result.converged(), "status {:?}", result.status);
    assert!(
        approx(result.total_cost, expected, 1e-4),
        "decomposed {} vs merged {}",
        result.total_cost,
        expected
    );
    assert!(result.lower_bound <= expected + 1e-6 * expected.abs());
    for (region, lambda) in &result.residual_lambda {
        assert!(*lambda <= 1e-4, "{region} kept slack {lambda}");
    }
}
