//! Whole-model solves of the toy systems.

mod common;

use common::{approx, single_site, two_sites, with_battery};
use decomp_algo::model::{CostType, CAP_PRO, CAP_TRA};
use decomp_algo::decomposition::TimeHorizonConfig;
use decomp_algo::solver::{ClarabelBackend, GoodLpBackend, SolverSettings};
use decomp_algo::{
    decompose, solve_normal, BuildError, DecompositionConfig, DecompositionError, Method,
};
use decomp_core::{DataError, TraKey};
use std::collections::BTreeMap;

#[test]
fn single_site_builds_peak_capacity() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let instance =
        solve_normal(&data, &ClarabelBackend::new(), &SolverSettings::default()).unwrap();
    let cap = instance
        .capacities()
        .into_iter()
        .find(|c| c.variable == CAP_PRO)
        .expect("process capacity is declared");
    assert!(approx(cap.value, 80.0, 1e-5), "cap = {}", cap.value);

    let costs = instance.costs();
    let objective = instance.objective().unwrap();
    let total: f64 = costs.values().sum();
    assert!(approx(total, objective, 1e-6));
    assert!(costs[&CostType::Invest] > 0.0);
    assert!(costs[&CostType::Fuel] > 0.0);
}

#[test]
fn both_backends_agree_on_objective() {
    let data = single_site(&[50.0, 80.0, 30.0]);
    let settings = SolverSettings::default();
    let a = solve_normal(&data, &ClarabelBackend::new(), &settings).unwrap();
    let b = solve_normal(&data, &GoodLpBackend::new(), &settings).unwrap();
    assert!(approx(
        a.objective().unwrap(),
        b.objective().unwrap(),
        1e-5
    ));
}

#[test]
fn transmission_capacity_is_symmetric() {
    let data = two_sites();
    let instance =
        solve_normal(&data, &ClarabelBackend::new(), &SolverSettings::default()).unwrap();
    let links: Vec<f64> = instance
        .capacities()
        .into_iter()
        .filter(|c| c.variable == CAP_TRA)
        .map(|c| c.value)
        .collect();
    assert_eq!(links.len(), 2);
    assert!(approx(links[0], links[1], 1e-6));
    // South peaks at 30 and is served over a 90 % efficient link
    assert!(links[0] >= 30.0 / 0.9 - 1e-4);
}

#[test]
fn demand_above_plant_limit_is_infeasible() {
    let data = single_site(&[50.0, 180.0, 30.0]);
    let err = solve_normal(&data, &ClarabelBackend::new(), &SolverSettings::default())
        .unwrap_err();
    assert!(err.to_string().contains("normal"), "{err}");
}

#[test]
fn storage_starts_at_init_and_ends_above_it() {
    let data = with_battery(single_site(&[50.0, 80.0, 30.0]), "Mid");
    let instance =
        solve_normal(&data, &ClarabelBackend::new(), &SolverSettings::default()).unwrap();
    let first = instance.scope.first();
    let last = instance.scope.last();
    let (key, cap) = instance.vars.cap_sto_c.iter().next().expect("battery declared");
    let cap = instance.value(*cap).unwrap();
    let init = data.storages[key].init;

    let at = |t| {
        let var = instance.vars.e_sto_con[&(t, key.clone())];
        instance.value(var).unwrap()
    };
    assert!((at(first) - init * cap).abs() < 1e-4, "start {}", at(first));
    assert!(at(last) >= init * cap - 1e-4, "end {}", at(last));
}

#[test]
fn one_way_link_is_rejected_before_building() {
    let mut data = two_sites();
    data.transmissions
        .remove(&TraKey::new("South", "North", "hvac", "Elec"));
    let backend = ClarabelBackend::new();

    let err = solve_normal(&data, &backend, &SolverSettings::default()).unwrap_err();
    assert!(
        matches!(err, DecompositionError::Build(BuildError::Data(DataError::MissingKey { .. }))),
        "{err}"
    );

    let config = DecompositionConfig {
        method: Method::TimeHorizon,
        time_horizon: TimeHorizonConfig {
            support_steps: vec![1],
        },
        ..Default::default()
    };
    let err = decompose(&data, &config, BTreeMap::new(), &backend).unwrap_err();
    assert!(matches!(err, DecompositionError::Build(_)), "{err}");
}
