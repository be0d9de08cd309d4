//! Small models shared by the integration tests.

#![allow(dead_code)]

use decomp_core::{
    realize, ComKey, Commodity, CommodityType, Direction, ModelData, ProKey, Process, Site, StoKey,
    Storage, Timestep, Transmission, TraKey, CO2_LIMIT, TIMESTEP_LENGTH,
};

pub fn approx(actual: f64, expected: f64, rel: f64) -> bool {
    (actual - expected).abs() <= rel * expected.abs().max(1.0)
}

fn base() -> ModelData {
    let mut data = ModelData::new();
    data.global.insert(CO2_LIMIT.to_string(), f64::INFINITY);
    data.global.insert(TIMESTEP_LENGTH.to_string(), 1.0);
    data.ratios
        .insert(("Gas plant".into(), "Gas".into(), Direction::In), 1.6);
    data.ratios
        .insert(("Gas plant".into(), "Elec".into(), Direction::Out), 1.0);
    data
}

fn add_site(data: &mut ModelData, site: &str, demand: &[f64]) {
    data.sites.insert(site.into(), Site::default());
    data.commodities.insert(
        ComKey::new(site, "Elec", CommodityType::Demand),
        Commodity::default(),
    );
    let series = std::iter::once((0, 0.0))
        .chain(demand.iter().enumerate().map(|(i, d)| (i as u32 + 1, *d)))
        .collect();
    data.demand.insert((site.into(), "Elec".into()), series);
}

fn add_gas_plant(data: &mut ModelData, site: &str, cap_up: f64) {
    data.commodities.insert(
        ComKey::new(site, "Gas", CommodityType::Stock),
        Commodity {
            price: 25.0,
            ..Commodity::default()
        },
    );
    data.processes.insert(
        ProKey::new(site, "Gas plant"),
        Process {
            cap_up,
            inv_cost: 450_000.0,
            fix_cost: 6_000.0,
            var_cost: 1.5,
            ..Process::default()
        },
    );
}

/// One site, one gas plant of at most 100 MW, no storage or transmission.
pub fn single_site(demand: &[f64]) -> ModelData {
    let mut data = base();
    add_site(&mut data, "Mid", demand);
    add_gas_plant(&mut data, "Mid", 100.0);
    data
}

/// A cheap battery next to the gas plant of `site`, so shaving the peak
/// pays off.
pub fn with_battery(mut data: ModelData, site: &str) -> ModelData {
    data.storages.insert(
        StoKey::new(site, "Battery", "Elec"),
        Storage {
            eff_in: 0.95,
            eff_out: 0.95,
            inv_cost_c: 500.0,
            inv_cost_p: 1_000.0,
            init: 0.5,
            ..Storage::default()
        },
    );
    data
}

/// Gas plant in `North`, demand in both sites, one link between them.
pub fn two_sites() -> ModelData {
    let mut data = base();
    add_site(&mut data, "North", &[20.0, 40.0]);
    add_site(&mut data, "South", &[30.0, 10.0]);
    add_gas_plant(&mut data, "North", 200.0);
    let key = TraKey::new("North", "South", "hvac", "Elec");
    let link = Transmission {
        eff: 0.9,
        inv_cost: 150_000.0,
        fix_cost: 1_000.0,
        ..Transmission::default()
    };
    data.transmissions.insert(key.reversed(), link.clone());
    data.transmissions.insert(key, link);
    data
}

/// A wind park at `site` whose availability over steps `1..` is `profile`.
pub fn with_wind(mut data: ModelData, site: &str, profile: &[f64]) -> ModelData {
    data.commodities.insert(
        ComKey::new(site, "Wind", CommodityType::SupIm),
        Commodity::default(),
    );
    data.processes.insert(
        ProKey::new(site, "Wind park"),
        Process {
            cap_up: 200.0,
            inv_cost: 300_000.0,
            fix_cost: 3_000.0,
            ..Process::default()
        },
    );
    data.ratios
        .insert(("Wind park".into(), "Wind".into(), Direction::In), 1.0);
    data.ratios
        .insert(("Wind park".into(), "Elec".into(), Direction::Out), 1.0);
    let series = std::iter::once((0, 0.0))
        .chain(profile.iter().enumerate().map(|(i, v)| (i as u32 + 1, *v)))
        .collect();
    data.supim.insert((site.into(), "Wind".into()), series);
    data
}

/// `data` with every wind availability after `from` moved by `factor`.
pub fn wind_realized(data: &ModelData, from: Timestep, factor: f64) -> ModelData {
    let mut data = data.clone();
    for ((_, commodity), series) in data.supim.iter_mut() {
        if commodity != "Wind" {
            continue;
        }
        for (t, value) in series.iter_mut() {
            if *t > from {
                *value = realize(*value, factor);
            }
        }
    }
    data
}

/// Gas plant and demand in `North`, demand in `Harbor`, one link between
/// them. Returns the data of the master with `South` standing in for the
/// harbor region, the harbor region's own data, and the merged model.
pub fn harbor_region() -> (ModelData, ModelData, ModelData) {
    let link = Transmission {
        eff: 0.9,
        inv_cost: 150_000.0,
        fix_cost: 1_000.0,
        ..Transmission::default()
    };

    let mut master = base();
    add_site(&mut master, "North", &[20.0, 40.0]);
    add_gas_plant(&mut master, "North", 200.0);
    master.sites.insert("South".into(), Site::default());
    let key = TraKey::new("North", "South", "hvac", "Elec");
    master.transmissions.insert(key.reversed(), link.clone());
    master.transmissions.insert(key, link.clone());

    // the master pays for the link, the harbor model only carries the flow
    let mut harbor = ModelData::new();
    harbor.global = master.global.clone();
    add_site(&mut harbor, "Harbor", &[30.0, 10.0]);
    let local = Transmission {
        inv_cost: 0.0,
        fix_cost: 0.0,
        ..link.clone()
    };
    let key = TraKey::new("North", "Harbor", "hvac", "Elec");
    harbor.transmissions.insert(key.reversed(), local.clone());
    harbor.transmissions.insert(key.clone(), local);

    let mut merged = base();
    add_site(&mut merged, "North", &[20.0, 40.0]);
    add_site(&mut merged, "Harbor", &[30.0, 10.0]);
    add_gas_plant(&mut merged, "North", 200.0);
    merged.transmissions.insert(key.reversed(), link.clone());
    merged.transmissions.insert(key, link);

    (master, harbor, merged)
}
