//! Regional decomposition.
//!
//! The master plans transmission between regions: capacities of every
//! link, flows on region-crossing links, a CO2 budget per site and one
//! future-cost variable per region. Each sub plans its region in full
//! (processes, storage, internal operation) and must honor the master's
//! flows on its border links.
//!
//! A region may also come from its own data directory. The master then
//! carries a placeholder site of the region's name, and the sub ties the
//! totals over its links to each outside site to the master's values on
//! the placeholder links.

use super::{CouplingError, CouplingPolicy, Method};
use crate::lp::{IndexKey, LinExpr};
use crate::model::{
    BuildContext, BuildError, BuildStage, CapacityMode, Family, InstanceSpec, LinkKey,
    ObjectiveKind, ProblemInstance, Role, VarPlan, BUDGET, CAP_TRA, E_TRA_IN, E_TRA_OUT, ETA,
};
use decomp_core::{CommodityType, DataError, ModelData, Scope, SiteGraph, Timestep, TraKey, CO2};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct Regional {
    data: ModelData,
    regions: BTreeMap<String, BTreeSet<String>>,
    /// Sites outside a plain region that one of its links reaches
    neighbors: BTreeMap<String, BTreeSet<String>>,
    coupled: BTreeMap<String, ModelData>,
    site_region: BTreeMap<String, String>,
    timesteps: Vec<Timestep>,
}

impl Regional {
    /// `regions` maps region names to site lists; sites not listed form a
    /// region of their own. `coupled` maps region names to the data of
    /// regions described by their own directory.
    pub fn new(
        data: &ModelData,
        regions: &BTreeMap<String, Vec<String>>,
        coupled: BTreeMap<String, ModelData>,
    ) -> Result<Self, CouplingError> {
        let full = Scope::full(data)?;
        let mut site_region: BTreeMap<String, String> = BTreeMap::new();

        let mut coupled_data = BTreeMap::new();
        for (region, mut region_data) in coupled {
            if !data.sites.contains_key(&region) {
                return Err(CouplingError::Region(format!(
                    "coupled region '{region}' has no placeholder site in the master data"
                )));
            }
            if let Some(clash) = region_data.sites.keys().find(|s| data.sites.contains_key(*s)) {
                return Err(CouplingError::Region(format!(
                    "site '{clash}' of coupled region '{region}' also exists in the master data"
                )));
            }
            for (property, value) in &data.global {
                region_data
                    .global
                    .entry(property.clone())
                    .or_insert(*value);
            }
            region_data.validate()?;
            site_region.insert(region.clone(), region.clone());
            coupled_data.insert(region, region_data);
        }

        let mut plain: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (region, sites) in regions {
            if coupled_data.contains_key(region) {
                return Err(CouplingError::Region(format!(
                    "region '{region}' is configured both by site list and by data directory"
                )));
            }
            let mut members = BTreeSet::new();
            for site in sites {
                if !data.sites.contains_key(site) {
                    return Err(CouplingError::Region(format!(
                        "region '{region}' lists unknown site '{site}'"
                    )));
                }
                if let Some(other) = site_region.insert(site.clone(), region.clone()) {
                    return Err(CouplingError::Region(format!(
                        "site '{site}' belongs to both '{other}' and '{region}'"
                    )));
                }
                members.insert(site.clone());
            }
            if members.is_empty() {
                return Err(CouplingError::Region(format!("region '{region}' has no sites")));
            }
            plain.insert(region.clone(), members);
        }
        for site in data.sites.keys() {
            if site_region.contains_key(site) {
                continue;
            }
            if plain.contains_key(site) {
                return Err(CouplingError::Region(format!(
                    "site '{site}' is unassigned but its name is taken by a configured region"
                )));
            }
            site_region.insert(site.clone(), site.clone());
            plain.insert(site.clone(), BTreeSet::from([site.clone()]));
        }

        let graph = SiteGraph::from_data(data);
        let mut neighbors = BTreeMap::new();
        for (region, sites) in &plain {
            let border = graph.outside_neighbors(sites);
            debug!(region = %region, sites = sites.len(), neighbors = ?border, "region");
            neighbors.insert(region.clone(), border);
        }

        Ok(Self {
            data: data.clone(),
            regions: plain,
            neighbors,
            coupled: coupled_data,
            site_region,
            timesteps: full.timesteps().to_vec(),
        })
    }

    /// Outside sites a plain region's links reach.
    pub fn neighbors(&self, region: &str) -> Option<&BTreeSet<String>> {
        self.neighbors.get(region)
    }

    /// Data of a plain region: its own sites, every link touching them and
    /// the site rows of the neighbors those links end at. Neighbors are
    /// outside the sub's scope, so they add no variables.
    fn region_data(&self, region: &str, scope: &Scope) -> Result<ModelData, CouplingError> {
        let mut data = scope.slice(&self.data, None);
        let border = self.neighbors.get(region).cloned().unwrap_or_default();
        data.transmissions.retain(|key, _| {
            [&key.site_in, &key.site_out]
                .into_iter()
                .all(|s| scope.contains_site(s) || border.contains(s))
        });
        for site in border {
            if let Some(row) = self.data.sites.get(&site) {
                data.sites.insert(site, row.clone());
            }
        }
        data.validate()?;
        Ok(data)
    }

    pub fn region_names(&self) -> Vec<&str> {
        self.regions
            .keys()
            .chain(self.coupled.keys())
            .map(String::as_str)
            .collect()
    }

    fn weight_steps(&self) -> usize {
        self.timesteps.len() - 1
    }

    fn crosses(&self, key: &TraKey) -> bool {
        self.site_region.get(&key.site_in) != self.site_region.get(&key.site_out)
    }

    fn co2_capped(&self) -> Result<bool, DataError> {
        let limit = self.data.co2_limit()?;
        Ok(limit.is_finite() && limit >= 0.0)
    }

    fn emits_co2(data: &ModelData, site: &str) -> bool {
        data.commodities
            .keys()
            .any(|k| k.site == site && k.commodity == CO2 && k.kind == CommodityType::Env)
    }

    /// Sites holding a CO2 budget in the master, with the region owning it.
    fn budget_sites(&self) -> Vec<(String, String)> {
        let mut sites = Vec::new();
        for (region, members) in &self.regions {
            for site in members {
                if Self::emits_co2(&self.data, site) {
                    sites.push((site.clone(), region.clone()));
                }
            }
        }
        for (region, data) in &self.coupled {
            if data.sites.keys().any(|s| Self::emits_co2(data, s)) {
                sites.push((region.clone(), region.clone()));
            }
        }
        sites
    }

    fn budget_key(site: &str) -> IndexKey {
        IndexKey::from(site).name(CO2)
    }

    fn declare_master(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let data = ctx.data;
        for key in data.transmissions.keys() {
            if self.crosses(key) {
                ctx.declare_flows(key, true, true);
            }
        }
        for region in self.region_names() {
            let id = ctx.program.add_nonneg(ETA, IndexKey::from(region));
            ctx.vars.eta.insert(region.to_string(), id);
        }
        if self.co2_capped()? {
            for (site, _) in self.budget_sites() {
                let key = Self::budget_key(&site);
                let id = ctx.program.add_free(BUDGET, key.clone());
                ctx.vars.budget.insert(key, id);
            }
        }
        Ok(())
    }

    fn constrain_master(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let limit = ctx.data.co2_limit()?;
        let total: LinExpr = ctx.vars.budget.values().map(|v| LinExpr::from(*v)).sum();
        if !total.has_no_vars() {
            ctx.program
                .le(Family::ResGlobalBudget, IndexKey::new(), total, limit);
        }
        Ok(())
    }

    /// `W·dt·Σ emission ≤ Σ budget + Λ` over the sub's own sites.
    fn bound_emissions(
        &self,
        ctx: &mut BuildContext<'_>,
        region: &str,
        budget_sources: Vec<LinkKey>,
    ) -> Result<(), BuildError> {
        if budget_sources.is_empty() {
            return Ok(());
        }
        let lambda = ctx.lambda();
        let scale = ctx.weight() * ctx.dt();
        let scope = ctx.scope;
        let mut emission = LinExpr::new();
        for site in ctx.sites() {
            for &t in scope.modelled() {
                emission -= ctx.balance(t, &site, CO2);
            }
        }
        if emission.has_no_vars() {
            return Ok(());
        }
        let key = IndexKey::from(region).name(CO2);
        let p = ctx.link(
            "budget_res",
            key.clone(),
            budget_sources.into_iter().map(|s| (s, 1.0)).collect(),
        );
        ctx.program.le(
            Family::SubBudget,
            key,
            emission * scale,
            LinExpr::param(p, 1.0) + lambda,
        );
        Ok(())
    }

    fn constrain_plain_sub(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let region = ctx.scope.label.clone();
        let lambda = ctx.lambda();

        // internal links only carry an upper bound
        super::link_capacities(ctx, |_| false);

        let imports: Vec<_> = ctx
            .vars
            .e_tra_out
            .iter()
            .filter(|((t, k), _)| !ctx.vars.e_tra_in.contains_key(&(*t, k.clone())))
            .map(|((t, k), v)| (*t, k.clone(), *v))
            .collect();
        for (t, key, out) in imports {
            let ikey = IndexKey::from(&key).at(t);
            let p = ctx.link(
                "e_tra_out_res",
                ikey.clone(),
                vec![(LinkKey::new(E_TRA_OUT, ikey.clone()), 1.0)],
            );
            ctx.program.le(
                Family::SubImport,
                ikey,
                out,
                LinExpr::param(p, 1.0) + lambda,
            );
        }

        let exports: Vec<_> = ctx
            .vars
            .e_tra_in
            .iter()
            .filter(|((t, k), _)| !ctx.vars.e_tra_out.contains_key(&(*t, k.clone())))
            .map(|((t, k), v)| (*t, k.clone(), *v))
            .collect();
        for (t, key, input) in exports {
            let ikey = IndexKey::from(&key).at(t);
            let p = ctx.link(
                "e_tra_in_res",
                ikey.clone(),
                vec![(LinkKey::new(E_TRA_IN, ikey.clone()), 1.0)],
            );
            ctx.program.ge(
                Family::SubExport,
                ikey,
                input,
                LinExpr::param(p, 1.0) - lambda,
            );
        }

        let sources = if self.co2_capped()? {
            self.budget_sites()
                .into_iter()
                .filter(|(_, owner)| *owner == region)
                .map(|(site, _)| LinkKey::new(BUDGET, Self::budget_key(&site)))
                .collect()
        } else {
            Vec::new()
        };
        self.bound_emissions(ctx, &region, sources)?;
        Ok(())
    }

    fn constrain_coupled_sub(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let region = ctx.scope.label.clone();
        let lambda = ctx.lambda();
        let data = ctx.data;
        let scope = ctx.scope;
        let master_links: Vec<&TraKey> = self.data.transmissions.keys().collect();

        let outside: BTreeSet<&str> = data
            .transmissions
            .keys()
            .flat_map(|k| [k.site_in.as_str(), k.site_out.as_str()])
            .filter(|s| !data.sites.contains_key(*s))
            .collect();

        for other in outside {
            let into_region: Vec<&TraKey> = master_links
                .iter()
                .copied()
                .filter(|k| k.site_in == other && k.site_out == region)
                .collect();
            let from_region: Vec<&TraKey> = master_links
                .iter()
                .copied()
                .filter(|k| k.site_in == region && k.site_out == other)
                .collect();

            for &t in scope.modelled() {
                let mut imported = LinExpr::new();
                let mut exported = LinExpr::new();
                for ((step, key), v) in &ctx.vars.e_tra_in {
                    if *step == t && key.site_in == other {
                        imported += *v;
                    }
                }
                for ((step, key), v) in &ctx.vars.e_tra_out {
                    if *step == t && key.site_out == other {
                        exported += *v;
                    }
                }
                let ikey = IndexKey::from(other).at(t);
                if !imported.has_no_vars() {
                    let sources = into_region
                        .iter()
                        .map(|k| (LinkKey::new(E_TRA_IN, IndexKey::from(*k).at(t)), 1.0))
                        .collect();
                    let p = ctx.link("import_res", ikey.clone(), sources);
                    ctx.program.le(
                        Family::SubImport,
                        ikey.clone(),
                        imported,
                        LinExpr::param(p, 1.0) + lambda,
                    );
                }
                if !exported.has_no_vars() {
                    let sources = from_region
                        .iter()
                        .map(|k| (LinkKey::new(E_TRA_OUT, IndexKey::from(*k).at(t)), 1.0))
                        .collect();
                    let p = ctx.link("export_res", ikey.clone(), sources);
                    ctx.program.ge(
                        Family::SubExport,
                        ikey,
                        exported,
                        LinExpr::param(p, 1.0) - lambda,
                    );
                }
            }

            let mut capacity = LinExpr::new();
            for (key, v) in &ctx.vars.cap_tra {
                if key.site_in == other {
                    capacity += *v;
                }
            }
            if !capacity.has_no_vars() {
                let sources = into_region
                    .iter()
                    .map(|k| (LinkKey::new(CAP_TRA, IndexKey::from(*k)), 1.0))
                    .collect();
                let key = IndexKey::from(other);
                let p = ctx.link("hvac_res", key.clone(), sources);
                ctx.program.le(
                    Family::SubHvac,
                    key,
                    capacity,
                    LinExpr::param(p, 1.0) + lambda,
                );
            }
        }

        let sources = if self.co2_capped()?
            && self.budget_sites().iter().any(|(site, _)| *site == region)
        {
            vec![LinkKey::new(BUDGET, Self::budget_key(&region))]
        } else {
            Vec::new()
        };
        self.bound_emissions(ctx, &region, sources)?;
        Ok(())
    }
}

impl CouplingPolicy for Regional {
    fn method(&self) -> Method {
        Method::Regional
    }

    fn master_spec(&self) -> Result<InstanceSpec, CouplingError> {
        let scope = Scope::new(self.timesteps.iter().copied())?
            .with_weight_steps(self.weight_steps())
            .with_label("master");
        Ok(InstanceSpec {
            name: "master".to_string(),
            role: Role::Master,
            scope,
            data: self.data.clone(),
            plan: VarPlan {
                process: CapacityMode::Absent,
                storage: CapacityMode::Absent,
                ..VarPlan::investment_only()
            },
        })
    }

    fn sub_specs(&self) -> Result<Vec<InstanceSpec>, CouplingError> {
        let mut specs = Vec::new();
        for (region, sites) in &self.regions {
            let scope = Scope::new(self.timesteps.iter().copied())?
                .with_sites(sites.clone())
                .with_weight_steps(self.weight_steps())
                .with_label(region.clone());
            let data = self.region_data(region, &scope)?;
            specs.push(InstanceSpec {
                name: region.clone(),
                role: Role::Sub,
                scope,
                data,
                plan: VarPlan {
                    transmission: CapacityMode::Linked,
                    objective: ObjectiveKind::Lambda,
                    global_co2: false,
                    ..VarPlan::normal()
                },
            });
        }
        for (region, data) in &self.coupled {
            let scope = Scope::new(self.timesteps.iter().copied())?
                .with_weight_steps(self.weight_steps())
                .with_label(region.clone());
            specs.push(InstanceSpec {
                name: region.clone(),
                role: Role::SubWithCoupledFile,
                scope,
                data: data.clone(),
                plan: VarPlan {
                    objective: ObjectiveKind::Lambda,
                    global_co2: false,
                    ..VarPlan::normal()
                },
            });
        }
        Ok(specs)
    }

    fn extra_master_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        match stage {
            BuildStage::Declare => self.declare_master(ctx),
            BuildStage::Constrain => self.constrain_master(ctx),
        }
    }

    fn extra_sub_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        match (stage, ctx.role) {
            (BuildStage::Declare, _) => Ok(()),
            (BuildStage::Constrain, Role::SubWithCoupledFile) => self.constrain_coupled_sub(ctx),
            (BuildStage::Constrain, _) => self.constrain_plain_sub(ctx),
        }
    }

    fn eta_link(&self, sub: &ProblemInstance) -> Option<LinkKey> {
        Some(LinkKey::new(ETA, IndexKey::from(sub.name.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decomp_core::{Site, Transmission, CO2_LIMIT};

    fn data(sites: &[&str]) -> ModelData {
        let mut data = ModelData::new();
        data.global.insert(CO2_LIMIT.to_string(), f64::INFINITY);
        for s in sites {
            data.sites.insert(s.to_string(), Site::default());
            data.demand.insert(
                (s.to_string(), "Elec".to_string()),
                (0..=2).map(|t| (t, 1.0)).collect(),
            );
        }
        data
    }

    #[test]
    fn test_unlisted_sites_form_own_regions() {
        let d = data(&["North", "South", "East"]);
        let regions = BTreeMap::from([(
            "Coast".to_string(),
            vec!["North".to_string(), "East".to_string()],
        )]);
        let policy = Regional::new(&d, &regions, BTreeMap::new()).unwrap();
        assert_eq!(policy.region_names(), vec!["Coast", "South"]);
        let subs = policy.sub_specs().unwrap();
        assert_eq!(subs[0].data.sites.len(), 2);
        assert!(subs.iter().all(|s| s.role == Role::Sub));
    }

    #[test]
    fn test_site_in_two_regions_rejected() {
        let d = data(&["North", "South"]);
        let regions = BTreeMap::from([
            ("A".to_string(), vec!["North".to_string()]),
            ("B".to_string(), vec!["North".to_string(), "South".to_string()]),
        ]);
        assert!(matches!(
            Regional::new(&d, &regions, BTreeMap::new()),
            Err(CouplingError::Region(_))
        ));
    }

    #[test]
    fn test_coupled_site_clash_rejected() {
        let master = data(&["North", "Island"]);
        let coupled = data(&["North"]);
        let err = Regional::new(
            &master,
            &BTreeMap::new(),
            BTreeMap::from([("Island".to_string(), coupled)]),
        );
        assert!(matches!(err, Err(CouplingError::Region(msg)) if msg.contains("North")));
    }

    #[test]
    fn test_sub_data_is_padded_with_neighbor_sites() {
        let mut d = data(&["North", "South", "East"]);
        for (a, b) in [("North", "South"), ("South", "North")] {
            d.transmissions
                .insert(TraKey::new(a, b, "hvac", "Elec"), Transmission::default());
        }
        let policy = Regional::new(&d, &BTreeMap::new(), BTreeMap::new()).unwrap();
        assert_eq!(
            policy.neighbors("North"),
            Some(&BTreeSet::from(["South".to_string()]))
        );
        assert!(policy.neighbors("East").unwrap().is_empty());

        let subs = policy.sub_specs().unwrap();
        let north = subs.iter().find(|s| s.name == "North").unwrap();
        assert!(north.data.sites.contains_key("South"));
        assert!(!north.data.sites.contains_key("East"));
        assert!(!north.scope.contains_site("South"));
        assert_eq!(north.data.transmissions.len(), 2);
        // the neighbor brings only its site row
        assert!(north.data.demand.keys().all(|(site, _)| site == "North"));

        let east = subs.iter().find(|s| s.name == "East").unwrap();
        assert_eq!(east.data.sites.len(), 1);
        assert!(east.data.transmissions.is_empty());
    }

    #[test]
    fn test_crossing_links() {
        let mut d = data(&["North", "South"]);
        let key = TraKey::new("North", "South", "hvac", "Elec");
        d.transmissions.insert(key.clone(), Transmission::default());
        d.transmissions.insert(key.reversed(), Transmission::default());
        let policy = Regional::new(&d, &BTreeMap::new(), BTreeMap::new()).unwrap();
        assert!(policy.crosses(&key));
        let merged = BTreeMap::from([(
            "All".to_string(),
            vec!["North".to_string(), "South".to_string()],
        )]);
        let policy = Regional::new(&d, &merged, BTreeMap::new()).unwrap();
        assert!(!policy.crosses(&key));
    }
}
