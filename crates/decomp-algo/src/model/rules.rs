//! Registry of shared constraint families.
//!
//! Each rule is a plain function over the build context that returns the
//! number of rows it added. Rules iterate over the variables the build
//! actually declared, so a family whose variables are absent (a master
//! without operation, a sub without investment) simply adds nothing.
//! Infinite limits are skipped, never encoded.

use super::builder::{balance_of, BuildContext, BuildError};
use super::vars::CapacityMode;
use super::Family;
use crate::lp::{IndexKey, LinExpr, VarId};
use decomp_core::{CommodityType, DataError, Direction, CO2};

pub(crate) type RuleFn = fn(&mut BuildContext<'_>) -> Result<usize, BuildError>;

pub(crate) const SHARED_RULES: &[(Family, RuleFn)] = &[
    (Family::ResVertex, res_vertex),
    (Family::ResStockStep, res_stock_step),
    (Family::ResStockTotal, res_stock_total),
    (Family::ResEnvStep, res_env_step),
    (Family::ResEnvTotal, res_env_total),
    (Family::DefProcessCapacity, def_process_capacity),
    (Family::DefProcessInput, def_process_input),
    (Family::DefProcessOutput, def_process_output),
    (Family::DefIntermittentSupply, def_intermittent_supply),
    (
        Family::ResProcessThroughputByCapacity,
        res_process_throughput_by_capacity,
    ),
    (Family::ResProcessMaxgradLower, res_process_maxgrad_lower),
    (Family::ResProcessMaxgradUpper, res_process_maxgrad_upper),
    (Family::ResProcessCapacity, res_process_capacity),
    (Family::ResArea, res_area),
    (Family::DefTransmissionCapacity, def_transmission_capacity),
    (Family::DefTransmissionOutput, def_transmission_output),
    (
        Family::ResTransmissionInputByCapacity,
        res_transmission_input_by_capacity,
    ),
    (Family::ResTransmissionCapacity, res_transmission_capacity),
    (Family::ResTransmissionSymmetry, res_transmission_symmetry),
    (Family::DefStorageState, def_storage_state),
    (Family::DefStoragePower, def_storage_power),
    (Family::DefStorageCapacity, def_storage_capacity),
    (Family::ResStorageInputByPower, res_storage_input_by_power),
    (Family::ResStorageOutputByPower, res_storage_output_by_power),
    (Family::ResStorageStateByCapacity, res_storage_state_by_capacity),
    (Family::ResStoragePower, res_storage_power),
    (Family::ResStorageCapacity, res_storage_capacity),
    (Family::ResInitialStorageState, res_initial_storage_state),
    (Family::ResFinalStorageState, res_final_storage_state),
    (Family::ResGlobalCo2Limit, res_global_co2_limit),
];

/// Look a shared rule up by its family name.
pub fn shared_rule(name: &str) -> Option<Family> {
    SHARED_RULES
        .iter()
        .map(|(family, _)| *family)
        .find(|family| family.as_str() == name)
}

// === commodity ===

/// Supply equals demand for every balanced commodity.
fn res_vertex(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.operations {
        return Ok(0);
    }
    let mut rows = 0;
    for key in ctx.data.commodities.keys() {
        if !ctx.scope.contains_site(&key.site)
            || matches!(key.kind, CommodityType::Env | CommodityType::SupIm)
        {
            continue;
        }
        for &t in ctx.scope.modelled() {
            let mut surplus = -balance_of(&ctx.balance, t, &key.site, &key.commodity);
            if key.kind == CommodityType::Stock {
                if let Some(stock) = ctx.vars.e_co_stock.get(&(t, key.clone())) {
                    surplus += *stock;
                }
            }
            let demand = ctx.data.demand_at(&key.site, &key.commodity, t);
            if surplus.has_no_vars() && demand == 0.0 {
                continue;
            }
            ctx.program
                .eq(Family::ResVertex, IndexKey::from(key).at(t), surplus, demand);
            rows += 1;
        }
    }
    Ok(rows)
}

fn res_stock_step(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), stock) in &ctx.vars.e_co_stock {
        let limit = ctx.data.commodities[key].max_per_step;
        if limit.is_infinite() {
            continue;
        }
        ctx.program
            .le(Family::ResStockStep, IndexKey::from(key).at(*t), *stock, limit);
        rows += 1;
    }
    Ok(rows)
}

/// Annualized stock purchase over the scope stays below `max`.
fn res_stock_total(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.scope_totals {
        return Ok(0);
    }
    let scale = ctx.weight() * ctx.dt();
    let mut rows = 0;
    for (key, com) in &ctx.data.commodities {
        if key.kind != CommodityType::Stock
            || !ctx.scope.contains_site(&key.site)
            || com.max.is_infinite()
        {
            continue;
        }
        let total: LinExpr = ctx
            .scope
            .modelled()
            .iter()
            .filter_map(|t| ctx.vars.e_co_stock.get(&(*t, key.clone())))
            .map(|v| scale * *v)
            .sum();
        ctx.program
            .le(Family::ResStockTotal, IndexKey::from(key), total, com.max);
        rows += 1;
    }
    Ok(rows)
}

fn res_env_step(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.operations {
        return Ok(0);
    }
    let mut rows = 0;
    for (key, com) in &ctx.data.commodities {
        if key.kind != CommodityType::Env
            || !ctx.scope.contains_site(&key.site)
            || com.max_per_step.is_infinite()
        {
            continue;
        }
        for &t in ctx.scope.modelled() {
            let emission = -balance_of(&ctx.balance, t, &key.site, &key.commodity);
            if emission.has_no_vars() {
                continue;
            }
            ctx.program.le(
                Family::ResEnvStep,
                IndexKey::from(key).at(t),
                emission,
                com.max_per_step,
            );
            rows += 1;
        }
    }
    Ok(rows)
}

/// Annualized emission over the scope stays below `max`.
fn res_env_total(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.scope_totals || !ctx.plan.operations {
        return Ok(0);
    }
    let scale = ctx.weight() * ctx.dt();
    let mut rows = 0;
    for (key, com) in &ctx.data.commodities {
        if key.kind != CommodityType::Env
            || !ctx.scope.contains_site(&key.site)
            || com.max.is_infinite()
        {
            continue;
        }
        let mut emission = LinExpr::new();
        for &t in ctx.scope.modelled() {
            emission -= balance_of(&ctx.balance, t, &key.site, &key.commodity) * scale;
        }
        if emission.has_no_vars() {
            continue;
        }
        ctx.program
            .le(Family::ResEnvTotal, IndexKey::from(key), emission, com.max);
        rows += 1;
    }
    Ok(rows)
}

// === process ===

fn def_process_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for (key, new) in &ctx.vars.cap_pro_new {
        let cap = ctx.vars.cap_pro[key];
        let installed = ctx.data.processes[key].inst_cap;
        ctx.program.eq(
            Family::DefProcessCapacity,
            IndexKey::from(key),
            cap,
            LinExpr::from(*new) + installed,
        );
        rows += 1;
    }
    Ok(rows)
}

fn process_ratio(
    ctx: &BuildContext<'_>,
    process: &str,
    commodity: &str,
    direction: Direction,
) -> Result<f64, BuildError> {
    ctx.data
        .ratios
        .get(&(process.to_string(), commodity.to_string(), direction))
        .copied()
        .ok_or_else(|| {
            DataError::missing_key("Process-Commodity", format!("({process}, {commodity})")).into()
        })
}

fn def_process_input(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key, com), input) in &ctx.vars.e_pro_in {
        if ctx.data.find_commodity(&key.site, com).is_none() {
            return Err(DataError::missing_key("Commodity", format!("{}.{com}", key.site)).into());
        }
        let ratio = process_ratio(ctx, &key.process, com, Direction::In)?;
        let tau = ctx.vars.tau_pro[&(*t, key.clone())];
        ctx.program.eq(
            Family::DefProcessInput,
            IndexKey::from(key).at(*t).name(com),
            *input,
            ratio * tau,
        );
        rows += 1;
    }
    Ok(rows)
}

/// Output follows throughput, scaled by a time-varying efficiency.
fn def_process_output(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key, com), output) in &ctx.vars.e_pro_out {
        if ctx.data.find_commodity(&key.site, com).is_none() {
            return Err(DataError::missing_key("Commodity", format!("{}.{com}", key.site)).into());
        }
        let ratio = process_ratio(ctx, &key.process, com, Direction::Out)?;
        let factor = ctx.data.eff_factor_at(&key.site, &key.process, *t);
        let tau = ctx.vars.tau_pro[&(*t, key.clone())];
        ctx.program.eq(
            Family::DefProcessOutput,
            IndexKey::from(key).at(*t).name(com),
            *output,
            (ratio * factor) * tau,
        );
        rows += 1;
    }
    Ok(rows)
}

/// Intake of an intermittent commodity is capped by capacity times the
/// availability series.
fn def_intermittent_supply(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key, com), input) in &ctx.vars.e_pro_in {
        let is_supim = matches!(
            ctx.data.find_commodity(&key.site, com),
            Some((k, _)) if k.kind == CommodityType::SupIm
        );
        if !is_supim {
            continue;
        }
        let Some(cap) = ctx.vars.cap_pro.get(key) else {
            return Err(ctx.missing(Family::DefIntermittentSupply, format!("cap_pro{key}")));
        };
        let availability = ctx.data.supim_at(&key.site, com, *t)?;
        ctx.program.le(
            Family::DefIntermittentSupply,
            IndexKey::from(key).at(*t).name(com),
            *input,
            availability * *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_process_throughput_by_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), tau) in &ctx.vars.tau_pro {
        let Some(cap) = ctx.vars.cap_pro.get(key) else {
            return Err(ctx.missing(
                Family::ResProcessThroughputByCapacity,
                format!("cap_pro{key}"),
            ));
        };
        ctx.program.le(
            Family::ResProcessThroughputByCapacity,
            IndexKey::from(key).at(*t),
            *tau,
            *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

/// Throughput change between consecutive steps, both signs, for processes
/// whose ramp limit binds within one step.
fn maxgrad(ctx: &mut BuildContext<'_>, family: Family) -> Result<usize, BuildError> {
    let dt = ctx.dt();
    let mut rows = 0;
    for ((t, key), tau) in &ctx.vars.tau_pro {
        let max_grad = ctx.data.processes[key].max_grad;
        if max_grad >= 1.0 / dt {
            continue;
        }
        let Some(prev) = ctx.scope.previous(*t) else {
            continue;
        };
        let Some(tau_prev) = ctx.vars.tau_pro.get(&(prev, key.clone())) else {
            continue;
        };
        let cap = ctx.vars.cap_pro[key];
        let change = LinExpr::from(*tau) - *tau_prev;
        let bound = (max_grad * dt) * cap;
        let ikey = IndexKey::from(key).at(*t);
        if family == Family::ResProcessMaxgradUpper {
            ctx.program.le(family, ikey, change, bound);
        } else {
            ctx.program.ge(family, ikey, change, -bound);
        }
        rows += 1;
    }
    Ok(rows)
}

fn res_process_maxgrad_lower(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    maxgrad(ctx, Family::ResProcessMaxgradLower)
}

fn res_process_maxgrad_upper(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    maxgrad(ctx, Family::ResProcessMaxgradUpper)
}

/// `lo ≤ total ≤ up` with each side skipped when trivial.
fn capacity_bounds(
    ctx: &mut BuildContext<'_>,
    family: Family,
    key: IndexKey,
    cap: VarId,
    lo: f64,
    up: f64,
) -> usize {
    let mut rows = 0;
    if lo > 0.0 {
        ctx.program.ge(family, key.clone().name("lo"), cap, lo);
        rows += 1;
    }
    if up.is_finite() {
        ctx.program.le(family, key.name("up"), cap, up);
        rows += 1;
    }
    rows
}

fn res_process_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let caps: Vec<_> = ctx.vars.cap_pro.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let mut rows = 0;
    for (key, cap) in caps {
        let pro = &ctx.data.processes[&key];
        let (lo, up) = (pro.cap_lo, pro.cap_up);
        rows += capacity_bounds(ctx, Family::ResProcessCapacity, IndexKey::from(&key), cap, lo, up);
    }
    Ok(rows)
}

/// Area used by capacity-proportional processes stays below the site area.
fn res_area(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if ctx.plan.process != CapacityMode::Invest {
        return Ok(0);
    }
    let mut rows = 0;
    for site in &ctx.sites {
        let Some(area) = ctx.data.sites.get(site).and_then(|s| s.area) else {
            continue;
        };
        let used: LinExpr = ctx
            .vars
            .cap_pro
            .iter()
            .filter(|(k, _)| &k.site == site)
            .filter_map(|(k, cap)| {
                ctx.data.processes[k]
                    .area_per_cap
                    .map(|per_cap| per_cap * *cap)
            })
            .sum();
        if used.has_no_vars() {
            continue;
        }
        ctx.program
            .le(Family::ResArea, IndexKey::from(site.as_str()), used, area);
        rows += 1;
    }
    Ok(rows)
}

// === transmission ===

fn def_transmission_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for (key, new) in &ctx.vars.cap_tra_new {
        let cap = ctx.vars.cap_tra[key];
        let installed = ctx.data.transmissions[key].inst_cap;
        ctx.program.eq(
            Family::DefTransmissionCapacity,
            IndexKey::from(key),
            cap,
            LinExpr::from(*new) + installed,
        );
        rows += 1;
    }
    Ok(rows)
}

fn def_transmission_output(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), input) in &ctx.vars.e_tra_in {
        let Some(output) = ctx.vars.e_tra_out.get(&(*t, key.clone())) else {
            continue;
        };
        let eff = ctx.data.transmissions[key].eff;
        ctx.program.eq(
            Family::DefTransmissionOutput,
            IndexKey::from(key).at(*t),
            *output,
            eff * *input,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_transmission_input_by_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), input) in &ctx.vars.e_tra_in {
        let Some(cap) = ctx.vars.cap_tra.get(key) else {
            continue;
        };
        ctx.program.le(
            Family::ResTransmissionInputByCapacity,
            IndexKey::from(key).at(*t),
            *input,
            *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_transmission_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let caps: Vec<_> = ctx.vars.cap_tra.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let mut rows = 0;
    for (key, cap) in caps {
        let tra = &ctx.data.transmissions[&key];
        let (lo, up) = (tra.cap_lo, tra.cap_up);
        rows += capacity_bounds(
            ctx,
            Family::ResTransmissionCapacity,
            IndexKey::from(&key),
            cap,
            lo,
            up,
        );
    }
    Ok(rows)
}

/// One equality per unordered pair of invested links.
fn res_transmission_symmetry(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for key in ctx.vars.cap_tra_new.keys() {
        let reverse = key.reversed();
        if reverse <= *key {
            continue;
        }
        let Some(rev_cap) = ctx.vars.cap_tra.get(&reverse) else {
            continue;
        };
        ctx.program.eq(
            Family::ResTransmissionSymmetry,
            IndexKey::from(key),
            ctx.vars.cap_tra[key],
            *rev_cap,
        );
        rows += 1;
    }
    Ok(rows)
}

// === storage ===

/// `con[t] = con[t-1]·(1-d)^dt + in·eff_in·dt - out/eff_out·dt`
fn def_storage_state(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let dt = ctx.dt();
    let mut rows = 0;
    for ((t, key), input) in &ctx.vars.e_sto_in {
        let sto = &ctx.data.storages[key];
        let Some(prev) = ctx.scope.previous(*t) else {
            continue;
        };
        let (Some(con), Some(con_prev)) = (
            ctx.vars.e_sto_con.get(&(*t, key.clone())),
            ctx.vars.e_sto_con.get(&(prev, key.clone())),
        ) else {
            continue;
        };
        let output = ctx.vars.e_sto_out[&(*t, key.clone())];
        let retained = (1.0 - sto.discharge).powf(dt);
        let rhs = retained * *con_prev + (sto.eff_in * dt) * *input
            + LinExpr::term(output, -dt / sto.eff_out);
        ctx.program
            .eq(Family::DefStorageState, IndexKey::from(key).at(*t), *con, rhs);
        rows += 1;
    }
    Ok(rows)
}

fn def_storage_power(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for (key, new) in &ctx.vars.cap_sto_p_new {
        let installed = ctx.data.storages[key].inst_cap_p;
        ctx.program.eq(
            Family::DefStoragePower,
            IndexKey::from(key),
            ctx.vars.cap_sto_p[key],
            LinExpr::from(*new) + installed,
        );
        rows += 1;
    }
    Ok(rows)
}

fn def_storage_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for (key, new) in &ctx.vars.cap_sto_c_new {
        let installed = ctx.data.storages[key].inst_cap_c;
        ctx.program.eq(
            Family::DefStorageCapacity,
            IndexKey::from(key),
            ctx.vars.cap_sto_c[key],
            LinExpr::from(*new) + installed,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_storage_input_by_power(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), input) in &ctx.vars.e_sto_in {
        let Some(cap) = ctx.vars.cap_sto_p.get(key) else {
            return Err(ctx.missing(Family::ResStorageInputByPower, format!("cap_sto_p{key}")));
        };
        ctx.program.le(
            Family::ResStorageInputByPower,
            IndexKey::from(key).at(*t),
            *input,
            *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_storage_output_by_power(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let mut rows = 0;
    for ((t, key), output) in &ctx.vars.e_sto_out {
        let Some(cap) = ctx.vars.cap_sto_p.get(key) else {
            return Err(ctx.missing(Family::ResStorageOutputByPower, format!("cap_sto_p{key}")));
        };
        ctx.program.le(
            Family::ResStorageOutputByPower,
            IndexKey::from(key).at(*t),
            *output,
            *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

/// Content stays below energy capacity, except at coupled boundary steps.
fn res_storage_state_by_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let (first, last) = (ctx.scope.first(), ctx.scope.last());
    let mut rows = 0;
    for ((t, key), con) in &ctx.vars.e_sto_con {
        if (*t == first && !ctx.plan.bound_first_state) || (*t == last && !ctx.plan.bound_last_state)
        {
            continue;
        }
        let Some(cap) = ctx.vars.cap_sto_c.get(key) else {
            continue;
        };
        ctx.program.le(
            Family::ResStorageStateByCapacity,
            IndexKey::from(key).at(*t),
            *con,
            *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

fn res_storage_power(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let caps: Vec<_> = ctx.vars.cap_sto_p.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let mut rows = 0;
    for (key, cap) in caps {
        let sto = &ctx.data.storages[&key];
        let (lo, up) = (sto.cap_lo_p, sto.cap_up_p);
        rows += capacity_bounds(ctx, Family::ResStoragePower, IndexKey::from(&key), cap, lo, up);
    }
    Ok(rows)
}

fn res_storage_capacity(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    let caps: Vec<_> = ctx.vars.cap_sto_c.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let mut rows = 0;
    for (key, cap) in caps {
        let sto = &ctx.data.storages[&key];
        let (lo, up) = (sto.cap_lo_c, sto.cap_up_c);
        rows += capacity_bounds(ctx, Family::ResStorageCapacity, IndexKey::from(&key), cap, lo, up);
    }
    Ok(rows)
}

/// `con[first] == init · cap`
fn res_initial_storage_state(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.initial_storage {
        return Ok(0);
    }
    let first = ctx.scope.first();
    let mut rows = 0;
    for (key, cap) in &ctx.vars.cap_sto_c {
        let Some(con) = ctx.vars.e_sto_con.get(&(first, key.clone())) else {
            continue;
        };
        let init = ctx.data.storages[key].init;
        ctx.program.eq(
            Family::ResInitialStorageState,
            IndexKey::from(key).at(first),
            *con,
            init * *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

/// `con[last] ≥ init · cap`
fn res_final_storage_state(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.final_storage {
        return Ok(0);
    }
    let last = ctx.scope.last();
    let mut rows = 0;
    for (key, cap) in &ctx.vars.cap_sto_c {
        let Some(con) = ctx.vars.e_sto_con.get(&(last, key.clone())) else {
            continue;
        };
        let init = ctx.data.storages[key].init;
        ctx.program.ge(
            Family::ResFinalStorageState,
            IndexKey::from(key).at(last),
            *con,
            init * *cap,
        );
        rows += 1;
    }
    Ok(rows)
}

// === system ===

/// Annualized CO2 output of all sites in scope stays below the global cap.
fn res_global_co2_limit(ctx: &mut BuildContext<'_>) -> Result<usize, BuildError> {
    if !ctx.plan.global_co2 {
        return Ok(0);
    }
    let limit = ctx.data.co2_limit()?;
    if limit.is_infinite() || limit < 0.0 {
        return Ok(0);
    }
    let scale = ctx.weight() * ctx.dt();
    let mut output = LinExpr::new();
    for site in &ctx.sites {
        for &t in ctx.scope.modelled() {
            output -= balance_of(&ctx.balance, t, site, CO2) * scale;
        }
    }
    if output.has_no_vars() {
        return Ok(0);
    }
    ctx.program
        .le(Family::ResGlobalCo2Limit, IndexKey::new(), output, limit);
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<_> = SHARED_RULES.iter().map(|(f, _)| f.as_str()).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(shared_rule("res_vertex"), Some(Family::ResVertex));
        assert_eq!(shared_rule("sub_costs"), None);
    }
}
