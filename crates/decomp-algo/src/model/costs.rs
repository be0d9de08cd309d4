//! Cost accounting.
//!
//! One free variable `costs[type]` per cost type of the role, pinned by a
//! `def_costs` equality to the expression below. Families a build did not
//! declare contribute nothing, so a master without operation carries zero
//! variable cost and a sub without investment zero investment cost.
//!
//! | Type | Expression |
//! |------|------------|
//! | Invest | new capacity × investment cost × annuity |
//! | Fixed | total capacity × fixed cost, invested assets only |
//! | Variable | throughput, transmission input, storage content and power × weight |
//! | Fuel | stock purchase × price × weight |
//! | Environmental | emission × price × weight |
//! | FutureCosts | Σ eta |

use super::builder::{balance_of, BuildContext, BuildError};
use super::{CostType, Family};
use crate::lp::{IndexKey, LinExpr};
use decomp_core::CommodityType;

pub(crate) fn define_costs(ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
    let cost_vars: Vec<_> = ctx.vars.costs.iter().map(|(k, v)| (*k, *v)).collect();
    for (cost_type, var) in cost_vars {
        let expr = cost_expression(ctx, cost_type);
        ctx.program.eq(
            Family::DefCosts,
            IndexKey::from(cost_type.as_str()),
            var,
            expr,
        );
    }
    Ok(())
}

/// The expression a cost variable is pinned to.
pub fn cost_expression(ctx: &BuildContext<'_>, cost_type: CostType) -> LinExpr {
    match cost_type {
        CostType::Invest => invest(ctx),
        CostType::Fixed => fixed(ctx),
        CostType::Variable => variable(ctx),
        CostType::Fuel => fuel(ctx),
        CostType::Environmental => environmental(ctx),
        CostType::FutureCosts => ctx.vars.eta.values().map(|v| LinExpr::from(*v)).sum(),
    }
}

fn invest(ctx: &BuildContext<'_>) -> LinExpr {
    let data = ctx.data;
    let mut expr = LinExpr::new();
    for (key, new) in &ctx.vars.cap_pro_new {
        let pro = &data.processes[key];
        expr.add_term(*new, pro.inv_cost * pro.annuity());
    }
    for (key, new) in &ctx.vars.cap_tra_new {
        let tra = &data.transmissions[key];
        expr.add_term(*new, tra.inv_cost * tra.annuity());
    }
    for (key, new) in &ctx.vars.cap_sto_p_new {
        let sto = &data.storages[key];
        expr.add_term(*new, sto.inv_cost_p * sto.annuity());
    }
    for (key, new) in &ctx.vars.cap_sto_c_new {
        let sto = &data.storages[key];
        expr.add_term(*new, sto.inv_cost_c * sto.annuity());
    }
    expr
}

fn fixed(ctx: &BuildContext<'_>) -> LinExpr {
    let data = ctx.data;
    let vars = &ctx.vars;
    let mut expr = LinExpr::new();
    for key in vars.cap_pro_new.keys() {
        expr.add_term(vars.cap_pro[key], data.processes[key].fix_cost);
    }
    for key in vars.cap_tra_new.keys() {
        expr.add_term(vars.cap_tra[key], data.transmissions[key].fix_cost);
    }
    for key in vars.cap_sto_p_new.keys() {
        expr.add_term(vars.cap_sto_p[key], data.storages[key].fix_cost_p);
    }
    for key in vars.cap_sto_c_new.keys() {
        expr.add_term(vars.cap_sto_c[key], data.storages[key].fix_cost_c);
    }
    expr
}

fn variable(ctx: &BuildContext<'_>) -> LinExpr {
    let data = ctx.data;
    let vars = &ctx.vars;
    let w = ctx.weight();
    let dt = ctx.dt();
    let mut expr = LinExpr::new();
    for ((_, key), tau) in &vars.tau_pro {
        expr.add_term(*tau, dt * w * data.processes[key].var_cost);
    }
    // only links modelled at both ends; half-modelled boundary links are
    // charged where they are complete
    for ((t, key), input) in &vars.e_tra_in {
        if vars.transmission_is_full(*t, key) {
            expr.add_term(*input, dt * w * data.transmissions[key].var_cost);
        }
    }
    let first = ctx.scope.first();
    for ((t, key), con) in &vars.e_sto_con {
        if *t != first {
            expr.add_term(*con, w * data.storages[key].var_cost_c);
        }
    }
    for ((t, key), input) in &vars.e_sto_in {
        let per_power = dt * w * data.storages[key].var_cost_p;
        expr.add_term(*input, per_power);
        expr.add_term(vars.e_sto_out[&(*t, key.clone())], per_power);
    }
    expr
}

fn fuel(ctx: &BuildContext<'_>) -> LinExpr {
    let scale = ctx.weight() * ctx.dt();
    let mut expr = LinExpr::new();
    for ((_, key), stock) in &ctx.vars.e_co_stock {
        expr.add_term(*stock, scale * ctx.data.commodities[key].price);
    }
    expr
}

fn environmental(ctx: &BuildContext<'_>) -> LinExpr {
    let scale = ctx.weight() * ctx.dt();
    let mut expr = LinExpr::new();
    for (key, com) in &ctx.data.commodities {
        if key.kind != CommodityType::Env || !ctx.scope.contains_site(&key.site) || com.price == 0.0
        {
            continue;
        }
        for &t in ctx.scope.modelled() {
            expr -= balance_of(&ctx.balance, t, &key.site, &key.commodity) * (scale * com.price);
        }
    }
    expr
}
