//! Variable plans and the typed variable maps a build produces.

use super::CostType;
use crate::lp::{IndexKey, ParamId, VarId};
use decomp_core::{ComKey, ProKey, StoKey, Timestep, TraKey};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const CAP_PRO: &str = "cap_pro";
pub const CAP_PRO_NEW: &str = "cap_pro_new";
pub const TAU_PRO: &str = "tau_pro";
pub const E_PRO_IN: &str = "e_pro_in";
pub const E_PRO_OUT: &str = "e_pro_out";
pub const CAP_TRA: &str = "cap_tra";
pub const CAP_TRA_NEW: &str = "cap_tra_new";
pub const E_TRA_IN: &str = "e_tra_in";
pub const E_TRA_OUT: &str = "e_tra_out";
pub const CAP_STO_C: &str = "cap_sto_c";
pub const CAP_STO_C_NEW: &str = "cap_sto_c_new";
pub const CAP_STO_P: &str = "cap_sto_p";
pub const CAP_STO_P_NEW: &str = "cap_sto_p_new";
pub const E_STO_IN: &str = "e_sto_in";
pub const E_STO_OUT: &str = "e_sto_out";
pub const E_STO_CON: &str = "e_sto_con";
pub const E_CO_STOCK: &str = "e_co_stock";
pub const E_CO_STATE: &str = "e_co_stock_state";
pub const COSTS: &str = "costs";
pub const ETA: &str = "eta";
pub const LAMBDA: &str = "Lambda";
pub const BUDGET: &str = "budget";

/// How an asset class's capacity enters a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapacityMode {
    /// `total = new + installed`, investment and fixed costs charged
    Invest,
    /// total is a variable tied to a master value by coupling constraints
    Linked,
    /// no capacity variables at all
    Absent,
}

/// What the problem minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ObjectiveKind {
    /// Sum of all cost variables
    TotalCost,
    /// The coupling slack alone
    Lambda,
    /// Sum of all cost variables plus `penalty · Lambda`
    PenalizedCost(f64),
}

/// Which variables the generic builder declares and which boundary rules
/// it applies. Coupling policies choose one plan per role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarPlan {
    pub process: CapacityMode,
    pub transmission: CapacityMode,
    pub storage: CapacityMode,
    /// Declare per-step throughput, flow, storage and stock variables
    pub operations: bool,
    pub initial_storage: bool,
    pub final_storage: bool,
    /// Bound the storage content by capacity at the first index of `T`
    pub bound_first_state: bool,
    /// Bound the storage content by capacity at the last index of `T`
    pub bound_last_state: bool,
    /// Per-scope `res_stock_total` / `res_env_total`
    pub scope_totals: bool,
    pub global_co2: bool,
    pub objective: ObjectiveKind,
}

impl VarPlan {
    /// Everything a standalone problem contains.
    pub fn normal() -> Self {
        Self {
            process: CapacityMode::Invest,
            transmission: CapacityMode::Invest,
            storage: CapacityMode::Invest,
            operations: true,
            initial_storage: true,
            final_storage: true,
            bound_first_state: true,
            bound_last_state: true,
            scope_totals: true,
            global_co2: true,
            objective: ObjectiveKind::TotalCost,
        }
    }

    /// Investment only, no per-step operation.
    pub fn investment_only() -> Self {
        Self {
            operations: false,
            scope_totals: false,
            global_co2: false,
            ..Self::normal()
        }
    }

    /// Operation only, capacities tied to a master.
    pub fn linked_operation() -> Self {
        Self {
            process: CapacityMode::Linked,
            transmission: CapacityMode::Linked,
            storage: CapacityMode::Linked,
            initial_storage: false,
            final_storage: false,
            bound_first_state: false,
            bound_last_state: false,
            scope_totals: false,
            global_co2: false,
            objective: ObjectiveKind::Lambda,
            ..Self::normal()
        }
    }
}

/// A master (or parent) variable addressed by the name and key it was
/// declared with. Instances of one run use the same naming, so the key
/// resolves in any of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LinkKey {
    pub var: &'static str,
    pub key: IndexKey,
}

impl LinkKey {
    pub fn new(var: &'static str, key: IndexKey) -> Self {
        Self { var, key }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.var, self.key)
    }
}

/// A coupling parameter and the weighted master variables it copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamLink {
    #[serde(skip)]
    pub param: ParamId,
    pub sources: Vec<(LinkKey, f64)>,
}

/// Typed handles of every variable a build declared.
#[derive(Debug, Clone, Default)]
pub struct ModelVars {
    pub cap_pro: BTreeMap<ProKey, VarId>,
    pub cap_pro_new: BTreeMap<ProKey, VarId>,
    pub tau_pro: BTreeMap<(Timestep, ProKey), VarId>,
    pub e_pro_in: BTreeMap<(Timestep, ProKey, String), VarId>,
    pub e_pro_out: BTreeMap<(Timestep, ProKey, String), VarId>,
    pub cap_tra: BTreeMap<TraKey, VarId>,
    pub cap_tra_new: BTreeMap<TraKey, VarId>,
    pub e_tra_in: BTreeMap<(Timestep, TraKey), VarId>,
    pub e_tra_out: BTreeMap<(Timestep, TraKey), VarId>,
    pub cap_sto_c: BTreeMap<StoKey, VarId>,
    pub cap_sto_c_new: BTreeMap<StoKey, VarId>,
    pub cap_sto_p: BTreeMap<StoKey, VarId>,
    pub cap_sto_p_new: BTreeMap<StoKey, VarId>,
    pub e_sto_in: BTreeMap<(Timestep, StoKey), VarId>,
    pub e_sto_out: BTreeMap<(Timestep, StoKey), VarId>,
    pub e_sto_con: BTreeMap<(Timestep, StoKey), VarId>,
    pub e_co_stock: BTreeMap<(Timestep, ComKey), VarId>,
    /// Cumulative stock use or emission, see the stochastic policy
    pub e_co_state: BTreeMap<(Timestep, ComKey), VarId>,
    pub costs: BTreeMap<CostType, VarId>,
    /// Future-cost placeholders keyed by support step or region label
    pub eta: BTreeMap<String, VarId>,
    /// Budgets handed to subs, keyed by the index key they were declared with
    pub budget: BTreeMap<IndexKey, VarId>,
    pub lambda: Option<VarId>,
}

impl ModelVars {
    /// `(variable name, key, id)` of every capacity total.
    pub fn capacity_vars(&self) -> Vec<(&'static str, IndexKey, VarId)> {
        let mut out = Vec::new();
        out.extend(self.cap_pro.iter().map(|(k, v)| (CAP_PRO, IndexKey::from(k), *v)));
        out.extend(self.cap_tra.iter().map(|(k, v)| (CAP_TRA, IndexKey::from(k), *v)));
        out.extend(self.cap_sto_c.iter().map(|(k, v)| (CAP_STO_C, IndexKey::from(k), *v)));
        out.extend(self.cap_sto_p.iter().map(|(k, v)| (CAP_STO_P, IndexKey::from(k), *v)));
        out
    }

    pub fn transmission_is_full(&self, t: Timestep, key: &TraKey) -> bool {
        let idx = (t, key.clone());
        self.e_tra_in.contains_key(&idx) && self.e_tra_out.contains_key(&idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_plan_drops_boundaries() {
        let plan = VarPlan::linked_operation();
        assert_eq!(plan.process, CapacityMode::Linked);
        assert!(plan.operations);
        assert!(!plan.initial_storage && !plan.final_storage);
        assert_eq!(plan.objective, ObjectiveKind::Lambda);
    }

    #[test]
    fn test_link_key_display() {
        let key = LinkKey::new(CAP_PRO, IndexKey::from(&ProKey::new("Mid", "Gas plant")));
        assert_eq!(key.to_string(), "cap_pro[Mid, Gas plant]");
    }
}
