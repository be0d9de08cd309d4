use serde::Serialize;
use std::fmt;

/// Constraint family: the name of the rule that produced a row.
///
/// Every constraint of a [`crate::lp::LinearProgram`] is tagged with its
/// family and an explicit index key, so duals and cuts can be traced back
/// to the rule that generated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    // commodity
    ResVertex,
    ResStockStep,
    ResStockTotal,
    ResEnvStep,
    ResEnvTotal,
    // process
    DefProcessCapacity,
    DefProcessInput,
    DefProcessOutput,
    DefIntermittentSupply,
    ResProcessThroughputByCapacity,
    ResProcessMaxgradLower,
    ResProcessMaxgradUpper,
    ResProcessCapacity,
    ResArea,
    // transmission
    DefTransmissionCapacity,
    DefTransmissionOutput,
    ResTransmissionInputByCapacity,
    ResTransmissionCapacity,
    ResTransmissionSymmetry,
    // storage
    DefStorageState,
    DefStoragePower,
    DefStorageCapacity,
    ResStorageInputByPower,
    ResStorageOutputByPower,
    ResStorageStateByCapacity,
    ResStoragePower,
    ResStorageCapacity,
    ResInitialStorageState,
    ResFinalStorageState,
    // system
    ResGlobalCo2Limit,
    DefCosts,
    // coupling, registered by decomposition policies
    ResStorageStateUpper,
    ResStorageStateLower,
    ResBudgetTotal,
    ResGlobalBudget,
    SubCapacity,
    SubCapacityFloor,
    SubStorageStart,
    SubStorageEnd,
    SubBudget,
    SubImport,
    SubExport,
    SubHvac,
    SubComState,
    ComState,
    ComTotal,
    Cut,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::ResVertex => "res_vertex",
            Family::ResStockStep => "res_stock_step",
            Family::ResStockTotal => "res_stock_total",
            Family::ResEnvStep => "res_env_step",
            Family::ResEnvTotal => "res_env_total",
            Family::DefProcessCapacity => "def_process_capacity",
            Family::DefProcessInput => "def_process_input",
            Family::DefProcessOutput => "def_process_output",
            Family::DefIntermittentSupply => "def_intermittent_supply",
            Family::ResProcessThroughputByCapacity => "res_process_throughput_by_capacity",
            Family::ResProcessMaxgradLower => "res_process_maxgrad_lower",
            Family::ResProcessMaxgradUpper => "res_process_maxgrad_upper",
            Family::ResProcessCapacity => "res_process_capacity",
            Family::ResArea => "res_area",
            Family::DefTransmissionCapacity => "def_transmission_capacity",
            Family::DefTransmissionOutput => "def_transmission_output",
            Family::ResTransmissionInputByCapacity => "res_transmission_input_by_capacity",
            Family::ResTransmissionCapacity => "res_transmission_capacity",
            Family::ResTransmissionSymmetry => "res_transmission_symmetry",
            Family::DefStorageState => "def_storage_state",
            Family::DefStoragePower => "def_storage_power",
            Family::DefStorageCapacity => "def_storage_capacity",
            Family::ResStorageInputByPower => "res_storage_input_by_power",
            Family::ResStorageOutputByPower => "res_storage_output_by_power",
            Family::ResStorageStateByCapacity => "res_storage_state_by_capacity",
            Family::ResStoragePower => "res_storage_power",
            Family::ResStorageCapacity => "res_storage_capacity",
            Family::ResInitialStorageState => "res_initial_storage_state",
            Family::ResFinalStorageState => "res_final_storage_state",
            Family::ResGlobalCo2Limit => "res_global_co2_limit",
            Family::DefCosts => "def_costs",
            Family::ResStorageStateUpper => "res_storage_state_upper",
            Family::ResStorageStateLower => "res_storage_state_lower",
            Family::ResBudgetTotal => "res_budget_total",
            Family::ResGlobalBudget => "res_global_budget",
            Family::SubCapacity => "sub_capacity",
            Family::SubCapacityFloor => "sub_capacity_floor",
            Family::SubStorageStart => "sub_storage_start",
            Family::SubStorageEnd => "sub_storage_end",
            Family::SubBudget => "sub_budget",
            Family::SubImport => "sub_import",
            Family::SubExport => "sub_export",
            Family::SubHvac => "sub_hvac",
            Family::SubComState => "sub_com_state",
            Family::ComState => "com_state",
            Family::ComTotal => "com_total",
            Family::Cut => "cut",
        }
    }

    /// Families whose right-hand side carries a coupling parameter.
    pub fn is_coupling(&self) -> bool {
        matches!(
            self,
            Family::SubCapacity
                | Family::SubCapacityFloor
                | Family::SubStorageStart
                | Family::SubStorageEnd
                | Family::SubBudget
                | Family::SubImport
                | Family::SubExport
                | Family::SubHvac
                | Family::SubComState
        )
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
