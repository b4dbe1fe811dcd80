mod execute;
mod plan;

pub use execute::{
    reconcile, reconcile_with_options, Conflict, ReconcileError, ReconcileOptions,
    ReconciliationResult, TargetReport,
};
pub use plan::{
    build_reconciliation_plan, check_distinct_destinations, discover_units, find_target_dirs,
    parse_targets, PlanError, ReconciliationPlan, TargetPlan, TargetSubpath, UnitDir,
};
