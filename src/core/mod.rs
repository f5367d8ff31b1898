pub mod provenance;
pub mod types;
pub mod validation;
pub mod value;

pub use provenance::{Provenance, build_provenance, fingerprint, stamp};
pub use types::{
    AlignedGrid, AssumptionView, ExportPayload, GridError, PayloadError, RetirementScenario, Row,
    Schedule, SensitivityCell, SensitivityGrid, Totals,
};
pub use validation::{assumptions_of, validate_assumption_ranges};
pub use value::{Lookup, coerce_money, coerce_number, lookup};
