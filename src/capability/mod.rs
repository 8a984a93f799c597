//! Capability providers
//!
//! A capability provider controls one device or service domain (lighting,
//! scripts, media, ...) and exposes a fixed [`OperationTable`].

mod docs;
mod operation;

pub use docs::{CapabilityDoc, CapabilityPriming, OperationDoc, load_configuration_blob};
pub use operation::{
    CapabilityError, Handler, Operation, OperationOutput, OperationSpec, OperationTable,
    OperationTableBuilder, ParamKind, ParamMismatch, ParamSpec, shape_of,
};

use serde_json::Value;

/// A component offering named operations for one domain
pub trait CapabilityProvider: Send + Sync {
    /// Registered name, matched against a command's `manager_name`
    fn name(&self) -> &str;

    /// One-paragraph description for the model
    fn description(&self) -> &str;

    /// Declared operations
    fn operations(&self) -> &OperationTable;

    /// Configuration data shared with the model (rooms, device ids, ...)
    fn configuration(&self) -> &Value;
}
