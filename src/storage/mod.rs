//! Tabular sources: logical names, CSV-backed relations and the shared
//! load-once registry.

mod registry;
mod relation;
mod source;
mod table;

pub use registry::AdapterRegistry;
pub use relation::{Relation, Row};
pub use source::Source;
pub use table::TableAdapter;
