//! Partial-order configuration model.
//!
//! Provides:
//! - [`level::Level`] / [`level::Relation`]: option levels and the two relation kinds
//! - [`option::ConfigOption`]: per-option soundness / precision graphs with reachability queries
//! - [`spec::OptionModel`]: registry of options built from a declarative JSON spec

pub mod level;
pub mod option;
pub mod spec;

pub use level::{Level, Relation, NUMERIC_SENTINEL, NUMERIC_SENTINEL_BELOW};
pub use option::ConfigOption;
pub use spec::{OptionModel, OptionSpec, PartialOrderKind, PartialOrderSpec};
