//! Declarative option specification and the option registry built from it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::level::Relation;
use crate::model::option::ConfigOption;

/// Kind of a declared partial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialOrderKind {
    #[serde(rename = "MST", alias = "more-sound-than")]
    MoreSoundThan,
    #[serde(rename = "MPT", alias = "more-precise-than")]
    MorePreciseThan,
}

impl PartialOrderKind {
    pub fn relation(&self) -> Relation {
        match self {
            PartialOrderKind::MoreSoundThan => Relation::Soundness,
            PartialOrderKind::MorePreciseThan => Relation::Precision,
        }
    }
}

/// One `{partial_order, left, right}` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialOrderSpec {
    pub partial_order: PartialOrderKind,
    pub left: String,
    pub right: String,
}

/// Declarative description of one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub levels: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub partial_orders: Vec<PartialOrderSpec>,
}

impl ConfigOption {
    /// Build an option from its declarative spec.
    pub fn from_spec(spec: &OptionSpec) -> ModelResult<Self> {
        let mut option = ConfigOption::new(&spec.name);
        for level in &spec.levels {
            option.add_level(level);
        }
        if let Some(default) = &spec.default {
            option.set_default(default)?;
        }
        for po in &spec.partial_orders {
            option.declare(po.partial_order.relation(), &po.left, &po.right)?;
        }
        Ok(option)
    }
}

/// Registry of every option known to a fuzzing session, keyed by name.
///
/// Built once from declarative specs and shared read-only (via `Arc`) by the
/// oracle and the delta debugger.
#[derive(Debug, Clone, Default)]
pub struct OptionModel {
    options: BTreeMap<String, ConfigOption>,
    specs: Vec<OptionSpec>,
}

impl OptionModel {
    pub fn from_specs(specs: Vec<OptionSpec>) -> ModelResult<Self> {
        let mut options = BTreeMap::new();
        for spec in &specs {
            options.insert(spec.name.clone(), ConfigOption::from_spec(spec)?);
        }
        Ok(Self { options, specs })
    }

    /// Parse a JSON array of option specs.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let specs: Vec<OptionSpec> =
            serde_json::from_str(json).context("parse option specification")?;
        Ok(Self::from_specs(specs)?)
    }

    /// Load a JSON option specification from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        Self::from_json(&raw)
    }

    pub fn get(&self, name: &str) -> ModelResult<&ConfigOption> {
        self.options
            .get(name)
            .ok_or_else(|| ModelError::UnknownOption(name.to_string()))
    }

    pub fn options(&self) -> impl Iterator<Item = &ConfigOption> {
        self.options.values()
    }

    /// The specs this model was built from, for re-serialization.
    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"[
        {
            "name": "cgalgo",
            "levels": ["CHA", "RTA", "VTA", "SPARK"],
            "default": "SPARK",
            "partial_orders": [
                {"partial_order": "MPT", "left": "SPARK", "right": "VTA"},
                {"partial_order": "MPT", "left": "VTA", "right": "RTA"},
                {"partial_order": "MPT", "left": "RTA", "right": "CHA"}
            ]
        },
        {
            "name": "aplength",
            "levels": ["i"],
            "partial_orders": [
                {"partial_order": "more-sound-than", "left": "i", "right": "i-1"}
            ]
        }
    ]"#;

    #[test]
    fn test_model_loads_from_json() {
        let model = OptionModel::from_json(SPEC).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.specs().len(), 2);

        let cg = model.get("cgalgo").unwrap();
        assert_eq!(cg.default_level().unwrap().name, "SPARK");
        assert!(cg.is_more_precise("SPARK", "CHA").unwrap());
        assert!(cg.is_more_sound("CHA", "SPARK").unwrap());

        let ap = model.get("aplength").unwrap();
        assert!(ap.is_more_sound("10", "3").unwrap());
        assert!(!ap.is_more_sound("3", "10").unwrap());
    }

    #[test]
    fn test_unknown_option_is_reported() {
        let model = OptionModel::from_json(SPEC).unwrap();
        assert!(matches!(
            model.get("nope"),
            Err(ModelError::UnknownOption(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_unknown_partial_order_kind_is_rejected() {
        let bad = r#"[{"name": "x", "levels": ["a", "b"],
                      "partial_orders": [{"partial_order": "MXT", "left": "a", "right": "b"}]}]"#;
        assert!(OptionModel::from_json(bad).is_err());
    }

    #[test]
    fn test_default_outside_levels_is_rejected() {
        let spec = OptionSpec {
            name: "x".to_string(),
            levels: vec!["a".to_string()],
            default: Some("b".to_string()),
            partial_orders: vec![],
        };
        assert!(ConfigOption::from_spec(&spec).is_err());
    }
}
