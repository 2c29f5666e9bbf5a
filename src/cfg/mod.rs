//! Module definition loading and the permutation space it induces.
//!
//! A module definition names the JavaScript sources to compile, the static
//! resources to publish, the binding properties whose value combinations
//! become permutations, and the rebind rules that answer `$rebind(...)`
//! requests per permutation.

mod permutations;

pub use permutations::{PropertyPermutations, StaticPropertyOracle};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const EMULATED_STACK: &str = "compiler.emulatedStack";
pub const RECORD_FILE_NAMES: &str = "compiler.emulatedStack.recordFileNames";
pub const RECORD_LINE_NUMBERS: &str = "compiler.emulatedStack.recordLineNumbers";

/// One deferred-binding axis: a named, finite, ordered set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingProperty {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

impl BindingProperty {
    /// A property whose allowed set has exactly one value is statically
    /// bound and never appears in selection-script dispatch.
    pub fn constrained_value(&self) -> Option<&str> {
        match self.values.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }
}

/// Drops combinations from the cross-product: when `when_property` takes
/// `when_value`, `property` may only take one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    #[serde(rename = "when-property")]
    pub when_property: String,
    #[serde(rename = "when-value")]
    pub when_value: String,
    pub property: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebindCondition {
    pub property: String,
    pub value: String,
    pub answer: String,
}

/// Answers one `$rebind(name)` request. Conditions are checked in
/// declaration order and the first that matches the permutation wins;
/// `default` answers when none match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebindRule {
    pub name: String,
    pub default: String,
    #[serde(default, rename = "when")]
    pub when: Vec<RebindCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub public: Vec<String>,
    #[serde(default, rename = "property")]
    pub properties: Vec<BindingProperty>,
    #[serde(default, rename = "restrict")]
    pub restrictions: Vec<Restriction>,
    #[serde(default, rename = "rebind")]
    pub rebinds: Vec<RebindRule>,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
    /// Directory the module file was loaded from; source and public paths
    /// resolve against it. Not part of the on-disk format.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ModuleDef {
    pub fn load(path: &Path) -> Result<ModuleDef> {
        let text = fs::read_to_string(path)?;
        let mut module: ModuleDef = toml::from_str(&text)
            .map_err(|e| Error::Module(format!("{}: {}", path.display(), e)))?;
        module.base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        module.validate()?;
        debug!(
            "loaded module '{}': {} sources, {} properties, {} rebind rules",
            module.name,
            module.sources.len(),
            module.properties.len(),
            module.rebinds.len()
        );
        Ok(module)
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<ModuleDef> {
        let mut module: ModuleDef =
            toml::from_str(text).map_err(|e| Error::Module(e.to_string()))?;
        module.base_dir = base_dir.to_path_buf();
        module.validate()?;
        Ok(module)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Module("module name must not be empty".to_string()));
        }
        if self.sources.is_empty() {
            return Err(Error::Module(format!(
                "module '{}' declares no sources",
                self.name
            )));
        }
        for prop in &self.properties {
            if prop.values.is_empty() {
                return Err(Error::Module(format!(
                    "property '{}' has no values",
                    prop.name
                )));
            }
            if let Some(fallback) = &prop.fallback {
                if !prop.values.contains(fallback) {
                    return Err(Error::Module(format!(
                        "property '{}' fallback '{}' is not one of its values",
                        prop.name, fallback
                    )));
                }
            }
        }
        for restrict in &self.restrictions {
            self.check_property_value(&restrict.when_property, &restrict.when_value)?;
            for value in &restrict.values {
                self.check_property_value(&restrict.property, value)?;
            }
        }
        for rule in &self.rebinds {
            for cond in &rule.when {
                self.check_property_value(&cond.property, &cond.value)?;
            }
        }
        Ok(())
    }

    fn check_property_value(&self, name: &str, value: &str) -> Result<()> {
        match self.property(name) {
            Some(prop) if prop.values.iter().any(|v| v == value) => Ok(()),
            Some(_) => Err(Error::Module(format!(
                "'{}' is not a value of property '{}'",
                value, name
            ))),
            None => Err(Error::Module(format!("unknown property '{}'", name))),
        }
    }

    pub fn property(&self, name: &str) -> Option<&BindingProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn rebind_rule(&self, request: &str) -> Option<&RebindRule> {
        self.rebinds.iter().find(|r| r.name == request)
    }

    /// Resolves one rebind request against a permutation's bound values.
    pub fn rebind_answer(
        &self,
        request: &str,
        properties: &BTreeMap<String, String>,
    ) -> Option<String> {
        let rule = self.rebind_rule(request)?;
        for cond in &rule.when {
            if properties.get(&cond.property).map(String::as_str) == Some(cond.value.as_str()) {
                return Some(cond.answer.clone());
            }
        }
        Some(rule.default.clone())
    }

    /// Properties with more than one allowed value overall; only these
    /// participate in runtime selection.
    pub fn unbound_properties(&self) -> Vec<&BindingProperty> {
        self.properties
            .iter()
            .filter(|p| p.constrained_value().is_none())
            .collect()
    }

    pub fn configuration_bool(&self, key: &str) -> bool {
        self.configuration.get(key).map(String::as_str) == Some("true")
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.sources.iter().map(|s| self.base_dir.join(s)).collect()
    }

    pub fn public_paths(&self) -> Vec<(String, PathBuf)> {
        self.public
            .iter()
            .map(|p| (p.clone(), self.base_dir.join(p)))
            .collect()
    }
}
