use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{BindingProperty, ModuleDef, Restriction};

/// The fully-bound property view one permutation compiles against: every
/// binding property has exactly one value, and the module's configuration
/// properties ride along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPropertyOracle {
    values: BTreeMap<String, String>,
    configuration: BTreeMap<String, String>,
}

impl StaticPropertyOracle {
    pub fn new(module: &ModuleDef, values: BTreeMap<String, String>) -> StaticPropertyOracle {
        StaticPropertyOracle {
            values,
            configuration: module.configuration.clone(),
        }
    }

    pub fn from_parts(
        values: BTreeMap<String, String>,
        configuration: BTreeMap<String, String>,
    ) -> StaticPropertyOracle {
        StaticPropertyOracle {
            values,
            configuration,
        }
    }

    pub fn property_value(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::UnboundProperty(name.to_string()))
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn configuration_bool(&self, key: &str) -> bool {
        self.configuration.get(key).map(String::as_str) == Some("true")
    }
}

/// Enumerates the binding-property cross-product in declared order: the
/// last declared property varies fastest, and restricted combinations are
/// skipped without consuming an index.
pub struct PropertyPermutations<'a> {
    properties: &'a [BindingProperty],
    restrictions: &'a [Restriction],
    indices: Option<Vec<usize>>,
}

impl<'a> PropertyPermutations<'a> {
    pub fn new(module: &'a ModuleDef) -> PropertyPermutations<'a> {
        PropertyPermutations {
            properties: &module.properties,
            restrictions: &module.restrictions,
            indices: Some(vec![0; module.properties.len()]),
        }
    }

    fn combination(&self, indices: &[usize]) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .zip(indices)
            .map(|(prop, &i)| (prop.name.clone(), prop.values[i].clone()))
            .collect()
    }

    fn advance(&mut self) {
        let indices = match &mut self.indices {
            Some(indices) => indices,
            None => return,
        };
        for pos in (0..indices.len()).rev() {
            indices[pos] += 1;
            if indices[pos] < self.properties[pos].values.len() {
                return;
            }
            indices[pos] = 0;
        }
        // Every digit wrapped; the odometer is done. A module with no
        // properties yields exactly one (empty) combination first.
        self.indices = None;
    }

    fn allowed(&self, combo: &BTreeMap<String, String>) -> bool {
        self.restrictions.iter().all(|r| {
            if combo.get(&r.when_property) != Some(&r.when_value) {
                return true;
            }
            match combo.get(&r.property) {
                Some(value) => r.values.contains(value),
                None => true,
            }
        })
    }
}

impl<'a> Iterator for PropertyPermutations<'a> {
    type Item = BTreeMap<String, String>;

    fn next(&mut self) -> Option<BTreeMap<String, String>> {
        loop {
            let indices = self.indices.as_ref()?;
            let combo = self.combination(indices);
            self.advance();
            if self.allowed(&combo) {
                return Some(combo);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn module(text: &str) -> ModuleDef {
        ModuleDef::parse(text, Path::new(".")).unwrap()
    }

    #[test]
    fn last_property_varies_fastest() {
        let m = module(
            r#"
            name = "m"
            sources = ["m.js"]
            [[property]]
            name = "a"
            values = ["true", "false"]
            [[property]]
            name = "b"
            values = ["x", "y"]
        "#,
        );
        let combos: Vec<_> = PropertyPermutations::new(&m)
            .map(|c| (c["a"].clone(), c["b"].clone()))
            .collect();
        assert_eq!(
            combos,
            vec![
                ("true".to_string(), "x".to_string()),
                ("true".to_string(), "y".to_string()),
                ("false".to_string(), "x".to_string()),
                ("false".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn restrictions_drop_combinations() {
        let m = module(
            r#"
            name = "m"
            sources = ["m.js"]
            [[property]]
            name = "user.agent"
            values = ["ie6", "gecko"]
            [[property]]
            name = "css3"
            values = ["on", "off"]
            [[restrict]]
            when-property = "user.agent"
            when-value = "ie6"
            property = "css3"
            values = ["off"]
        "#,
        );
        let combos: Vec<_> = PropertyPermutations::new(&m).collect();
        assert_eq!(combos.len(), 3);
        assert!(!combos
            .iter()
            .any(|c| c["user.agent"] == "ie6" && c["css3"] == "on"));
    }

    #[test]
    fn no_properties_means_one_permutation() {
        let m = module(
            r#"
            name = "m"
            sources = ["m.js"]
        "#,
        );
        let combos: Vec<_> = PropertyPermutations::new(&m).collect();
        assert_eq!(combos, vec![BTreeMap::new()]);
    }
}
