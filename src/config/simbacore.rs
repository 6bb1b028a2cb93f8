use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{DatagenError, Result};

use super::ConfigMap;

/// Numeric parameters of a SimbaCore test case.
///
/// The mode family decides which keys are needed (`seqLen`, `dModel`, ... for the Mamba phases, `dim0..2` for the
/// standalone GeMMs, `numElem` for SIMD), so the keys are kept by name and every mode states the ones it requires.
/// A mode is selected by the presence of its marker key, e.g. `M1_PHASE1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimbaConfig {
    params: BTreeMap<String, u64>,
    /// Numeric keys that are not unsigned integers; only an error once a mode asks for them.
    invalid: BTreeMap<String, String>,
    keys: Vec<String>,
}

impl SimbaConfig {
    pub fn from_map(map: &ConfigMap) -> Self {
        let mut params = BTreeMap::new();
        let mut invalid = BTreeMap::new();
        for (key, value) in map {
            if let Value::Number(n) = value {
                match n.as_u64() {
                    Some(n) => {
                        params.insert(key.clone(), n);
                    }
                    None => {
                        invalid.insert(key.clone(), n.to_string());
                    }
                }
            }
        }
        Self {
            params,
            invalid,
            keys: map.keys().cloned().collect(),
        }
    }

    /// A required parameter.
    pub fn param(&self, key: &str) -> Result<u64> {
        if let Some(raw) = self.invalid.get(key) {
            return Err(DatagenError::config(
                key,
                format!("{raw} is not a non-negative integer"),
            ));
        }
        self.params
            .get(key)
            .copied()
            .ok_or_else(|| DatagenError::config(key, "missing from the configuration"))
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.keys.iter().any(|k| k == marker)
    }

    /// Every numeric parameter, sorted by name.
    pub fn params(&self) -> impl Iterator<Item = (&str, u64)> {
        self.params.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Checks that every key in `required` is present and non-zero.
    pub fn validate(&self, required: &[&str]) -> Result<()> {
        for key in required {
            if self.param(key)? == 0 {
                return Err(DatagenError::config(*key, "must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SimbaConfig;

    #[test]
    fn markers_and_params() {
        let value = json!({"M1_PHASE1": true, "seqLen": 64, "dModel": 32, "name": "x"});
        let cfg = SimbaConfig::from_map(value.as_object().unwrap());
        assert!(cfg.has_marker("M1_PHASE1"));
        assert!(!cfg.has_marker("M2_PHASE2"));
        assert_eq!(cfg.param("seqLen").unwrap(), 64);
        assert!(cfg.param("dInner").is_err());
        assert_eq!(cfg.params().count(), 2);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let value = json!({"seqLen": 0});
        let cfg = SimbaConfig::from_map(value.as_object().unwrap());
        assert!(cfg.validate(&["seqLen"]).is_err());
        assert!(cfg.validate(&["dModel"]).is_err());
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let value = json!({"seqLen": -1, "freq": 1.5});
        let cfg = SimbaConfig::from_map(value.as_object().unwrap());
        assert!(cfg.param("seqLen").is_err());
        assert_eq!(cfg.params().count(), 0);
    }
}
