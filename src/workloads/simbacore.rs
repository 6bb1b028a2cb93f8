use crate::{
    config::{GeneratorOptions, SimbaConfig},
    emit::HeaderBuilder,
    error::Result,
    mode::simbacore::{build_modes, selected_modes},
    types::CType,
};

use super::{resources, Generate};

/// Every SimbaCore mode selected by the configuration, in one header.
pub struct SimbacoreWorkload {
    config: SimbaConfig,
}

impl SimbacoreWorkload {
    pub fn new(config: SimbaConfig) -> Result<Self> {
        selected_modes(&config)?;
        Ok(Self { config })
    }
}

impl Generate for SimbacoreWorkload {
    fn name(&self) -> &'static str {
        "simbacore"
    }

    fn generate(&self, options: &GeneratorOptions, header: &mut HeaderBuilder) -> Result<usize> {
        header.scalar(CType::UInt32, "nb_test_samples", options.nb_test_samples)?;
        // the firmware reads the test case parameters back by name
        for (key, value) in self.config.params() {
            if !header.contains(key) {
                header.scalar(CType::UInt32, key, value)?;
            }
        }

        let (mut sampler, loader) = resources(options);
        let modes = build_modes(
            &self.config,
            options.bank_bytes(),
            options.alignment,
            header,
            &mut sampler,
            &loader,
        )?;
        Ok(modes.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        config::{GeneratorOptionsBuilder, SimbaConfig},
        emit::HeaderBuilder,
    };

    use super::{Generate, SimbacoreWorkload};

    #[test]
    fn parameters_are_echoed_once() {
        let map = json!({"nb_test_samples": 3, "numElem": 64, "name": "case"})
            .as_object()
            .unwrap()
            .clone();
        let workload = SimbacoreWorkload::new(SimbaConfig::from_map(&map)).unwrap();
        let options = GeneratorOptionsBuilder::default()
            .nb_test_samples(3)
            .build()
            .unwrap();
        let mut header = HeaderBuilder::new();
        assert_eq!(workload.generate(&options, &mut header).unwrap(), 0);

        let text = header.finish();
        assert_eq!(text.matches("nb_test_samples").count(), 1);
        assert!(text.contains("uint32_t numElem = 64;"));
        assert!(!text.contains("case"));
    }

    #[test]
    fn conflicting_modes_fail_at_construction() {
        let map = json!({"M5_SIMD_ADD": 1, "M5_SIMD_CMUL": 1})
            .as_object()
            .unwrap()
            .clone();
        assert!(SimbacoreWorkload::new(SimbaConfig::from_map(&map)).is_err());
    }
}
