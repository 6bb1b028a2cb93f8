//! Configuration loading.
//!
//! A test case is described by two files: the software-side workload parameters and the hardware-side structural
//! parameters. Both are read into one JSON map, hardware keys winning on collision, and then deserialized into the
//! typed configuration of the selected workload.

mod conv;
mod matmul;
mod simbacore;
mod transpose;

pub use conv::{ConvConfig, GemmxAccConfig};
pub use matmul::{MatmulConfig, OpenGemmAccConfig};
pub use simbacore::SimbaConfig;
pub use transpose::{Layout, TransposeConfig, BLOCK};

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::{
    error::{DatagenError, Result},
    memory::WIDE_ALIGNMENT,
    quantize::ZeroShiftPolicy,
    sampling::{SamplingPolicy, DEFAULT_SEED},
    streamer::DEFAULT_BANK_WIDTH,
};

pub type ConfigMap = Map<String, Value>;

/// Key of the optional table that overrides [GeneratorOptions].
pub const OPTIONS_KEY: &str = "datagen";

/// Reads a configuration file. `.toml` files are parsed as TOML, `.json` files as strict JSON and everything else
/// as HJSON, which accepts `#` comments, bare keys and omitted commas.
pub fn load_file(path: &Path) -> Result<ConfigMap> {
    let parse_error = |reason: String| DatagenError::ConfigParse {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    let value: Value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
        Some("json") => serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
        _ => deser_hjson::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(parse_error(format!(
            "expected a table at the top level, found {other}"
        ))),
    }
}

/// Top-level merge: every key of `hardware` replaces the same key of `software`.
pub fn merge(software: ConfigMap, hardware: ConfigMap) -> ConfigMap {
    let mut merged = software;
    merged.extend(hardware);
    merged
}

pub fn load_merged(swcfg: &Path, hwcfg: &Path) -> Result<ConfigMap> {
    Ok(merge(load_file(swcfg)?, load_file(hwcfg)?))
}

/// Deserializes the merged map into a workload configuration. Missing or mistyped keys are reported against
/// `workload`.
pub fn parse<T: DeserializeOwned>(workload: &str, map: &ConfigMap) -> Result<T> {
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| DatagenError::config(workload, e.to_string()))
}

/// Checks a 0/1 flag.
pub(crate) fn flag(key: &str, value: u32) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DatagenError::config(key, format!("{other} is not 0 or 1"))),
    }
}

pub(crate) fn positive(key: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(DatagenError::config(key, "must be positive"));
    }
    Ok(())
}

/// Knobs shared by every workload.
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct GeneratorOptions {
    /// Width of one memory bank, in bits.
    #[builder(default = "DEFAULT_BANK_WIDTH")]
    pub bank_width: u64,

    /// Alignment of every allocated tensor, in bytes.
    #[builder(default = "WIDE_ALIGNMENT")]
    pub alignment: u64,

    #[builder(default = "25")]
    pub nb_test_samples: usize,

    #[builder(default)]
    pub sampling: SamplingPolicy,

    #[builder(default)]
    pub zero_shift: ZeroShiftPolicy,

    /// Where the golden simulator dumps its `.bin` tensors.
    #[builder(default = "PathBuf::from(\"generated\")")]
    pub data_dir: PathBuf,

    /// Seed of the random operand data.
    #[builder(default = "DEFAULT_SEED")]
    pub seed: u64,
}

impl GeneratorOptions {
    pub fn bank_bytes(&self) -> u64 {
        self.bank_width / 8
    }

    pub fn validate(&self) -> Result<()> {
        if self.bank_width == 0 || self.bank_width % 8 != 0 {
            return Err(DatagenError::config(
                "bank_width",
                format!("{} is not a positive multiple of 8 bits", self.bank_width),
            ));
        }
        positive("alignment", self.alignment)?;
        positive("nb_test_samples", self.nb_test_samples as u64)
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            bank_width: DEFAULT_BANK_WIDTH,
            alignment: WIDE_ALIGNMENT,
            nb_test_samples: 25,
            sampling: SamplingPolicy::default(),
            zero_shift: ZeroShiftPolicy::default(),
            data_dir: PathBuf::from("generated"),
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OptionsTable {
    bank_width: Option<u64>,
    alignment: Option<u64>,
    nb_test_samples: Option<usize>,
    sampling: Option<SamplingPolicy>,
    zero_shift: Option<ZeroShiftPolicy>,
    data_dir: Option<PathBuf>,
    seed: Option<u64>,
}

/// Starts a [GeneratorOptionsBuilder] from the `datagen` table of the merged configuration, if there is one.
/// Callers may override further fields (e.g. from the command line) before building.
pub fn options_builder(map: &ConfigMap) -> Result<GeneratorOptionsBuilder> {
    let table: OptionsTable = match map.get(OPTIONS_KEY) {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| DatagenError::config(OPTIONS_KEY, e.to_string()))?,
        None => OptionsTable::default(),
    };
    let mut builder = GeneratorOptionsBuilder::default();
    if let Some(v) = table.bank_width {
        builder = builder.bank_width(v);
    }
    if let Some(v) = table.alignment {
        builder = builder.alignment(v);
    }
    // test cases often carry the sample count next to their other parameters
    let samples = table.nb_test_samples.or_else(|| {
        map.get("nb_test_samples")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
    });
    if let Some(v) = samples {
        builder = builder.nb_test_samples(v);
    }
    if let Some(v) = table.sampling {
        builder = builder.sampling(v);
    }
    if let Some(v) = table.zero_shift {
        builder = builder.zero_shift(v);
    }
    if let Some(v) = table.data_dir {
        builder = builder.data_dir(v);
    }
    if let Some(v) = table.seed {
        builder = builder.seed(v);
    }
    Ok(builder)
}

/// Finishes a builder and validates the result.
pub fn finish_options(builder: GeneratorOptionsBuilder) -> Result<GeneratorOptions> {
    let options = builder
        .build()
        .map_err(|e| DatagenError::config(OPTIONS_KEY, e.to_string()))?;
    options.validate()?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::sampling::SamplingPolicy;

    use super::{finish_options, load_file, merge, options_builder, ConfigMap};

    fn map(value: serde_json::Value) -> ConfigMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn hjson_files_accept_comments_and_bare_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.hjson");
        std::fs::write(&path, "{\n  # workload size\n  M: 2\n  K: 3\n  layout: NMN8x8\n}\n").unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded["M"].as_u64(), Some(2));
        assert_eq!(loaded["K"].as_u64(), Some(3));
        assert_eq!(loaded["layout"], "NMN8x8");
    }

    #[test]
    fn json_files_stay_strict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, "{ M: 2 }").unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn toml_files_are_read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hw.toml");
        std::fs::write(&path, "meshRow = 8\n[datagen]\nseed = 3\n").unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded["meshRow"], 8);
        assert_eq!(loaded["datagen"]["seed"], 3);
    }

    #[test]
    fn hardware_wins_on_collision() {
        let merged = merge(
            map(json!({"M": 2, "meshRow": 4})),
            map(json!({"meshRow": 8, "bankWidth": 64})),
        );
        assert_eq!(merged["M"], 2);
        assert_eq!(merged["meshRow"], 8);
        assert_eq!(merged["bankWidth"], 64);
    }

    #[test]
    fn options_default_without_a_table() {
        let options = finish_options(options_builder(&ConfigMap::new()).unwrap()).unwrap();
        assert_eq!(options.bank_width, 64);
        assert_eq!(options.bank_bytes(), 8);
        assert_eq!(options.nb_test_samples, 25);
        assert_eq!(options.sampling, SamplingPolicy::Seeded(42));
        assert_eq!(options.data_dir.to_str(), Some("generated"));
    }

    #[test]
    fn options_table_overrides_defaults() {
        let merged = map(json!({
            "datagen": {"nb_test_samples": 4, "sampling": "unseeded", "zero_shift": "reject"}
        }));
        let options = finish_options(options_builder(&merged).unwrap()).unwrap();
        assert_eq!(options.nb_test_samples, 4);
        assert_eq!(options.sampling, SamplingPolicy::Unseeded);
    }

    #[test]
    fn top_level_sample_count_is_honored() {
        let merged = map(json!({"nb_test_samples": 7}));
        let options = finish_options(options_builder(&merged).unwrap()).unwrap();
        assert_eq!(options.nb_test_samples, 7);
    }

    #[test]
    fn unknown_option_keys_are_rejected() {
        let merged = map(json!({"datagen": {"nb_samples": 4}}));
        assert!(options_builder(&merged).is_err());
    }

    #[test]
    fn invalid_bank_widths_are_rejected() {
        let merged = map(json!({"datagen": {"bank_width": 12}}));
        assert!(finish_options(options_builder(&merged).unwrap()).is_err());
    }
}
