//! The generators, one per accelerator test program.
//!
//! A [Workload] is built from the merged configuration, validated eagerly, and then appends its declarations to a
//! [HeaderBuilder]. [run] wraps one generation and reports it to the event log.

mod conv;
mod matmul;
mod simbacore;
mod transpose;

pub use conv::ConvWorkload;
pub use matmul::MatmulWorkload;
pub use simbacore::SimbacoreWorkload;
pub use transpose::TransposeWorkload;

use enum_dispatch::enum_dispatch;

use crate::{
    config::{parse, ConfigMap, GeneratorOptions, SimbaConfig},
    emit::HeaderBuilder,
    error::{DatagenError, Result},
    golden::GoldenLoader,
    logging::{events::WorkloadFinished, log_event_cb, set_log_scope},
    sampling::SampleSelector,
};

/// Names accepted by [Workload::from_config].
pub const WORKLOADS: &[&str] = &["matmul", "conv", "simbacore", "transpose"];

#[enum_dispatch(Workload)]
pub trait Generate {
    fn name(&self) -> &'static str;

    /// Appends every declaration of the workload and returns the number of modes it built.
    fn generate(&self, options: &GeneratorOptions, header: &mut HeaderBuilder) -> Result<usize>;
}

#[enum_dispatch]
pub enum Workload {
    Matmul(MatmulWorkload),
    Conv(ConvWorkload),
    Simbacore(SimbacoreWorkload),
    Transpose(TransposeWorkload),
}

impl Workload {
    pub fn from_config(name: &str, map: &ConfigMap) -> Result<Self> {
        Ok(match name {
            "matmul" => MatmulWorkload::new(parse(name, map)?)?.into(),
            "conv" => ConvWorkload::new(parse(name, map)?)?.into(),
            "simbacore" => SimbacoreWorkload::new(SimbaConfig::from_map(map))?.into(),
            "transpose" => TransposeWorkload::new(parse(name, map)?)?.into(),
            other => {
                return Err(DatagenError::config(
                    "workload",
                    format!("unknown workload `{other}`, expected one of {WORKLOADS:?}"),
                ))
            }
        })
    }
}

/// Generates the complete header text of `workload`.
pub fn run(workload: &Workload, options: &GeneratorOptions) -> Result<String> {
    options.validate()?;
    set_log_scope(workload.name());
    let mut header = HeaderBuilder::new();
    let modes = workload.generate(options, &mut header)?;
    let text = header.finish();
    log_event_cb(|| WorkloadFinished {
        workload: workload.name().to_string(),
        modes,
        bytes: text.len(),
    })?;
    Ok(text)
}

/// The sampler and golden loader configured by `options`.
pub(crate) fn resources(options: &GeneratorOptions) -> (SampleSelector, GoldenLoader) {
    (
        SampleSelector::new(options.sampling, options.nb_test_samples),
        GoldenLoader::new(options.data_dir.clone()),
    )
}

/// First loop of a port that moves a `total_bits`-wide array operand through a `serial_width`-bit interface:
/// as many serial beats as needed, each advancing by the banks one beat covers.
pub(crate) fn serial_loop(total_bits: u64, serial_width: u64, bank_width: u64) -> (u64, i64) {
    let bound = (total_bits / serial_width).max(1);
    let banks = serial_width.min(total_bits) / bank_width;
    (bound, (banks * (bank_width / 8)) as i64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{serial_loop, Generate, Workload};

    #[test]
    fn serial_loops() {
        // 8x8 int32 tile over a 512-bit interface: 4 beats of 8 banks
        assert_eq!(serial_loop(2048, 512, 64), (4, 64));
        // interface wider than the tile: one beat
        assert_eq!(serial_loop(256, 512, 64), (1, 32));
    }

    #[test]
    fn unknown_workloads_are_rejected() {
        let map = json!({}).as_object().unwrap().clone();
        assert!(Workload::from_config("fft", &map).is_err());
    }

    #[test]
    fn simbacore_needs_no_typed_keys() {
        let map = json!({"M3_OSGEMM": 1}).as_object().unwrap().clone();
        let workload = Workload::from_config("simbacore", &map).unwrap();
        assert_eq!(workload.name(), "simbacore");
    }
}
