use datagen_macros::event_type_internal;
use serde::{Deserialize, Serialize};

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DescriptorSynthesized {
    pub port: String,
    pub bounds: Vec<u64>,
    pub strides: Vec<i64>,
    pub spatial_stride: i64,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegionAllocated {
    pub name: String,
    pub offset: u64,
    pub length: u64,
    pub alias_of: Option<String>,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModeBuilt {
    pub mode: String,
    pub enabled_ports: usize,
    pub disabled_ports: usize,
    pub declarations: usize,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GoldenLoaded {
    pub tensor: String,
    pub path: String,
    pub elements: usize,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SamplesSelected {
    pub tensor: String,
    pub tensor_size: usize,
    pub count: usize,
}

/// Raised whenever sample indices are drawn without an explicit seed.
#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnseededSampling {
    pub tensor: String,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ZeroShiftApplied {
    pub policy: String,
}

#[event_type_internal]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkloadFinished {
    pub workload: String,
    pub modes: usize,
    pub bytes: usize,
}
