//! Verification data for SNAX accelerator test programs.
//!
//! Each run turns a workload configuration into one C header: the CSR values of every streamer, the placement of
//! every tensor in the scratchpad, the operands, and the golden results the accelerator must reproduce.

pub mod config;
pub mod emit;
pub mod error;
pub mod golden;
pub mod memory;
pub mod mode;
pub mod quantize;
pub mod sampling;
pub mod streamer;
pub mod types;
pub mod workloads;

pub mod logging;

pub use datagen_macros;

// Re-exports what a driver needs to generate a header.
pub mod prelude {
    pub use crate::config::{finish_options, load_merged, options_builder, GeneratorOptions};
    pub use crate::error::{DatagenError, Result};
    pub use crate::workloads::{run, Generate, Workload, WORKLOADS};
}

// Re-exports the pieces needed to describe a new accelerator mode.
pub mod mode_tools {
    pub use crate::emit::HeaderBuilder;
    pub use crate::memory::{AllocationPolicy, Allocator};
    pub use crate::mode::{ModeBuilder, ModeContext, NamingScheme};
    pub use crate::streamer::{ChannelEnableMask, ChannelGranularity, LoopNest, Port};
    pub use crate::types::{CType, TensorSpec};

    pub use crate::logging::{log_event, log_event_cb};
}
