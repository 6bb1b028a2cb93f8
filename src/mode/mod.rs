//! Aggregates everything one accelerator mode needs into declarations of a header.
//!
//! A [ModeBuilder] collects port programs, scalars, sampled tests and golden tensors. [ModeBuilder::build] walks the
//! full port enumeration so that every port ends up explicitly enabled or disabled.

pub mod simbacore;

use rustc_hash::FxHashMap;

use crate::{
    emit::HeaderBuilder,
    error::{DatagenError, Result},
    golden::GoldenLoader,
    logging::{events::ModeBuilt, log_event_cb},
    memory::Allocator,
    sampling::SampleSelector,
    streamer::{synthesize, ChannelEnableMask, LoopNest, Port, StreamerDescriptor},
    types::{CType, TensorSpec},
};

/// How port, scalar and tensor names are spelled in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingScheme {
    /// `M<id>_R0_tb[]`, `M<id>_length_x`, `M<id>_test_samples_y[]`. Golden tensors come from `M<id>_<name>.bin`.
    ModePrefixed { id: u32 },
    /// `Atlbound0`, `Aslstride0`, `channel_en_A[]`. Golden tensors come from `<name>.bin`.
    Flat,
}

impl NamingScheme {
    pub fn name(&self, key: &str) -> String {
        match self {
            NamingScheme::ModePrefixed { id } => format!("M{id}_{key}"),
            NamingScheme::Flat => key.to_string(),
        }
    }

    fn port_key(&self, port: &str, field: &str) -> String {
        match self {
            NamingScheme::ModePrefixed { .. } => self.name(&format!("{port}_{field}")),
            NamingScheme::Flat => format!("{port}_{field}"),
        }
    }
}

#[derive(Clone, Debug)]
enum PortState {
    Enabled {
        nest: LoopNest,
        mask: Option<ChannelEnableMask>,
    },
    Disabled,
}

/// Shared resources a mode consumes while building.
pub struct ModeContext<'a> {
    pub sampler: &'a mut SampleSelector,
    pub loader: &'a GoldenLoader,
}

/// What [ModeBuilder::build] produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeSummary {
    pub enabled_ports: usize,
    pub disabled_ports: usize,
    pub declarations: usize,
}

#[derive(Debug)]
pub struct ModeBuilder<P: Port> {
    label: String,
    naming: NamingScheme,
    bank_bytes: u64,
    ports: FxHashMap<P, PortState>,
    scalars: Vec<(String, CType, i64)>,
    tests: Vec<(String, u64)>,
    golden: Vec<(String, CType)>,
}

impl<P: Port> ModeBuilder<P> {
    pub fn new(label: impl Into<String>, naming: NamingScheme, bank_bytes: u64) -> Self {
        Self {
            label: label.into(),
            naming,
            bank_bytes,
            ports: FxHashMap::default(),
            scalars: vec![],
            tests: vec![],
            golden: vec![],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn naming(&self) -> NamingScheme {
        self.naming
    }

    fn decide(&mut self, port: P, state: PortState) -> Result<&mut Self> {
        if self.ports.insert(port, state).is_some() {
            return Err(DatagenError::config(
                self.naming.name(port.name()),
                "port was configured twice",
            ));
        }
        Ok(self)
    }

    /// Enables `port` with `nest`, which must make exactly `transfers` temporal steps.
    pub fn enable(&mut self, port: P, nest: LoopNest, transfers: u64) -> Result<&mut Self> {
        nest.expect_elements(&self.naming.name(port.name()), transfers)?;
        self.decide(port, PortState::Enabled { nest, mask: None })
    }

    /// Enables a port that also carries a channel-enable CSR.
    pub fn enable_masked(
        &mut self,
        port: P,
        nest: LoopNest,
        transfers: u64,
        mask: ChannelEnableMask,
    ) -> Result<&mut Self> {
        nest.expect_elements(&self.naming.name(port.name()), transfers)?;
        self.decide(
            port,
            PortState::Enabled {
                nest,
                mask: Some(mask),
            },
        )
    }

    pub fn disable(&mut self, port: P) -> Result<&mut Self> {
        self.decide(port, PortState::Disabled)
    }

    pub fn scalar(&mut self, key: impl Into<String>, ctype: CType, value: i64) -> &mut Self {
        self.scalars.push((key.into(), ctype, value));
        self
    }

    /// Allocates `specs` back to back and records a `length_<name>` and an `addr_<name>` scalar for each.
    pub fn allocate_tensors(&mut self, specs: &[TensorSpec], alignment: u64) -> Result<&mut Self> {
        let layout = specs
            .iter()
            .fold(Allocator::interleaved().with_alignment(alignment), |alloc, spec| {
                alloc.region(spec.name(), spec.byte_length())
            })
            .allocate()?;
        for spec in specs {
            self.scalar(
                format!("length_{}", spec.name()),
                CType::UInt32,
                layout.length(spec.name())? as i64,
            );
        }
        for spec in specs {
            self.scalar(
                format!("addr_{}", spec.name()),
                CType::UInt32,
                layout.offset(spec.name())? as i64,
            );
        }
        Ok(self)
    }

    /// Requests sampled check indices for an output of `size` elements.
    pub fn test(&mut self, tensor: impl Into<String>, size: u64) -> &mut Self {
        self.tests.push((tensor.into(), size));
        self
    }

    /// Requests that golden tensor `tensor` be loaded and emitted as `ctype`.
    pub fn golden(&mut self, tensor: impl Into<String>, ctype: CType) -> &mut Self {
        self.golden.push((tensor.into(), ctype));
        self
    }

    pub fn build(self, header: &mut HeaderBuilder, ctx: ModeContext<'_>) -> Result<ModeSummary> {
        let before = header.len();
        let mut summary = ModeSummary::default();

        for port in P::ALL {
            let en_name = self.naming.port_key(port.name(), "en");
            match self.ports.get(port) {
                Some(PortState::Enabled { nest, mask }) => {
                    let what = self.naming.name(port.name());
                    let descriptor = synthesize(&what, nest, port.loop_depth(), self.bank_bytes)?;
                    self.emit_descriptor(header, port.name(), &descriptor)?;
                    if let Some(mask) = mask {
                        header.param_array(
                            CType::UInt32,
                            self.naming.name(&format!("channel_en_{}", port.name())),
                            mask.words().iter().copied(),
                        )?;
                    }
                    header.scalar(CType::UInt32, en_name, 1)?;
                    summary.enabled_ports += 1;
                }
                Some(PortState::Disabled) | None => {
                    header.scalar(CType::UInt32, en_name, 0)?;
                    summary.disabled_ports += 1;
                }
            }
        }

        for (key, ctype, value) in &self.scalars {
            header.scalar(*ctype, self.naming.name(key), *value)?;
        }

        for (tensor, size) in &self.tests {
            let name = self.naming.name(&format!("test_samples_{tensor}"));
            let indices = ctx.sampler.select(&name, *size)?;
            header.data_array(CType::Int32, name, indices)?;
        }

        for (tensor, ctype) in &self.golden {
            let values = match self.naming {
                NamingScheme::ModePrefixed { id } => ctx.loader.load_mode(id, tensor)?,
                NamingScheme::Flat => ctx.loader.load(tensor)?,
            };
            header.data_array(*ctype, self.naming.name(tensor), values)?;
        }

        summary.declarations = header.len() - before;
        log_event_cb(|| ModeBuilt {
            mode: self.label.clone(),
            enabled_ports: summary.enabled_ports,
            disabled_ports: summary.disabled_ports,
            declarations: summary.declarations,
        })?;
        Ok(summary)
    }

    fn emit_descriptor(
        &self,
        header: &mut HeaderBuilder,
        port: &str,
        descriptor: &StreamerDescriptor,
    ) -> Result<()> {
        match self.naming {
            NamingScheme::ModePrefixed { .. } => {
                header
                    .param_array(
                        CType::Int32,
                        self.naming.port_key(port, "tb"),
                        descriptor.bounds().iter().copied(),
                    )?
                    .param_array(
                        CType::Int32,
                        self.naming.port_key(port, "ts"),
                        descriptor.strides().iter().copied(),
                    )?
                    .param_array(
                        CType::Int32,
                        self.naming.port_key(port, "ss"),
                        [descriptor.spatial_stride()],
                    )?;
            }
            NamingScheme::Flat => {
                header.scalar(
                    CType::Int32,
                    format!("{port}slstride0"),
                    descriptor.spatial_stride(),
                )?;
                for (level, (bound, stride)) in descriptor
                    .bounds()
                    .iter()
                    .zip(descriptor.strides())
                    .enumerate()
                {
                    header
                        .scalar(CType::Int32, format!("{port}tlbound{level}"), *bound)?
                        .scalar(CType::Int32, format!("{port}tlstride{level}"), *stride)?;
                }
            }
        }
        Ok(())
    }
}
