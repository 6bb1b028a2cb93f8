//! The SimbaCore mode table.
//!
//! Every operating mode of SimbaCore drives a subset of the 18 streamer ports. Instead of one generator per mode, a
//! mode is a row in [MODE_TABLE]: the marker key that selects it, the parameters it needs and a rule that programs
//! the ports it uses. Ports a rule does not touch are emitted as disabled by [ModeBuilder::build].

use rustc_hash::FxHashMap;

use crate::{
    config::SimbaConfig,
    emit::HeaderBuilder,
    error::{DatagenError, Result},
    golden::GoldenLoader,
    sampling::SampleSelector,
    streamer::{LoopNest, SimbaPort},
    types::{CType, TensorSpec, BF16, FP8},
};

use super::{ModeBuilder, ModeContext, ModeSummary, NamingScheme};

/// Width of one memory bank, in bits.
const BANK_WIDTH: u64 = 64;
const BANK_BYTES: i64 = 8;

type Rule = fn(&Params<'_>, &mut ModeBuilder<SimbaPort>) -> Result<()>;

pub struct ModeSpec {
    pub id: u32,
    /// Configuration key whose presence selects this mode.
    pub marker: &'static str,
    /// Parameters that must be present and non-zero.
    pub required: &'static [&'static str],
    rule: Rule,
}

const PHASE1_KEYS: &[&str] = &[
    "seqLen",
    "dModel",
    "dInner",
    "dConv",
    "xProjDim",
    "seqLenUnroll",
    "dInnerUnroll",
    "switchcore_width",
];

const PHASE2_KEYS: &[&str] = &[
    "seqLen",
    "dModel",
    "dInner",
    "dtRank",
    "dConv",
    "dState",
    "xProjDim",
    "seqLenUnroll",
    "dInnerUnroll",
    "dtRankUnroll",
    "convUnroll",
    "delaySU",
    "oscore_serial_width",
    "switchcore_width",
    "iscore_serial_width",
    "suc_serial_width_A",
    "suc_serial_width_BC",
];

pub const MODE_TABLE: &[ModeSpec] = &[
    ModeSpec {
        id: 1,
        marker: "M1_PHASE1",
        required: PHASE1_KEYS,
        rule: phase1,
    },
    ModeSpec {
        id: 2,
        marker: "M2_PHASE2",
        required: PHASE2_KEYS,
        rule: phase2,
    },
    ModeSpec {
        id: 3,
        marker: "M3_OSGEMM",
        required: &["dim0", "dim1", "dim2", "seqLenUnroll", "dInnerUnroll", "oscore_serial_width"],
        rule: osgemm,
    },
    ModeSpec {
        id: 4,
        marker: "M4_ISGEMM",
        required: &["dim0", "dim1", "dim2", "seqLenUnroll", "dInnerUnroll", "iscore_serial_width"],
        rule: isgemm,
    },
    ModeSpec {
        id: 5,
        marker: "M5_SIMD_ADD",
        required: &["numElem", "suc_serial_width_BC", "seqLenUnroll"],
        rule: simd_add,
    },
    ModeSpec {
        id: 5,
        marker: "M5_SIMD_CMUL",
        required: &["seqLen", "suc_serial_width_BC", "seqLenUnroll"],
        rule: simd_cmul,
    },
];

/// What a rule sees: the parameters and the address alignment.
pub struct Params<'a> {
    cfg: &'a SimbaConfig,
    alignment: u64,
}

impl Params<'_> {
    fn get(&self, key: &str) -> Result<u64> {
        self.cfg.param(key)
    }
}

/// Checks a hardware assumption of a mode.
fn ensure(cond: bool, key: &str, reason: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(DatagenError::config(key, reason))
    }
}

/// Temporal steps a port makes to stream `elements` values of `bits` bits, `step` bits per step, `passes` times over.
fn steps(elements: u64, bits: u64, step: u64, passes: u64) -> u64 {
    (elements * bits).div_ceil(step) * passes
}

fn nest(bounds: &[u64], strides: &[u64]) -> Result<LoopNest> {
    let strides: Vec<i64> = strides.iter().map(|s| *s as i64).collect();
    LoopNest::from_lists(bounds, &strides)
}

impl ModeSpec {
    pub fn label(&self) -> &'static str {
        self.marker
    }

    /// Programs the mode and appends it to `header`.
    pub fn build(
        &self,
        cfg: &SimbaConfig,
        bank_bytes: u64,
        alignment: u64,
        header: &mut HeaderBuilder,
        ctx: ModeContext<'_>,
    ) -> Result<ModeSummary> {
        cfg.validate(self.required)?;
        let mut mode = ModeBuilder::new(
            self.marker,
            NamingScheme::ModePrefixed { id: self.id },
            bank_bytes,
        );
        (self.rule)(&Params { cfg, alignment }, &mut mode)?;
        mode.build(header, ctx)
    }
}

/// The modes selected by `cfg`, in table order. Two selected modes may not share an id.
pub fn selected_modes(cfg: &SimbaConfig) -> Result<Vec<&'static ModeSpec>> {
    let mut seen: FxHashMap<u32, &'static str> = FxHashMap::default();
    let mut selected = vec![];
    for spec in MODE_TABLE.iter().filter(|spec| cfg.has_marker(spec.marker)) {
        if let Some(other) = seen.insert(spec.id, spec.marker) {
            return Err(DatagenError::config(
                spec.marker,
                format!("mode id {} is already taken by {other}", spec.id),
            ));
        }
        selected.push(spec);
    }
    Ok(selected)
}

/// Builds every selected mode into `header`.
pub fn build_modes(
    cfg: &SimbaConfig,
    bank_bytes: u64,
    alignment: u64,
    header: &mut HeaderBuilder,
    sampler: &mut SampleSelector,
    loader: &GoldenLoader,
) -> Result<Vec<ModeSummary>> {
    selected_modes(cfg)?
        .into_iter()
        .map(|spec| {
            spec.build(
                cfg,
                bank_bytes,
                alignment,
                header,
                ModeContext {
                    sampler: &mut *sampler,
                    loader,
                },
            )
        })
        .collect()
}

/// OS core input A: `[K, M, N]` with N irrelevant.
fn oscore_in(k: u64, m_tiles: u64, n_tiles: u64, mu: u64) -> Result<LoopNest> {
    nest(&[k, m_tiles, n_tiles], &[mu * FP8 / 8, k * mu * FP8 / 8, 0])
}

/// GeMM weight B: `[K, M, N]` with M irrelevant.
fn gemm_weight(k: u64, m_tiles: u64, n_tiles: u64, nu: u64) -> Result<LoopNest> {
    nest(&[k, m_tiles, n_tiles], &[nu * FP8 / 8, 0, k * nu * FP8 / 8])
}

/// IS core psums: zeros first, then the same output matrix once per reduction step.
fn iscore_psum(outputs: u64, reductions: u64, mu: u64) -> Result<LoopNest> {
    nest(&[outputs, reductions], &[mu * BF16 / 8, 0])
}

/// A flat, bank-by-bank stream of `bits` bits through a port `width` bits wide.
fn flat(bits: u64, width: u64) -> Result<LoopNest> {
    nest(&[bits / width], &[width / 8])
}

fn phase1(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let seq_len = p.get("seqLen")?;
    let d_model = p.get("dModel")?;
    let d_inner = p.get("dInner")?;
    let d_conv = p.get("dConv")?;
    let x_proj = p.get("xProjDim")?;
    let mu = p.get("seqLenUnroll")?;
    let nu = p.get("dInnerUnroll")?;
    ensure(
        p.get("switchcore_width")? == BANK_WIDTH,
        "switchcore_width",
        format!("must match the {BANK_WIDTH}-bit bank width"),
    )?;

    let (m_tiles, n_tiles) = (seq_len / mu, d_inner / nu);
    let psum = iscore_psum(m_tiles * x_proj, n_tiles, mu)?;
    let psum_steps = steps(seq_len * x_proj, BF16, mu * BF16, n_tiles);
    mode.enable(
        SimbaPort::R0,
        oscore_in(d_model, m_tiles, n_tiles, mu)?,
        steps(seq_len * d_model, FP8, mu * FP8, n_tiles),
    )?
    .enable(
        SimbaPort::R1,
        gemm_weight(d_model, m_tiles, n_tiles, nu)?,
        steps(d_model * d_inner, FP8, nu * FP8, m_tiles),
    )?
    .enable(
        SimbaPort::R3,
        flat(d_conv * d_inner * FP8, BANK_WIDTH)?,
        steps(d_inner * d_conv, FP8, BANK_WIDTH, 1),
    )?
    .enable(
        SimbaPort::R4,
        flat(d_inner * FP8, BANK_WIDTH)?,
        steps(d_inner, FP8, BANK_WIDTH, 1),
    )?
    .enable(
        SimbaPort::R12,
        gemm_weight(x_proj, m_tiles, n_tiles, nu)?,
        steps(d_inner * x_proj, FP8, nu * FP8, m_tiles),
    )?
    .enable(SimbaPort::R13, psum.clone(), psum_steps)?
    .enable(
        SimbaPort::W1,
        flat(seq_len * d_inner * FP8, BANK_WIDTH)?,
        steps(seq_len * d_inner, FP8, BANK_WIDTH, 1),
    )?
    .enable(SimbaPort::W3, psum, psum_steps)?;

    mode.allocate_tensors(
        &[
            TensorSpec::new("oscore_in", FP8, &[seq_len, d_model]),
            TensorSpec::new("oscore_weight", FP8, &[d_model, d_inner]),
            TensorSpec::new("conv_weight", FP8, &[d_inner, d_conv]),
            TensorSpec::new("conv_bias", FP8, &[d_inner]),
            TensorSpec::new("conv_out", FP8, &[seq_len, d_inner]),
            TensorSpec::new("iscore_weight", FP8, &[d_inner, x_proj]),
            // room for BF16 psums, only the first half is valid at the end
            TensorSpec::new("iscore_out", BF16, &[seq_len, x_proj]),
        ],
        p.alignment,
    )?;

    mode.test("conv_out", seq_len * d_inner)
        .test("iscore_out", seq_len * x_proj);
    for tensor in [
        "oscore_in",
        "oscore_weight",
        "conv_weight",
        "conv_bias",
        "conv_out",
        "iscore_weight",
        "iscore_bias",
        "iscore_out",
    ] {
        mode.golden(tensor, CType::UInt8);
    }
    Ok(())
}

/// When the SU core may start on OS core output and the IS core on SU core output.
///
/// Returns `(os_tiles, su_elements)`: the number of OS core output tiles after which the SU core can start, and the
/// number of SU core output elements after which the IS core can start. Both are capped by the totals.
pub fn safe_to_start(seq_len: u64, d_model: u64, d_inner: u64, mu: u64, nu: u64) -> (u64, u64) {
    let gemm_tiles = ((seq_len / mu) * (d_inner / nu)) as u128;
    let suc_elements = (seq_len * d_inner) as u128;
    // cycles a GeMM core needs per tensor versus the SU core's one element per cycle
    let gemm_cycles = gemm_tiles * d_model as u128;
    let gemm_window = (seq_len / mu) as u128;
    let suc_window = (seq_len * nu) as u128;

    let suc_start = if gemm_cycles > suc_elements {
        gemm_window * gemm_cycles / suc_elements
    } else {
        gemm_window
    };
    let iscore_start = if suc_elements > gemm_cycles && gemm_cycles > 0 {
        suc_window * suc_elements / gemm_cycles
    } else {
        suc_window
    };
    (
        suc_start.min(gemm_tiles) as u64,
        iscore_start.min(suc_elements) as u64,
    )
}

fn phase2(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let seq_len = p.get("seqLen")?;
    let d_model = p.get("dModel")?;
    let d_inner = p.get("dInner")?;
    let dt_rank = p.get("dtRank")?;
    let d_conv = p.get("dConv")?;
    let d_state = p.get("dState")?;
    let x_proj = p.get("xProjDim")?;
    let mu = p.get("seqLenUnroll")?;
    let nu = p.get("dInnerUnroll")?;
    let dt_rank_unroll = p.get("dtRankUnroll")?;
    let conv_unroll = p.get("convUnroll")?;
    let delay_su = p.get("delaySU")?;
    let osw = p.get("oscore_serial_width")?;
    let scw = p.get("switchcore_width")?;
    let isw = p.get("iscore_serial_width")?;
    let ssw_a = p.get("suc_serial_width_A")?;
    let ssw_bc = p.get("suc_serial_width_BC")?;

    ensure(
        dt_rank * FP8 % scw == 0,
        "dtRank",
        "must be divisible by the switchCore elements per cycle",
    )?;
    ensure(
        scw == BANK_WIDTH,
        "switchcore_width",
        format!("must match the {BANK_WIDTH}-bit bank width"),
    )?;
    let rest_unroll = dt_rank_unroll.checked_sub(d_conv).ok_or_else(|| {
        DatagenError::config(
            "dtRankUnroll",
            format!("{dt_rank_unroll} is smaller than dConv ({d_conv})"),
        )
    })?;

    let (m_tiles, n_tiles) = (seq_len / mu, d_inner / nu);
    let conv_to_suc = nest(
        &[
            (conv_unroll * mu) / (BANK_WIDTH / FP8),
            m_tiles,
            nu / conv_unroll,
            n_tiles,
        ],
        &[
            BANK_BYTES as u64,
            mu * nu * FP8 / 8,
            conv_unroll * mu * FP8 / 8,
            seq_len * nu * FP8 / 8,
        ],
    )?;
    let dt_tiles = (dt_rank / dt_rank_unroll) * (d_inner / conv_unroll);
    let psum = iscore_psum(m_tiles * d_model, n_tiles, mu)?;
    let conv_format = |width: u64| flat(mu * nu * FP8 * n_tiles * m_tiles, width);

    let dt_groups = dt_rank / dt_rank_unroll;
    let activation_steps = steps(seq_len * d_inner, FP8, BANK_WIDTH, 1);
    let psum_steps = steps(seq_len * d_model, BF16, mu * BF16, n_tiles);
    mode.enable(
        SimbaPort::R0,
        oscore_in(d_model, m_tiles, n_tiles, mu)?,
        steps(seq_len * d_model, FP8, mu * FP8, n_tiles),
    )?
    .enable(
        SimbaPort::R1,
        gemm_weight(d_model, m_tiles, n_tiles, nu)?,
        steps(d_model * d_inner, FP8, nu * FP8, m_tiles),
    )?
    .enable(
        SimbaPort::R2,
        nest(
            &[dt_rank * FP8 / scw, mu, m_tiles, d_inner / conv_unroll],
            &[(scw / 8) * mu, BANK_BYTES as u64, mu * x_proj * FP8 / 8, 0],
        )?
        .with_spatial_stride(mu as i64 * BANK_BYTES),
        // dt is read once per group of conv_unroll channels
        steps(seq_len * dt_rank, FP8, scw, d_inner / conv_unroll),
    )?
    .enable(
        SimbaPort::R3,
        nest(&[dt_tiles * (conv_unroll * d_conv * FP8 / scw)], &[scw / 8])?,
        steps(d_inner * dt_groups * d_conv, FP8, scw, 1),
    )?
    .enable(
        SimbaPort::R4,
        flat(d_inner * FP8, scw)?,
        steps(d_inner, FP8, scw, 1),
    )?
    .enable(
        SimbaPort::R5,
        nest(&[dt_tiles * (conv_unroll * rest_unroll * FP8 / scw)], &[scw / 8])?,
        steps(d_inner * dt_groups * rest_unroll, FP8, scw, 1),
    )?
    .enable(
        SimbaPort::R6,
        nest(&[d_inner * (d_state * FP8 / ssw_a)], &[ssw_a / 8])?,
        steps(d_inner * d_state, FP8, ssw_a, 1),
    )?
    .enable(
        SimbaPort::R7,
        // B and C are packed next to dt
        nest(
            &[
                (2 * d_state * FP8) / (2 * ssw_bc),
                mu,
                m_tiles,
                d_inner / delay_su,
            ],
            &[(2 * ssw_bc / 8) * mu, BANK_BYTES as u64, mu * x_proj * FP8 / 8, 0],
        )?
        .with_spatial_stride(mu as i64 * BANK_BYTES),
        steps(seq_len * 2 * d_state, FP8, 2 * ssw_bc, d_inner / delay_su),
    )?
    .enable(
        SimbaPort::R8,
        flat(d_inner * FP8, BANK_WIDTH)?,
        steps(d_inner, FP8, BANK_WIDTH, 1),
    )?
    .enable(SimbaPort::R9, conv_to_suc.clone(), activation_steps)?
    .enable(SimbaPort::R10, conv_to_suc.clone(), activation_steps)?
    .enable(
        SimbaPort::R11,
        conv_format(isw)?,
        steps(seq_len * d_inner, FP8, isw, 1),
    )?
    .enable(
        SimbaPort::R12,
        gemm_weight(d_model, m_tiles, n_tiles, nu)?,
        steps(d_model * d_inner, FP8, nu * FP8, m_tiles),
    )?
    .enable(SimbaPort::R13, psum.clone(), psum_steps)?
    .enable(
        SimbaPort::W0,
        conv_format(osw)?,
        steps(seq_len * d_inner, FP8, osw, 1),
    )?
    .enable(SimbaPort::W2, conv_to_suc, activation_steps)?
    .enable(SimbaPort::W3, psum, psum_steps)?;

    mode.allocate_tensors(
        &[
            TensorSpec::new("oscore_in", FP8, &[seq_len, d_model]),
            TensorSpec::new("oscore_weight", FP8, &[d_model, d_inner]),
            TensorSpec::new("z", FP8, &[seq_len, d_inner]),
            TensorSpec::new("dt_BC", FP8, &[seq_len, x_proj]),
            TensorSpec::new("dt_weight_1", FP8, &[d_inner, dt_rank / dt_rank_unroll, d_conv]),
            TensorSpec::new(
                "dt_weight_2",
                FP8,
                &[d_inner, dt_rank / dt_rank_unroll, rest_unroll],
            ),
            TensorSpec::new("dt_bias", FP8, &[d_inner]),
            TensorSpec::new("x", FP8, &[seq_len, d_inner]),
            TensorSpec::new("A", FP8, &[d_inner, d_state]),
            TensorSpec::new("D", FP8, &[d_inner]),
            TensorSpec::new("y", FP8, &[seq_len, d_inner]),
            TensorSpec::new("iscore_weight", FP8, &[d_model, d_inner]),
            TensorSpec::new("iscore_out", BF16, &[seq_len, d_model]),
        ],
        p.alignment,
    )?;

    let (suc_start, iscore_start) = safe_to_start(seq_len, d_model, d_inner, mu, nu);
    mode.scalar("R10_start_cnt", CType::UInt32, suc_start as i64)
        .scalar("R11_start_cnt", CType::UInt32, iscore_start as i64)
        // first B/C value inside the dt_BC tensor
        .scalar("dt_to_BC_offset", CType::UInt32, (mu * dt_rank * FP8 / 8) as i64);

    mode.test("z", seq_len * d_inner)
        .test("y", seq_len * d_inner)
        .test("iscore_out", seq_len * d_model);
    for tensor in [
        "oscore_in",
        "oscore_weight",
        "oscore_expected",
        "dt_BC",
        "dt_weight_1",
        "dt_weight_2",
        "dt_bias",
        "suc_A",
        "suc_D",
        "suc_x",
        "suc_expected",
        "iscore_weight",
        "iscore_bias",
        "iscore_expected",
    ] {
        mode.golden(tensor, CType::UInt8);
    }
    Ok(())
}

fn osgemm(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let (seq_len, d_model, d_inner) = (p.get("dim0")?, p.get("dim1")?, p.get("dim2")?);
    let mu = p.get("seqLenUnroll")?;
    let nu = p.get("dInnerUnroll")?;
    let osw = p.get("oscore_serial_width")?;

    let (m, k, n) = (seq_len / mu, d_model, d_inner / nu);
    let d_width = mu * nu * FP8;
    ensure(
        d_width % osw == 0,
        "oscore_serial_width",
        format!("does not divide the {d_width}-bit output tile"),
    )?;

    mode.enable(
        SimbaPort::R0,
        oscore_in(k, m, n, mu)?,
        steps(seq_len * d_model, FP8, mu * FP8, n),
    )?
    .enable(
        SimbaPort::R1,
        gemm_weight(k, m, n, nu)?,
        steps(d_model * d_inner, FP8, nu * FP8, m),
    )?
    .enable(
        SimbaPort::W0,
        nest(&[(d_width / osw) * m * n], &[osw / 8])?,
        steps(seq_len * d_inner, FP8, osw, 1),
    )?;
    mode.allocate_tensors(
        &[
            TensorSpec::new("a", FP8, &[m, k, mu]),
            TensorSpec::new("b", FP8, &[k, n, nu]),
            TensorSpec::new("d", FP8, &[m, n, mu, nu]),
        ],
        p.alignment,
    )?;
    mode.test("D", seq_len * d_inner);
    for tensor in ["A", "B", "D"] {
        mode.golden(tensor, CType::UInt8);
    }
    Ok(())
}

fn isgemm(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let (seq_len, d_inner, d_model) = (p.get("dim0")?, p.get("dim1")?, p.get("dim2")?);
    let mu = p.get("seqLenUnroll")?;
    let nu = p.get("dInnerUnroll")?;
    let isw = p.get("iscore_serial_width")?;

    let a_width = mu * nu * FP8;
    ensure(
        a_width % isw == 0,
        "iscore_serial_width",
        format!("does not divide the {a_width}-bit input tile"),
    )?;
    let (m_tiles, n_tiles) = (seq_len / mu, d_inner / nu);
    let psum = iscore_psum(m_tiles * d_model, n_tiles, mu)?;

    let psum_steps = steps(seq_len * d_model, BF16, mu * BF16, n_tiles);
    mode.enable(
        SimbaPort::R11,
        nest(&[n_tiles * m_tiles * (a_width / isw)], &[isw / 8])?,
        steps(seq_len * d_inner, FP8, isw, 1),
    )?
    .enable(
        SimbaPort::R12,
        gemm_weight(d_model, m_tiles, n_tiles, nu)?,
        steps(d_inner * d_model, FP8, nu * FP8, m_tiles),
    )?
    .enable(SimbaPort::R13, psum.clone(), psum_steps)?
    .enable(SimbaPort::W3, psum, psum_steps)?;
    mode.allocate_tensors(
        &[
            TensorSpec::new("a", FP8, &[seq_len, d_inner]),
            TensorSpec::new("b", FP8, &[d_inner, d_model]),
            // C and D share their space
            TensorSpec::new("cd", BF16, &[seq_len, d_model]),
        ],
        p.alignment,
    )?;
    mode.test("D", seq_len * d_model);
    mode.golden("A", CType::UInt8)
        .golden("B", CType::UInt8)
        .golden("C", CType::UInt16)
        .golden("D", CType::UInt8);
    Ok(())
}

/// The SIMD modes stream two BF16 inputs and one output through R7, R13 and W3.
fn simd(
    p: &Params<'_>,
    mode: &mut ModeBuilder<SimbaPort>,
    length: u64,
    tensors: &[&str],
) -> Result<()> {
    let width = 2 * p.get("suc_serial_width_BC")?;
    let mu = p.get("seqLenUnroll")?;
    ensure(
        width == BF16 * mu,
        "suc_serial_width_BC",
        format!("twice the width ({width}) must equal {} bits", BF16 * mu),
    )?;
    let stream = flat(length * BF16, width)?;
    let transfers = steps(length, BF16, width, 1);
    mode.enable(SimbaPort::R7, stream.clone(), transfers)?
        .enable(SimbaPort::R13, stream.clone(), transfers)?
        .enable(SimbaPort::W3, stream, transfers)?;
    let specs: Vec<TensorSpec> = tensors
        .iter()
        .map(|name| TensorSpec::new(*name, BF16, &[length]))
        .collect();
    mode.allocate_tensors(&specs, p.alignment)?;
    Ok(())
}

fn simd_add(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let length = p.get("numElem")?;
    simd(
        p,
        mode,
        length,
        &["in_a", "in_b", "add_out", "sub_out", "mul_out", "cmul_out"],
    )?;
    mode.test("out", length);
    for tensor in ["simd_a", "simd_b", "add_out", "sub_out", "mul_out", "cmul_out"] {
        mode.golden(tensor, CType::UInt16);
    }
    Ok(())
}

fn simd_cmul(p: &Params<'_>, mode: &mut ModeBuilder<SimbaPort>) -> Result<()> {
    let length = p.get("seqLen")?;
    simd(p, mode, length, &["cmul_a", "cmul_b", "cmul_out"])?;
    mode.test("cmul_out", length);
    for tensor in ["cmul_a", "cmul_b", "cmul_out"] {
        mode.golden(tensor, CType::UInt16);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use crate::{
        config::SimbaConfig,
        emit::HeaderBuilder,
        error::DatagenError,
        golden::GoldenLoader,
        mode::ModeContext,
        sampling::{SampleSelector, SamplingPolicy},
    };

    use super::{safe_to_start, selected_modes, MODE_TABLE};

    fn config(value: serde_json::Value) -> SimbaConfig {
        SimbaConfig::from_map(value.as_object().unwrap())
    }

    fn write_golden(dir: &std::path::Path, id: u32, names: &[&str]) {
        for name in names {
            fs::write(dir.join(format!("M{id}_{name}.bin")), "# golden\n1\n2\n3\n").unwrap();
        }
    }

    #[test]
    fn markers_select_modes_in_table_order() {
        let cfg = config(json!({"M4_ISGEMM": 1, "M1_PHASE1": 1}));
        let ids: Vec<_> = selected_modes(&cfg).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn shared_mode_ids_are_rejected() {
        let cfg = config(json!({"M5_SIMD_ADD": 1, "M5_SIMD_CMUL": 1}));
        assert!(matches!(
            selected_modes(&cfg),
            Err(DatagenError::Config { .. })
        ));
    }

    #[test]
    fn safe_to_start_counts() {
        // GeMM cores are faster than the SU core
        assert_eq!(safe_to_start(64, 16, 32, 8, 8), (8, 2048));
        // SU core is faster than the GeMM cores
        assert_eq!(safe_to_start(64, 128, 32, 8, 8), (16, 512));
    }

    #[test]
    fn osgemm_programs_three_ports() {
        let dir = tempfile::tempdir().unwrap();
        write_golden(dir.path(), 3, &["A", "B", "D"]);
        let cfg = config(json!({
            "M3_OSGEMM": 1, "dim0": 16, "dim1": 8, "dim2": 16,
            "seqLenUnroll": 8, "dInnerUnroll": 8, "oscore_serial_width": 64
        }));
        let spec = &MODE_TABLE[2];
        let mut header = HeaderBuilder::new();
        let mut sampler = SampleSelector::new(SamplingPolicy::default(), 25);
        let loader = GoldenLoader::new(dir.path());
        let summary = spec
            .build(
                &cfg,
                8,
                64,
                &mut header,
                ModeContext {
                    sampler: &mut sampler,
                    loader: &loader,
                },
            )
            .unwrap();
        assert_eq!(summary.enabled_ports, 3);
        assert_eq!(summary.disabled_ports, 15);

        let text = header.finish();
        assert!(text.contains("int32_t M3_R0_tb[] = { 8, 2, 2, 1 };"));
        assert!(text.contains("int32_t M3_R0_ts[] = { 8, 64, 0, 0 };"));
        assert!(text.contains("int32_t M3_R1_ts[] = { 8, 0, 64, 0 };"));
        assert!(text.contains("int32_t M3_W0_tb[] = { 32, 1, 1, 1 };"));
        assert!(text.contains("uint32_t M3_R13_en = 0;"));
        assert!(text.contains("uint32_t M3_length_d = 256;"));
        assert!(text.contains("uint32_t M3_addr_b = 128;"));
        assert!(text.contains("uint32_t M3_addr_d = 256;"));
        assert!(text.contains("int32_t M3_test_samples_D[] = {"));
        assert!(text.contains("uint8_t M3_D[] = { 1, 2, 3 };"));
    }

    #[test]
    fn missing_parameters_are_named() {
        let cfg = config(json!({"M4_ISGEMM": 1, "dim0": 16}));
        let mut header = HeaderBuilder::new();
        let mut sampler = SampleSelector::new(SamplingPolicy::default(), 25);
        let loader = GoldenLoader::new("unused");
        let err = MODE_TABLE[3]
            .build(
                &cfg,
                8,
                64,
                &mut header,
                ModeContext {
                    sampler: &mut sampler,
                    loader: &loader,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("dim1"));
    }

    #[test]
    fn simd_width_must_match_the_unrolling() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(json!({
            "M5_SIMD_ADD": 1, "numElem": 64, "suc_serial_width_BC": 64, "seqLenUnroll": 4
        }));
        let mut header = HeaderBuilder::new();
        let mut sampler = SampleSelector::new(SamplingPolicy::default(), 25);
        let loader = GoldenLoader::new(dir.path());
        let ctx = ModeContext {
            sampler: &mut sampler,
            loader: &loader,
        };
        assert!(MODE_TABLE[4].build(&cfg, 8, 64, &mut header, ctx).is_err());
    }

    #[test]
    fn phase2_programs_every_port_but_w1() {
        let dir = tempfile::tempdir().unwrap();
        write_golden(
            dir.path(),
            2,
            &[
                "oscore_in",
                "oscore_weight",
                "oscore_expected",
                "dt_BC",
                "dt_weight_1",
                "dt_weight_2",
                "dt_bias",
                "suc_A",
                "suc_D",
                "suc_x",
                "suc_expected",
                "iscore_weight",
                "iscore_bias",
                "iscore_expected",
            ],
        );
        let cfg = config(json!({
            "M2_PHASE2": 1, "seqLen": 16, "dModel": 16, "dInner": 16, "dtRank": 8, "dConv": 4,
            "dState": 8, "xProjDim": 24, "seqLenUnroll": 8, "dInnerUnroll": 8, "dtRankUnroll": 8,
            "convUnroll": 4, "delaySU": 4, "oscore_serial_width": 64, "switchcore_width": 64,
            "iscore_serial_width": 64, "suc_serial_width_A": 64, "suc_serial_width_BC": 64
        }));
        let mut header = HeaderBuilder::new();
        let mut sampler = SampleSelector::new(SamplingPolicy::default(), 25);
        let loader = GoldenLoader::new(dir.path());
        let ctx = ModeContext {
            sampler: &mut sampler,
            loader: &loader,
        };
        let summary = MODE_TABLE[1].build(&cfg, 8, 64, &mut header, ctx).unwrap();
        assert_eq!(summary.enabled_ports, 17);
        assert_eq!(summary.disabled_ports, 1);

        let text = header.finish();
        assert!(text.contains("uint32_t M2_W1_en = 0;"));
        assert!(text.contains("int32_t M2_R2_tb[] = { 1, 8, 2, 4 };"));
        assert!(text.contains("int32_t M2_R9_tb[] = { 4, 2, 2, 2 };"));
        assert!(text.contains("int32_t M2_R9_ts[] = { 8, 64, 32, 128 };"));
    }

    #[test]
    fn partial_tiles_are_a_shape_mismatch() {
        // 20 rows do not fill whole 8-row tiles, so the A port would skip data
        let cfg = config(json!({
            "M3_OSGEMM": 1, "dim0": 20, "dim1": 8, "dim2": 16,
            "seqLenUnroll": 8, "dInnerUnroll": 8, "oscore_serial_width": 64
        }));
        let mut header = HeaderBuilder::new();
        let mut sampler = SampleSelector::new(SamplingPolicy::default(), 25);
        let loader = GoldenLoader::new("unused");
        let ctx = ModeContext {
            sampler: &mut sampler,
            loader: &loader,
        };
        match MODE_TABLE[2].build(&cfg, 8, 64, &mut header, ctx) {
            Err(DatagenError::ShapeMismatch { what, expected, actual }) => {
                assert_eq!(what, "M3_R0");
                assert_eq!((expected, actual), (40, 32));
            }
            other => panic!("expected a shape mismatch, got {other:?}"),
        }
    }
}
