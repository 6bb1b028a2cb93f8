use crate::{
    config::{GeneratorOptions, MatmulConfig},
    emit::HeaderBuilder,
    error::Result,
    golden::{block_gemm, BiasMode, GemmOptions, GemmShape, Stationarity},
    memory::Allocator,
    mode::{ModeBuilder, ModeContext, NamingScheme},
    streamer::{ChannelEnableMask, ChannelGranularity, GemmxPort, LoopNest},
    types::CType,
};

use super::{resources, serial_loop, Generate};

const INPUT_BITS: u64 = 8;
const OUTPUT_BITS: u64 = 32;

/// Tiled int8 matrix multiply with int32 bias on OpenGeMM.
pub struct MatmulWorkload {
    config: MatmulConfig,
    shape: GemmShape,
    stationarity: Stationarity,
    bias: BiasMode,
}

/// Loop nests of the four streamers, innermost loop first.
pub(crate) struct MatmulNests {
    pub a: LoopNest,
    pub b: LoopNest,
    pub c: LoopNest,
    pub d32: LoopNest,
}

pub(crate) fn matmul_nests(
    shape: &GemmShape,
    stationarity: Stationarity,
    serial_width: u64,
    bank_width: u64,
) -> MatmulNests {
    let [m, k, n, mr, ts, mc] = [
        shape.m,
        shape.k,
        shape.n,
        shape.mesh_row,
        shape.tile_size,
        shape.mesh_col,
    ]
    .map(|v| v as u64);
    let a_tile = (ts * mr * INPUT_BITS / 8) as i64;
    let b_tile = (ts * mc * INPUT_BITS / 8) as i64;
    let d_tile = (mr * mc * OUTPUT_BITS / 8) as i64;
    let (k_i, n_i) = (k as i64, n as i64);
    let serial = serial_loop(mr * mc * OUTPUT_BITS, serial_width, bank_width);

    let (a, b, output) = match stationarity {
        Stationarity::Output => (
            LoopNest::new([(k, a_tile), (n, 0), (m, k_i * a_tile)]),
            LoopNest::new([(k, b_tile), (n, k_i * b_tile), (m, 0)]),
            vec![serial, (n, d_tile), (m, n_i * d_tile), (1, 0)],
        ),
        Stationarity::Weight => (
            LoopNest::new([(m, k_i * a_tile), (k, a_tile), (n, 0)]),
            LoopNest::new([(m, 0), (k, b_tile), (n, k_i * b_tile)]),
            vec![serial, (m, n_i * d_tile), (k, 0), (n, d_tile)],
        ),
    };
    MatmulNests {
        a,
        b,
        c: LoopNest::new(output.clone()),
        d32: LoopNest::new(output),
    }
}

impl MatmulWorkload {
    pub fn new(config: MatmulConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shape: config.shape()?,
            stationarity: config.stationarity()?,
            bias: config.bias_mode()?,
            config,
        })
    }

    fn masks(&self, bank_width: u64) -> Result<[ChannelEnableMask; 4]> {
        let acc = self.config.accelerator()?;
        let (mr, ts, mc) = (
            self.shape.mesh_row as u64,
            self.shape.tile_size as u64,
            self.shape.mesh_col as u64,
        );
        let serial = acc.snax_opengemm_serial_c_d_width;
        // requested channels count whole banks
        let banks = |bits: u64| bits.div_ceil(bank_width);
        let wide = ChannelGranularity::Wide;

        let a = ChannelEnableMask::with_enabled(
            acc.snax_opengemm_array_input_a_width,
            bank_width,
            banks(mr * ts * INPUT_BITS),
            wide,
        );
        let b = ChannelEnableMask::with_enabled(
            acc.snax_opengemm_array_input_b_width,
            bank_width,
            banks(mc * ts * INPUT_BITS),
            wide,
        );
        let c_banks = match self.bias {
            BiasMode::Broadcast => banks(mc * OUTPUT_BITS),
            BiasMode::Full => banks(mr * mc * OUTPUT_BITS),
            BiasMode::Disabled => 0,
        };
        let c = ChannelEnableMask::with_enabled(serial, bank_width, c_banks, wide);
        let d = ChannelEnableMask::with_enabled(serial, bank_width, banks(mr * mc * OUTPUT_BITS), wide);
        Ok([a, b, c, d])
    }
}

impl Generate for MatmulWorkload {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn generate(&self, options: &GeneratorOptions, header: &mut HeaderBuilder) -> Result<usize> {
        let cfg = &self.config;
        let shape = &self.shape;
        let acc = cfg.accelerator()?;
        let bank_width = options.bank_width;

        let nests = matmul_nests(
            shape,
            self.stationarity,
            acc.snax_opengemm_serial_c_d_width,
            bank_width,
        );
        let blocks = (shape.m * shape.k * shape.n) as u64;
        let beats = ((shape.mesh_row * shape.mesh_col) as u64 * OUTPUT_BITS)
            .div_ceil(acc.snax_opengemm_serial_c_d_width);
        // weight-stationary revisits every output block once per reduction step
        let output_transfers = match self.stationarity {
            Stationarity::Output => (shape.m * shape.n) as u64 * beats,
            Stationarity::Weight => blocks * beats,
        };
        let [mask_a, mask_b, mask_c, mask_d] = self.masks(bank_width)?;

        let a_bytes = shape.a_len() as u64 * INPUT_BITS / 8;
        let b_bytes = shape.b_len() as u64 * INPUT_BITS / 8;
        let cd_bytes = shape.c_len() as u64 * OUTPUT_BITS / 8;
        let allocator = Allocator::interleaved()
            .with_alignment(options.alignment)
            .region("a", a_bytes)
            .region("b", b_bytes)
            .region("c", cd_bytes);
        // weight-stationary accumulates in place over the bias
        let layout = match self.stationarity {
            Stationarity::Output => allocator.region("d", cd_bytes),
            Stationarity::Weight => allocator.alias("d", "c"),
        }
        .allocate()?;

        let mut mode = ModeBuilder::new(self.name(), NamingScheme::Flat, options.bank_bytes());
        mode.enable_masked(GemmxPort::A, nests.a, blocks, mask_a)?
            .enable_masked(GemmxPort::B, nests.b, blocks, mask_b)?
            .enable_masked(GemmxPort::C, nests.c, output_transfers, mask_c)?
            .enable_masked(GemmxPort::D32, nests.d32, output_transfers, mask_d)?
            .disable(GemmxPort::D8)?;

        for (key, value) in [
            ("M", cfg.m),
            ("K", cfg.k),
            ("N", cfg.n),
            ("array_shape", cfg.array_shape as u64),
            ("data_type", cfg.data_type as u64),
            ("meshRow", shape.mesh_row as u64),
            ("tileSize", shape.tile_size as u64),
            ("meshCol", shape.mesh_col as u64),
        ] {
            mode.scalar(key, CType::UInt32, value as i64);
        }
        mode.scalar("a_data_length", CType::Int32, a_bytes as i64)
            .scalar("b_data_length", CType::Int32, b_bytes as i64)
            .scalar("broadcast_C", CType::Int32, self.bias.broadcast_flag() as i64)
            .scalar("c_data_length", CType::Int32, cd_bytes as i64)
            .scalar("d_data_length", CType::Int32, cd_bytes as i64);
        for region in ["a", "b", "c", "d"] {
            mode.scalar(
                format!("delta_local_{region}"),
                CType::Int32,
                layout.offset(region)? as i64,
            );
        }

        let gemm_options = GemmOptions {
            subtraction_a: 0,
            subtraction_b: 0,
            transposed_a: cfg.transposed_a == 1,
            transposed_b: cfg.transposed_b == 1,
            stationarity: self.stationarity,
        };
        mode.scalar("subtraction_a", CType::Int8, gemm_options.subtraction_a as i64)
            .scalar("subtraction_b", CType::Int8, gemm_options.subtraction_b as i64)
            .scalar("transposed_A", CType::Int32, cfg.transposed_a as i64)
            .scalar("transposed_B", CType::Int32, cfg.transposed_b as i64);
        for port in ["A", "B", "C", "D32"] {
            mode.scalar(
                format!("set_addr_remap_index_{port}"),
                CType::Int32,
                layout.remap_index() as i64,
            );
        }

        let (mut sampler, loader) = resources(options);
        mode.build(
            header,
            ModeContext {
                sampler: &mut sampler,
                loader: &loader,
            },
        )?;

        let mut rng = fastrand::Rng::with_seed(options.seed);
        let a: Vec<i8> = (0..shape.a_len()).map(|_| rng.i8(-128..127)).collect();
        let b: Vec<i8> = (0..shape.b_len()).map(|_| rng.i8(-128..127)).collect();
        let c = self.bias.generate(
            &mut rng,
            shape.m * shape.n,
            shape.mesh_row,
            shape.mesh_col,
            -128..127,
        );
        let d = block_gemm(shape, &a, &b, &c, &gemm_options)?;

        header
            .tensor("A", &a)?
            .tensor("B", &b)?
            .tensor("C", &c)?
            .data_array(CType::Int32, "D", d.iter().copied())?;
        Ok(1)
    }
}
