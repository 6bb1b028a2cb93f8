use ndarray::Dimension;

use crate::{
    config::{ConvConfig, GeneratorOptions},
    emit::HeaderBuilder,
    error::Result,
    golden::{conv2d, BiasMode, ConvShape},
    memory::{AddressLayout, AllocationPolicy, Allocator},
    mode::{ModeBuilder, ModeContext, NamingScheme},
    quantize::ChannelQuantization,
    streamer::{ChannelEnableMask, ChannelGranularity, GemmxPort, LoopNest},
    types::CType,
};

use super::{resources, serial_loop, Generate};

const ACC_BITS: u64 = 32;
const QUANT_BITS: u64 = 8;
const BIAS_RANGE: std::ops::Range<i32> = -(1 << 30)..(1 << 30) - 1;

/// 2D convolution through the implicit im2col path of GeMMX, followed by per-channel requantization.
pub struct ConvWorkload {
    config: ConvConfig,
    shape: ConvShape,
    bias: BiasMode,
    interleaved: bool,
}

pub(crate) struct ConvNests {
    pub a: LoopNest,
    pub b: LoopNest,
    pub c: LoopNest,
    pub d32: LoopNest,
    pub d8: LoopNest,
}

/// Output streamers write NHWC tiles: one `meshRow × meshCol` block per step.
fn output_nest(shape: &ConvShape, element_bits: u64, serial_width: u64, bank_width: u64) -> Result<LoopNest> {
    let [oh, ow, mr, mc] = [
        shape.out_height()?,
        shape.out_width()?,
        shape.mesh_row,
        shape.mesh_col,
    ]
    .map(|v| v as u64);
    let bytes = (element_bits / 8) as i64;
    let (oh_i, ow_i, mr_i, mc_i) = (oh as i64, ow as i64, mr as i64, mc as i64);
    Ok(LoopNest::new([
        serial_loop(element_bits * mr * mc, serial_width, bank_width),
        (shape.cout_tiles() as u64, oh_i * ow_i * mc_i * bytes),
        (ow / mr, mr_i * mc_i * bytes),
        (oh, ow_i * mc_i * bytes),
    ]))
}

pub(crate) fn conv_nests(shape: &ConvShape, c32_width: u64, d8_width: u64, bank_width: u64) -> Result<ConvNests> {
    let ts = shape.tile_size as i64;
    let (wp, hp) = (shape.padded_w() as i64, shape.padded_h() as i64);
    let (sw, sh) = (shape.stride_w as i64, shape.stride_h as i64);
    let (mr, mc) = (shape.mesh_row as i64, shape.mesh_col as i64);
    let (kh, kw, cin_tiles) = (shape.kh as u64, shape.kw as u64, shape.cin_tiles() as u64);
    let cout_tiles = shape.cout_tiles() as u64;
    let (oh, ow) = (shape.out_height()? as u64, shape.out_width()? as u64);
    let reduction = kw * kh * cin_tiles;

    // the mesh rows read `mr` output pixels apart by the horizontal stride
    let a = LoopNest::new([
        (kw, ts),
        (kh, ts * wp),
        (cin_tiles, ts * wp * hp),
        (cout_tiles, 0),
        (ow / mr as u64, mr * ts * sw),
        (oh, ts * wp * sh),
    ])
    .with_spatial_stride(ts * sw);
    let b = LoopNest::new([
        (reduction, ts * mc),
        (cout_tiles, ts * mc * reduction as i64),
        (ow * oh / mr as u64, 0),
    ]);
    Ok(ConvNests {
        a,
        b,
        c: output_nest(shape, ACC_BITS, c32_width, bank_width)?,
        d32: output_nest(shape, ACC_BITS, c32_width, bank_width)?,
        d8: output_nest(shape, QUANT_BITS, d8_width, bank_width)?,
    })
}

impl ConvWorkload {
    pub fn new(config: ConvConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shape: config.shape()?,
            bias: config.bias_mode()?,
            interleaved: config.interleaved()?,
            config,
        })
    }

    fn layout(&self, alignment: u64, padded: u64, kernel: u64, acc_bytes: u64) -> Result<AddressLayout> {
        let capacity = self.config.memory_size * 1024;
        let policy = if self.interleaved {
            AllocationPolicy::Interleaved {
                capacity: Some(capacity),
            }
        } else {
            AllocationPolicy::Separate {
                region_size: capacity / 4,
                capacity,
            }
        };
        // D8 is written over the D32 region
        Allocator::new(policy)
            .with_alignment(alignment)
            .region("a", padded)
            .region("b", kernel)
            .region("c", acc_bytes)
            .region("d32", acc_bytes)
            .alias("d8", "d32")
            .allocate()
    }

    fn c_mask(&self, bank_width: u64) -> ChannelEnableMask {
        let (mr, mc) = (self.shape.mesh_row as u64, self.shape.mesh_col as u64);
        let words = ChannelEnableMask::word_count(mr * mc * ACC_BITS, bank_width);
        match self.bias {
            BiasMode::Broadcast => ChannelEnableMask::from_bits(
                words,
                ChannelEnableMask::enabled_bits(
                    (mc * ACC_BITS).div_ceil(bank_width),
                    ChannelGranularity::Wide,
                ),
            ),
            BiasMode::Full => ChannelEnableMask::full(words),
            BiasMode::Disabled => ChannelEnableMask::disabled(words),
        }
    }
}

impl Generate for ConvWorkload {
    fn name(&self) -> &'static str {
        "conv"
    }

    fn generate(&self, options: &GeneratorOptions, header: &mut HeaderBuilder) -> Result<usize> {
        let cfg = &self.config;
        let shape = &self.shape;
        let acc = cfg.accelerator()?;
        let (m, k, n) = shape.gemm_dims()?;
        let length_c = m * n * shape.mesh_row * shape.mesh_col;

        let nests = conv_nests(
            shape,
            acc.snax_gemmx_serial_c32_d32_width,
            acc.snax_gemmx_serial_d8_width,
            options.bank_width,
        )?;
        let blocks = (m * k * n) as u64;
        // every output block moves through the serial interface in whole beats
        let output_blocks = (m * n) as u64;
        let tile = (shape.mesh_row * shape.mesh_col) as u64;
        let acc_beats = (tile * ACC_BITS).div_ceil(acc.snax_gemmx_serial_c32_d32_width);
        let quant_beats = (tile * QUANT_BITS).div_ceil(acc.snax_gemmx_serial_d8_width);

        let padded_len = shape.padded_dims().size();
        let kernel_len = shape.kernel_dims().size();
        let layout = self.layout(
            options.alignment,
            padded_len as u64,
            kernel_len as u64,
            (length_c as u64) * ACC_BITS / 8,
        )?;

        let mut mode = ModeBuilder::new(self.name(), NamingScheme::Flat, options.bank_bytes());
        mode.enable(GemmxPort::A, nests.a, blocks)?
            .enable(GemmxPort::B, nests.b, blocks)?
            .enable_masked(
                GemmxPort::C,
                nests.c,
                output_blocks * acc_beats,
                self.c_mask(options.bank_width),
            )?
            .enable(GemmxPort::D32, nests.d32, output_blocks * acc_beats)?
            .enable(GemmxPort::D8, nests.d8, output_blocks * quant_beats)?;

        mode.scalar("broadcast_C", CType::Int32, self.bias.broadcast_flag() as i64);
        for (key, value) in [
            ("Nbatch", shape.nbatch),
            ("H", shape.h),
            ("W", shape.w),
            ("Cin", shape.cin),
            ("Cout", shape.cout),
            ("Kh", shape.kh),
            ("Kw", shape.kw),
            ("stride_h", shape.stride_h),
            ("stride_w", shape.stride_w),
            ("pad_h", shape.pad_h),
            ("pad_w", shape.pad_w),
            ("Batch", shape.nbatch),
            ("M", m),
            ("K", k),
            ("N", n),
        ] {
            mode.scalar(key, CType::Int, value as i64);
        }
        for port in ["A", "B", "C", "D32", "D8"] {
            mode.scalar(
                format!("set_addr_remap_index_{port}"),
                CType::Int32,
                layout.remap_index() as i64,
            );
        }
        mode.scalar("interleaved_address", CType::Int32, cfg.interleaved_address as i64);
        let regions = ["a", "b", "c", "d8", "d32"];
        for region in regions {
            mode.scalar(
                format!("delta_physical_{region}"),
                CType::Int32,
                layout.physical_offset(region)? as i64,
            );
        }
        for region in regions {
            mode.scalar(
                format!("delta_local_{region}"),
                CType::Int32,
                layout.offset(region)? as i64,
            );
        }
        mode.scalar("subtraction_a", CType::Int8, 0)
            .scalar("subtraction_b", CType::Int8, 0)
            .scalar("transposed_A", CType::Int32, 0)
            .scalar("transposed_B", CType::Int32, 0)
            .scalar("bypassSIMD", CType::Int32, cfg.bypass_simd as i64);

        let mut rng = fastrand::Rng::with_seed(options.seed);
        let input: Vec<i8> = (0..shape.input_dims().size())
            .map(|_| rng.i8(-10..10))
            .collect();
        let kernel: Vec<i8> = (0..kernel_len).map(|_| rng.i8(-10..10)).collect();
        let bias = self.bias.generate(
            &mut rng,
            length_c / (shape.mesh_row * shape.mesh_col),
            shape.mesh_row,
            shape.mesh_col,
            BIAS_RANGE,
        );
        let d32: Vec<i32> = conv2d(shape, &input, &kernel)?
            .iter()
            .zip(&bias)
            .map(|(acc, c)| acc.wrapping_add(*c))
            .collect();

        let quant = ChannelQuantization {
            input_zp: rng.i32(-128..127),
            output_zp: rng.i32(-128..127),
            max_int: i8::MAX as i32,
            min_int: i8::MIN as i32,
            double_round: false,
            shifts: (0..shape.mesh_col).map(|_| rng.u8(0..63)).collect(),
            multipliers: (0..shape.mesh_col)
                .map(|_| rng.i32(i32::MIN..i32::MAX))
                .collect(),
        };
        let d8 = quant.requantize(&d32, options.zero_shift)?;
        mode.scalar("input_zp_i", CType::Int8, quant.input_zp as i64)
            .scalar("output_zp_i", CType::Int8, quant.output_zp as i64)
            .scalar("max_int_i", CType::Int8, quant.max_int as i64)
            .scalar("min_int_i", CType::Int8, quant.min_int as i64)
            .scalar("double_round_i", CType::Int8, quant.double_round as i64);

        let (mut sampler, loader) = resources(options);
        mode.build(
            header,
            ModeContext {
                sampler: &mut sampler,
                loader: &loader,
            },
        )?;

        header
            .param_array(CType::Int32, "shared_bitpacked_shift", quant.bitpacked_shifts())?
            .param_array(CType::Int32, "shared_multiplier", quant.multipliers.iter().copied())?
            .data_array(CType::Int8, "A", shape.pad_input(&input)?.iter().copied())?
            .tensor("B", &kernel)?
            .tensor("C", &bias)?
            .tensor("D32", &d32)?
            .data_array(CType::Int8, "D8", d8)?;
        Ok(1)
    }
}
