//! Streamer descriptors: the nested-loop programs that the data-movement engines walk.
//!
//! A workload describes each tensor access as a [LoopNest] (innermost loop first, using its own layout knowledge).
//! [synthesize] validates the nest against the bank width, pads it to the port's loop depth and yields a
//! [StreamerDescriptor], the unit that ends up in the streamer CSRs.

mod channel_enable;
mod descriptor;
mod port;

pub use channel_enable::{ChannelEnableMask, ChannelGranularity};
pub use descriptor::{synthesize, AddressWalk, Loop, LoopNest, StreamerDescriptor};
pub use port::{GemmxPort, Port, SimbaPort};

/// Native transfer width of one memory bank, in bits.
pub const DEFAULT_BANK_WIDTH: u64 = 64;
