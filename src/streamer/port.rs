use std::{fmt::Debug, fmt::Display, hash::Hash, str::FromStr};

use crate::error::DatagenError;

/// A hardware streamer port of some accelerator.
/// Every accelerator has a closed set of ports; a mode must decide for each of them whether it is used.
pub trait Port: Copy + Eq + Hash + Debug + Display + 'static {
    /// All ports, in CSR order.
    const ALL: &'static [Self];

    fn name(&self) -> &'static str;

    /// Number of temporal loops the port's address generator supports.
    fn loop_depth(&self) -> usize;
}

macro_rules! port_enum {
    ($(#[$meta: meta])* $name: ident { $($variant: ident => $depth: expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),*
        }

        impl Port for $name {
            const ALL: &'static [Self] = &[$($name::$variant),*];

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),*
                }
            }

            fn loop_depth(&self) -> usize {
                match self {
                    $($name::$variant => $depth),*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = DatagenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .find(|port| port.name() == s)
                    .copied()
                    .ok_or_else(|| {
                        DatagenError::config(
                            s,
                            format!("not a port of {}", stringify!($name)),
                        )
                    })
            }
        }
    };
}

const SIMBA_LOOPS: usize = 4;

port_enum!(
    /// The 14 readers and 4 writers around the SimbaCore datapath.
    SimbaPort {
        R0 => SIMBA_LOOPS,
        R1 => SIMBA_LOOPS,
        R2 => SIMBA_LOOPS,
        R3 => SIMBA_LOOPS,
        R4 => SIMBA_LOOPS,
        R5 => SIMBA_LOOPS,
        R6 => SIMBA_LOOPS,
        R7 => SIMBA_LOOPS,
        R8 => SIMBA_LOOPS,
        R9 => SIMBA_LOOPS,
        R10 => SIMBA_LOOPS,
        R11 => SIMBA_LOOPS,
        R12 => SIMBA_LOOPS,
        R13 => SIMBA_LOOPS,
        W0 => SIMBA_LOOPS,
        W1 => SIMBA_LOOPS,
        W2 => SIMBA_LOOPS,
        W3 => SIMBA_LOOPS,
    }
);

port_enum!(
    /// Streamers of the GeMM array: operands A and B, bias C, and the 32-bit and requantized 8-bit outputs.
    GemmxPort {
        A => 6,
        B => 3,
        C => 4,
        D32 => 4,
        D8 => 4,
    }
);

#[cfg(test)]
mod tests {
    use super::{GemmxPort, Port, SimbaPort};

    #[test]
    fn simbacore_has_fourteen_readers_and_four_writers() {
        let readers = SimbaPort::ALL
            .iter()
            .filter(|p| p.name().starts_with('R'))
            .count();
        assert_eq!(readers, 14);
        assert_eq!(SimbaPort::ALL.len(), 18);
        assert!(SimbaPort::ALL.iter().all(|p| p.loop_depth() == 4));
    }

    #[test]
    fn ports_parse_from_names() {
        assert_eq!("R13".parse::<SimbaPort>().unwrap(), SimbaPort::R13);
        assert_eq!("D32".parse::<GemmxPort>().unwrap(), GemmxPort::D32);
        assert!("R14".parse::<SimbaPort>().is_err());
    }

    #[test]
    fn gemmx_depths() {
        let depths: Vec<_> = GemmxPort::ALL.iter().map(|p| p.loop_depth()).collect();
        assert_eq!(depths, vec![6, 3, 4, 4, 4]);
    }
}
