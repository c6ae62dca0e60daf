use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};

/// 68000 master clock on NTSC consoles, in Hz
pub const NTSC_M68K_CLOCK_HZ: u32 = 7_670_454;

/// 68000 master clock on PAL consoles, in Hz
pub const PAL_M68K_CLOCK_HZ: u32 = 7_600_489;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum TimingMode {
    #[default]
    Ntsc,
    Pal,
}

impl TimingMode {
    #[inline]
    #[must_use]
    pub fn m68k_clock_hz(self) -> u32 {
        match self {
            Self::Ntsc => NTSC_M68K_CLOCK_HZ,
            Self::Pal => PAL_M68K_CLOCK_HZ,
        }
    }

    #[inline]
    #[must_use]
    pub fn frames_per_second(self) -> u32 {
        match self {
            Self::Ntsc => 60,
            Self::Pal => 50,
        }
    }

    /// 68000 cycles in one video frame, rounded down
    #[inline]
    #[must_use]
    pub fn m68k_cycles_per_frame(self) -> u32 {
        self.m68k_clock_hz() / self.frames_per_second()
    }
}

impl Display for TimingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ntsc => write!(f, "NTSC"),
            Self::Pal => write!(f, "PAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_per_frame() {
        assert_eq!(127_840, TimingMode::Ntsc.m68k_cycles_per_frame());
        assert_eq!(152_009, TimingMode::Pal.m68k_cycles_per_frame());
    }
}
