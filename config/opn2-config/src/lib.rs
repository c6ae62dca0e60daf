use bincode::{Decode, Encode};
use opn2_common::TimingMode;
use std::fmt::{Display, Formatter};

pub const DEFAULT_OUTPUT_FREQUENCY: u32 = 48_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Opn2BusyBehavior {
    /// Discrete YM2612: ports 1-3 return the last status read from port 0 until it decays
    #[default]
    Ym2612,
    /// Integrated YM3438: every port returns live status
    Ym3438,
    /// Busy flag is never set
    AlwaysZero,
}

impl Display for Opn2BusyBehavior {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ym2612 => write!(f, "YM2612"),
            Self::Ym3438 => write!(f, "YM3438"),
            Self::AlwaysZero => write!(f, "AlwaysZero"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Ym2612Config {
    pub timing_mode: TimingMode,
    /// 68000 clock in Hz; overrides the clock implied by `timing_mode` if set
    pub clock_hz_override: Option<u32>,
    pub output_frequency: u32,
    pub quantize_output: bool,
    pub emulate_ladder_effect: bool,
    pub busy_behavior: Opn2BusyBehavior,
}

impl Ym2612Config {
    #[inline]
    #[must_use]
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz_override.unwrap_or_else(|| self.timing_mode.m68k_clock_hz())
    }
}

impl Default for Ym2612Config {
    fn default() -> Self {
        Self {
            timing_mode: TimingMode::default(),
            clock_hz_override: None,
            output_frequency: DEFAULT_OUTPUT_FREQUENCY,
            quantize_output: true,
            emulate_ladder_effect: true,
            busy_behavior: Opn2BusyBehavior::default(),
        }
    }
}
