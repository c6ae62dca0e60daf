//! Cycle-driven YM2612 (OPN2) FM synthesis core
//!
//! The chip is clocked in 68000 cycles through [`Ym2612::advance`] and produces interleaved
//! stereo `i16` samples at a configurable output frequency.

mod state;
pub mod ym2612;

pub use opn2_common::TimingMode;
pub use opn2_config::{Opn2BusyBehavior, Ym2612Config};
pub use state::{SAVE_STATE_VERSION, SaveStateError};
pub use ym2612::{M68K_CYCLES_PER_SAMPLE, Ym2612};
