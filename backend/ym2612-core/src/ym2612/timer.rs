//! YM2612 timers

use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimerTickEffect {
    None,
    Overflowed,
}

pub(super) struct TimerControl {
    pub(super) loaded: bool,
    pub(super) overflow_flag_enabled: bool,
    pub(super) clear_overflow_flag: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct TimerA {
    loaded: bool,
    overflow_flag_enabled: bool,
    overflow_flag: bool,
    period: u16,
    counter: u16,
}

impl TimerA {
    // Timer A counter is 10-bit in actual hardware
    const OVERFLOW: u16 = 1024;

    /// Advance by one native sample. Does nothing while the timer is not loaded.
    pub(super) fn tick(&mut self) -> TimerTickEffect {
        if !self.loaded {
            return TimerTickEffect::None;
        }

        self.counter += 1;
        if self.counter >= Self::OVERFLOW - self.period {
            self.counter = 0;
            self.overflow_flag |= self.overflow_flag_enabled;
            TimerTickEffect::Overflowed
        } else {
            TimerTickEffect::None
        }
    }

    pub(super) fn loaded(&self) -> bool {
        self.loaded
    }

    pub(super) fn overflow_flag(&self) -> bool {
        self.overflow_flag
    }

    pub(super) fn period(&self) -> u16 {
        self.period
    }

    pub(super) fn write_control(
        &mut self,
        TimerControl { loaded, overflow_flag_enabled, clear_overflow_flag }: TimerControl,
    ) {
        self.loaded = loaded;
        self.overflow_flag_enabled = overflow_flag_enabled;
        self.overflow_flag &= !clear_overflow_flag;
    }

    pub(super) fn write_period_high(&mut self, value: u8) {
        self.period = (self.period & 3) | (u16::from(value) << 2);
    }

    pub(super) fn write_period_low(&mut self, value: u8) {
        self.period = (self.period & !3) | u16::from(value & 3);
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct TimerB {
    loaded: bool,
    overflow_flag_enabled: bool,
    overflow_flag: bool,
    pub(super) period: u8,
    counter: u16,
    divider: u8,
}

impl TimerB {
    // Timer B counter is 8-bit and increments once per 16 samples
    const OVERFLOW: u16 = 256;
    const DIVIDER: u8 = 16;

    /// Advance by one native sample. The ÷16 divider runs even while the timer is not loaded.
    pub(super) fn tick(&mut self) -> TimerTickEffect {
        self.divider += 1;
        if self.divider < Self::DIVIDER {
            return TimerTickEffect::None;
        }
        self.divider = 0;

        if !self.loaded {
            return TimerTickEffect::None;
        }

        self.counter += 1;
        if self.counter >= Self::OVERFLOW - u16::from(self.period) {
            self.counter = 0;
            self.overflow_flag |= self.overflow_flag_enabled;
            TimerTickEffect::Overflowed
        } else {
            TimerTickEffect::None
        }
    }

    pub(super) fn overflow_flag(&self) -> bool {
        self.overflow_flag
    }

    pub(super) fn write_control(
        &mut self,
        TimerControl { loaded, overflow_flag_enabled, clear_overflow_flag }: TimerControl,
    ) {
        self.loaded = loaded;
        self.overflow_flag_enabled = overflow_flag_enabled;
        self.overflow_flag &= !clear_overflow_flag;
    }
}
