//! YM2612 envelope generator

use crate::ym2612::phase::PhaseGenerator;
use bincode::{Decode, Encode};
use opn2_common::num::GetBit;
use std::cmp;

// Envelope updates every third native sample
const ENVELOPE_DIVIDER: u8 = 3;

const SSG_ATTENUATION_THRESHOLD: u16 = 0x200;

// Attenuation is 10 bits
pub(super) const ATTENUATION_MASK: u16 = 0x03FF;
pub(super) const MAX_ATTENUATION: u16 = ATTENUATION_MASK;

// Rates 4-47, indexed by the lowest 2 bits of the rate
#[rustfmt::skip]
const LOW_RATE_INCREMENTS: &[[u8; 8]; 4] = &[
    [0,1,0,1,0,1,0,1],
    [0,1,0,1,1,1,0,1],
    [0,1,1,1,0,1,1,1],
    [0,1,1,1,1,1,1,1],
];

// Rates 48-63, one row per rate
#[rustfmt::skip]
const HIGH_RATE_INCREMENTS: &[[u8; 8]; 16] = &[
    [1,1,1,1,1,1,1,1], [1,1,1,2,1,1,1,2], [1,2,1,2,1,2,1,2], [1,2,2,2,1,2,2,2],  // 48-51
    [2,2,2,2,2,2,2,2], [2,2,2,4,2,2,2,4], [2,4,2,4,2,4,2,4], [2,4,4,4,2,4,4,4],  // 52-55
    [4,4,4,4,4,4,4,4], [4,4,4,8,4,4,4,8], [4,8,4,8,4,8,4,8], [4,8,8,8,4,8,8,8],  // 56-59
    [8,8,8,8,8,8,8,8], [8,8,8,8,8,8,8,8], [8,8,8,8,8,8,8,8], [8,8,8,8,8,8,8,8],  // 60-63
];

/// The 12-bit envelope cycle counter shared by every operator.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct EnvelopeClock {
    divider: u8,
    cycle_count: u16,
}

impl EnvelopeClock {
    /// Advance by one native sample, returning the new cycle count on every third sample.
    #[inline]
    pub(super) fn tick(&mut self) -> Option<u16> {
        self.divider += 1;
        if self.divider < ENVELOPE_DIVIDER {
            return None;
        }
        self.divider = 0;

        // Actual hardware's envelope cycle counter is 12-bit and skips 0 on overflow
        self.cycle_count += 1;
        self.cycle_count = (self.cycle_count & 0xFFF) + (self.cycle_count >> 12);

        Some(self.cycle_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(super) enum EnvelopePhase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Combine a 5-bit rate with the key code according to the operator's rate scaling setting.
#[inline]
pub(super) fn effective_rate(rate: u8, key_code: u8, key_scale: u8) -> u8 {
    if rate == 0 {
        return 0;
    }

    cmp::min(63, 2 * rate + (key_code >> (3 - key_scale)))
}

fn attenuation_increment(rate: u8, cycle_count: u16) -> u16 {
    if rate >= 48 {
        return HIGH_RATE_INCREMENTS[(rate - 48) as usize][(cycle_count & 7) as usize].into();
    }

    if rate < 4 {
        return 0;
    }

    let update_frequency_shift = 11 - (rate >> 2);
    if cycle_count & ((1 << update_frequency_shift) - 1) != 0 {
        return 0;
    }

    let increment_idx = (cycle_count >> update_frequency_shift) & 7;
    LOW_RATE_INCREMENTS[(rate & 3) as usize][increment_idx as usize].into()
}

#[derive(Debug, Clone, Encode, Decode)]
pub(super) struct EnvelopeGenerator {
    // Register values
    pub(super) attack_rate: u8,
    pub(super) decay_rate: u8,
    pub(super) sustain_rate: u8,
    pub(super) release_rate: u8,
    pub(super) total_level: u8,
    pub(super) sustain_level: u8,
    pub(super) key_scale: u8,
    // Internal state
    phase: EnvelopePhase,
    attenuation: u16,
    ssg_enabled: bool,
    ssg_attack: bool,
    ssg_alternate: bool,
    ssg_hold: bool,
    ssg_inverted: bool,
}

impl EnvelopeGenerator {
    pub(super) fn new() -> Self {
        Self {
            attack_rate: 0,
            decay_rate: 0,
            sustain_rate: 0,
            release_rate: 0,
            total_level: 0,
            sustain_level: 0,
            key_scale: 0,
            phase: EnvelopePhase::Release,
            attenuation: MAX_ATTENUATION,
            ssg_enabled: false,
            ssg_attack: false,
            ssg_alternate: false,
            ssg_hold: false,
            ssg_inverted: false,
        }
    }

    #[cfg(test)]
    pub(super) fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    #[cfg(test)]
    pub(super) fn attenuation(&self) -> u16 {
        self.attenuation
    }

    fn sustain_level_attenuation(&self) -> u16 {
        // Sustain level applies in increments of 32, with max level special cased to be
        // the max multiple of 32
        match self.sustain_level {
            15 => (MAX_ATTENUATION >> 5) << 5,
            sl => u16::from(sl) << 5,
        }
    }

    #[inline]
    pub(super) fn clock(&mut self, cycle_count: u16, key_code: u8) {
        // Progress past decay phase if attenuation is at or past sustain level
        if self.phase == EnvelopePhase::Decay
            && self.attenuation >= self.sustain_level_attenuation()
        {
            self.phase = EnvelopePhase::Sustain;
        }

        let r = match self.phase {
            EnvelopePhase::Attack => self.attack_rate,
            EnvelopePhase::Decay => self.decay_rate,
            EnvelopePhase::Sustain => self.sustain_rate,
            EnvelopePhase::Release => (self.release_rate << 1) | 1,
        };
        let rate = effective_rate(r, key_code, self.key_scale);

        let mut increment = attenuation_increment(rate, cycle_count);
        if increment == 0 {
            return;
        }

        if self.ssg_enabled && self.phase != EnvelopePhase::Attack {
            // Attenuation increments 4x as fast in SSG-EG mode, but only while current
            // attenuation is below 0x200
            increment =
                if self.attenuation < SSG_ATTENUATION_THRESHOLD { 4 * increment } else { 0 };
        }

        match self.phase {
            EnvelopePhase::Attack => {
                // Rates of 62 and 63 immediately finish the attack phase
                if rate >= 62 {
                    self.attenuation = 0;
                } else {
                    // Exponential approach to 0; the complement is taken of the full-width value
                    let step = (!i32::from(self.attenuation) * i32::from(increment)) >> 4;
                    self.attenuation = cmp::max(0, i32::from(self.attenuation) + step) as u16;
                }

                if self.attenuation == 0 {
                    self.phase = EnvelopePhase::Decay;
                }
            }
            EnvelopePhase::Decay | EnvelopePhase::Sustain => {
                self.attenuation = cmp::min(MAX_ATTENUATION, self.attenuation + increment);
            }
            EnvelopePhase::Release => {
                self.attenuation += increment;
                if self.ssg_enabled && self.attenuation >= SSG_ATTENUATION_THRESHOLD {
                    self.attenuation = MAX_ATTENUATION;
                }
                self.attenuation = cmp::min(MAX_ATTENUATION, self.attenuation);
            }
        }
    }

    pub(super) fn key_on(&mut self, key_code: u8) {
        self.phase = EnvelopePhase::Attack;
        self.ssg_inverted = self.ssg_attack;

        // Rates of 62 and 63 skip attack phase
        if effective_rate(self.attack_rate, key_code, self.key_scale) >= 62 {
            self.attenuation = 0;
            self.phase = EnvelopePhase::Decay;
        }
    }

    pub(super) fn key_off(&mut self) {
        if self.ssg_enabled && self.ssg_inverted {
            // Keying off while the output is inverted applies the inversion to stored attenuation
            self.attenuation =
                SSG_ATTENUATION_THRESHOLD.wrapping_sub(self.attenuation) & ATTENUATION_MASK;
            self.ssg_inverted = false;
        }

        self.phase = EnvelopePhase::Release;
    }

    /// Envelope attenuation as seen by the operator output stage, applying SSG-EG if enabled.
    ///
    /// With SSG-EG enabled this runs on every operator evaluation and can restart the envelope
    /// or reset the phase counter.
    #[inline]
    pub(super) fn output_attenuation(&mut self, phase_generator: &mut PhaseGenerator) -> u16 {
        if !self.ssg_enabled {
            return self.attenuation;
        }

        if self.phase == EnvelopePhase::Release {
            return self.attenuation;
        }

        if self.attenuation >= SSG_ATTENUATION_THRESHOLD {
            if self.ssg_alternate {
                // Alternate flag inverts the output after each attack-decay-sustain pass; when
                // holding, only until the output matches the attack bit
                if !self.ssg_hold || self.ssg_attack == self.ssg_inverted {
                    self.ssg_inverted = !self.ssg_inverted;
                }
            } else if !self.ssg_hold {
                // Plain repeat restarts the waveform
                phase_generator.reset();
            }

            if !self.ssg_hold
                && matches!(self.phase, EnvelopePhase::Decay | EnvelopePhase::Sustain)
            {
                self.phase = EnvelopePhase::Attack;
            }
        }

        if self.ssg_inverted {
            SSG_ATTENUATION_THRESHOLD.wrapping_sub(self.attenuation) & ATTENUATION_MASK
        } else {
            self.attenuation
        }
    }

    pub(super) fn write_ssg_register(&mut self, value: u8) {
        // Lower 3 bits are ignored unless the enable bit is set
        let value = if value.bit(3) { value & 0x0F } else { 0 };

        let attack = value.bit(2);
        if attack != self.ssg_attack {
            self.ssg_inverted = !self.ssg_inverted;
        }

        self.ssg_enabled = value.bit(3);
        self.ssg_attack = attack;
        self.ssg_alternate = value.bit(1);
        self.ssg_hold = value.bit(0);

        log::trace!(
            "SSG-EG register write; enabled={}, attack={}, alternate={}, hold={}",
            self.ssg_enabled,
            self.ssg_attack,
            self.ssg_alternate,
            self.ssg_hold
        );
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
