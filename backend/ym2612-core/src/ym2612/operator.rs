//! YM2612 FM operator: phase generator + envelope generator + log-sine output stage

use crate::ym2612::envelope::{self, EnvelopeGenerator};
use crate::ym2612::phase::PhaseGenerator;
use bincode::{Decode, Encode};
use opn2_common::num::GetBit;
use std::array;
use std::cmp;
use std::sync::LazyLock;

// Phase is 10 bits
const PHASE_MASK: u16 = 0x03FF;
const HALF_PHASE_MASK: u16 = PHASE_MASK >> 1;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct FmOperator {
    pub(super) phase: PhaseGenerator,
    pub(super) envelope: EnvelopeGenerator,
    pub(super) am_enabled: bool,
    // Key on/off state as last written through register $28; CSM triggers do not change this
    pub(super) key_on_latch: bool,
    pub(super) key_code: u8,
    current_output: i16,
    last_output: i16,
}

impl FmOperator {
    pub(super) fn update_increment(&mut self, f_number: u16, block: u8) {
        self.phase.update_increment(f_number, block, self.key_code);
    }

    pub(super) fn key_on(&mut self) {
        self.phase.reset();
        self.envelope.key_on(self.key_code);

        log::trace!("State at key on: {self:?}");
    }

    pub(super) fn key_off(&mut self) {
        self.envelope.key_off();
    }

    /// Key on/off through register $28; only transitions of the latch have any effect.
    pub(super) fn write_key_latch(&mut self, value: bool) {
        if value == self.key_on_latch {
            return;
        }

        self.key_on_latch = value;
        if value {
            self.key_on();
        } else {
            self.key_off();
        }
    }

    /// Self-feedback modulation, computed from the last two outputs.
    pub(super) fn feedback(&self, feedback_level: u8) -> i32 {
        match feedback_level {
            0 => 0,
            f => (i32::from(self.current_output) + i32::from(self.last_output)) >> (10 - f),
        }
    }

    #[inline]
    pub(super) fn sample_clock(&mut self, modulation_input: i32, am_attenuation: u16) -> i16 {
        // SSG-EG processing may reset the phase counter, so it must happen before reading phase
        let envelope_attenuation = self.envelope.output_attenuation(&mut self.phase);

        // Modulation is in units of the 10-bit phase output, so shift it up into counter units;
        // the sum is allowed to wrap because only bits 10-19 are used
        let phase = self.phase.counter().wrapping_add((modulation_input << 10) as u32);
        let phase = ((phase >> 10) as u16) & PHASE_MASK;

        let total_level = u16::from(self.envelope.total_level) << 3;
        let mut attenuation =
            cmp::min(envelope::MAX_ATTENUATION, envelope_attenuation + total_level);
        if self.am_enabled {
            attenuation = cmp::min(envelope::MAX_ATTENUATION, attenuation + am_attenuation);
        }

        let output = compute_output(phase, attenuation);

        self.last_output = self.current_output;
        self.current_output = output;

        output
    }
}

/// Signed 14-bit output for a 10-bit phase and a 10-bit attenuation.
fn compute_output(phase: u16, attenuation: u16) -> i16 {
    // Phase is a 10-bit value that represents a number in the range 0 to 2*PI.
    // Actual hardware splits this into a sign bit and a half-phase value from 0 to PI, computes
    // the amplitude based on the half-phase, and then applies the sign bit at final output
    let sign = phase.bit(9);
    let sine_attenuation = phase_to_attenuation(phase);

    // Add phase attenuation (4.8 fixed-point) and envelope attenuation (4.6 fixed-point)
    let total_attenuation = sine_attenuation + (attenuation << 2);

    let amplitude = attenuation_to_amplitude(total_attenuation) as i16;
    if sign { -amplitude } else { amplitude }
}

#[inline]
fn phase_to_attenuation(phase: u16) -> u16 {
    // Actual hardware has a 256-entry quarter-sine table. This is emulated using a half-sine table
    // for simplicity, but the values are calculated the same way
    static LOG_SINE_TABLE: LazyLock<[u16; 512]> = LazyLock::new(|| {
        array::from_fn(|mut i| {
            use std::f64::consts::PI;

            if i.bit(8) {
                // Second quarter-phase
                i = (!i) & 0xFF;
            }

            // The table indices represent numbers in the range 0 to PI/2, but slightly offset in order
            // to avoid computing log2(0)
            let n = ((i << 1) | 1) as f64;
            let sine = (n / 512.0 * PI / 2.0).sin();

            // The table stores attenuation values, but on a log2 scale instead of log10
            let attenuation = -sine.log2();

            // Table contains 12-bit values that represent 4.8 fixed-point
            (attenuation * f64::from(1 << 8)).round() as u16
        })
    });

    LOG_SINE_TABLE[(phase & HALF_PHASE_MASK) as usize]
}

#[inline]
fn attenuation_to_amplitude(attenuation: u16) -> u16 {
    static POW2_TABLE: LazyLock<[u16; 256]> = LazyLock::new(|| {
        array::from_fn(|i| {
            // This is a lookup table for 2^(-n), where n is a value between 0 and 1
            // Index i represents the number (i + 1)/256
            let n = ((i + 1) as f64) / 256.0;
            let inverse_pow2 = 2.0_f64.powf(-n);

            // Table contains 11-bit values that represent 0.11 fixed-point
            (inverse_pow2 * f64::from(1 << 11)).round() as u16
        })
    });

    // Attenuation is interpreted as a 5.8 fixed-point number on a log2 scale
    let int_part = attenuation >> 8;
    if int_part >= 13 {
        // Int part is applied as a right shift to 13-bit values
        return 0;
    }

    let fract_part = attenuation & 0xFF;
    let fract_pow2 = POW2_TABLE[fract_part as usize];
    (fract_pow2 << 2) >> int_part
}
