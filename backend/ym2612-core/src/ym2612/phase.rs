//! YM2612 phase generator

use bincode::{Decode, Encode};
use opn2_common::num::GetBit;

// Shifted F-num values are 17 bits
const SHIFTED_F_NUM_MASK: u32 = 0x1FFFF;

// Phase counter is 20 bits
pub(super) const PHASE_COUNTER_MASK: u32 = 0xFFFFF;

// Created by adapting the documented detune table into increments of ~0.053Hz
#[rustfmt::skip]
const DETUNE_TABLE: &[[u8; 4]; 32] = &[
    [0,  0,  1,  2],  [0,  0,  1,  2],  [0,  0,  1,  2],  [0,  0,  1,  2],  // Block 0
    [0,  1,  2,  2],  [0,  1,  2,  3],  [0,  1,  2,  3],  [0,  1,  2,  3],  // Block 1
    [0,  1,  2,  4],  [0,  1,  3,  4],  [0,  1,  3,  4],  [0,  1,  3,  5],  // Block 2
    [0,  2,  4,  5],  [0,  2,  4,  6],  [0,  2,  4,  6],  [0,  2,  5,  7],  // Block 3
    [0,  2,  5,  8],  [0,  3,  6,  8],  [0,  3,  6,  9],  [0,  3,  7, 10],  // Block 4
    [0,  4,  8, 11],  [0,  4,  8, 12],  [0,  4,  9, 13],  [0,  5, 10, 14],  // Block 5
    [0,  5, 11, 16],  [0,  6, 12, 17],  [0,  6, 13, 19],  [0,  7, 14, 20],  // Block 6
    [0,  8, 16, 22],  [0,  8, 16, 22],  [0,  8, 16, 22],  [0,  8, 16, 22],  // Block 7
];

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct PhaseGenerator {
    // Register values
    pub(super) multiple: u8,
    pub(super) detune: u8,
    // Internal state
    counter: u32,
    increment: u32,
}

impl PhaseGenerator {
    pub(super) fn reset(&mut self) {
        self.counter = 0;
    }

    pub(super) fn counter(&self) -> u32 {
        self.counter
    }

    pub(super) fn increment(&self) -> u32 {
        self.increment
    }

    /// Recompute the unmodulated increment after an F-number, block, detune, or multiple change.
    pub(super) fn update_increment(&mut self, f_number: u16, block: u8, key_code: u8) {
        let shifted_f_num = (u32::from(f_number) << block) >> 1;
        self.increment = self.detune_and_multiply(shifted_f_num, key_code);
    }

    /// Phase increment for a 12-bit F-number that has already had LFO vibrato applied.
    ///
    /// Detune still uses the key code of the unmodulated F-number.
    pub(super) fn modulated_increment(&self, modulated_f_num: u16, block: u8, key_code: u8) -> u32 {
        // Right shift by 2 because the modulated F-number is left shifted by 1 relative to the
        // register value
        let shifted_f_num = (u32::from(modulated_f_num) << block) >> 2;
        self.detune_and_multiply(shifted_f_num, key_code)
    }

    #[inline]
    pub(super) fn clock(&mut self, increment: u32) {
        self.counter = (self.counter + increment) & PHASE_COUNTER_MASK;
    }

    fn detune_and_multiply(&self, shifted_f_num: u32, key_code: u8) -> u32 {
        compute_phase_increment(shifted_f_num, key_code, self.detune, self.multiple)
    }
}

pub(super) fn compute_phase_increment(
    shifted_f_num: u32,
    key_code: u8,
    detune: u8,
    multiple: u8,
) -> u32 {
    let shifted_f_num = shifted_f_num & SHIFTED_F_NUM_MASK;

    // Apply detune; 17-bit result that wraps on underflow
    let detune_magnitude = detune & 3;
    let detune_increment: u32 =
        DETUNE_TABLE[(key_code & 0x1F) as usize][detune_magnitude as usize].into();
    let detuned_f_num = if detune.bit(2) {
        shifted_f_num.wrapping_sub(detune_increment) & SHIFTED_F_NUM_MASK
    } else {
        shifted_f_num.wrapping_add(detune_increment) & SHIFTED_F_NUM_MASK
    };

    // Apply frequency multiplier; 20-bit result
    let increment = match multiple {
        0 => detuned_f_num >> 1,
        m => detuned_f_num * u32::from(m),
    };
    increment & PHASE_COUNTER_MASK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ym2612::compute_key_code;
    use test_log::test;

    #[test]
    fn no_detune_is_shift_and_multiply() {
        for block in 0..8 {
            for f_number in [0x000, 0x001, 0x29A, 0x4D3, 0x7FF] {
                let key_code = compute_key_code(f_number, block);
                let base = (u32::from(f_number) << block) >> 1;

                for multiple in 0..16 {
                    let expected = match multiple {
                        0 => base >> 1,
                        m => base * u32::from(m),
                    } & PHASE_COUNTER_MASK;
                    assert_eq!(
                        expected,
                        compute_phase_increment(base, key_code, 0, multiple),
                        "f_number={f_number:03X}, block={block}, multiple={multiple}"
                    );

                    // Detune value 4 is negative zero
                    assert_eq!(expected, compute_phase_increment(base, key_code, 4, multiple));
                }
            }
        }
    }

    #[test]
    fn negative_detune_wraps() {
        // Key code 31, detune magnitude 3 subtracts 22 from a base of 0
        let increment = compute_phase_increment(0, 31, 7, 1);
        assert_eq!(0x20000 - 22, increment);

        let increment = compute_phase_increment(10, 31, 3, 1);
        assert_eq!(32, increment);
    }

    #[test]
    fn counter_wraps_at_20_bits() {
        let mut phase = PhaseGenerator { multiple: 15, ..PhaseGenerator::default() };
        phase.update_increment(0x7FF, 7, compute_key_code(0x7FF, 7));
        assert_eq!((0x1FFC0 * 15) & PHASE_COUNTER_MASK, phase.increment());

        for _ in 0..100 {
            phase.clock(phase.increment());
            assert!(phase.counter() <= PHASE_COUNTER_MASK);
        }

        phase.reset();
        assert_eq!(0, phase.counter());
    }

    #[test]
    fn modulated_increment_without_delta_matches_unmodulated() {
        let mut phase = PhaseGenerator { multiple: 1, detune: 2, ..PhaseGenerator::default() };
        let key_code = compute_key_code(0x29A, 4);
        phase.update_increment(0x29A, 4, key_code);

        assert_eq!(phase.increment(), phase.modulated_increment(0x29A << 1, 4, key_code));
    }
}
