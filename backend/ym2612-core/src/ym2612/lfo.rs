//! YM2612 low frequency oscillator (LFO)

use bincode::{Decode, Encode};
use opn2_common::num::GetBit;

// LFO step counter is 7 bits
const LFO_STEP_MASK: u8 = 0x7F;

const LFO_DIVIDERS: [u8; 8] = [
    108, // 3.85 Hz
    77,  // 5.40 Hz
    71,  // 5.86 Hz
    67,  // 6.21 Hz
    62,  // 6.71 Hz
    44,  // 9.46 Hz
    8,   // 52.02 Hz
    5,   // 83.23 Hz
];

// Right shifts applied to the AM output for AM sensitivity 1-3 (0 is always off)
const AM_SENSITIVITY_SHIFTS: [u8; 4] = [8, 3, 1, 0];

// Values are for the highest bit of F-number
const FM_INCREMENT_TABLE: &[[u8; 8]; 8] = &[
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 4, 4, 4, 4],
    [0, 0, 0, 4, 4, 4, 8, 8],
    [0, 0, 4, 4, 8, 8, 12, 12],
    [0, 0, 4, 8, 8, 8, 12, 16],
    [0, 0, 8, 12, 16, 16, 20, 24],
    [0, 0, 16, 24, 32, 32, 40, 48],
    [0, 0, 32, 48, 64, 64, 80, 96],
];

#[derive(Debug, Clone, Encode, Decode)]
pub(super) struct LowFrequencyOscillator {
    enabled: bool,
    frequency: u8,
    divider: u8,
    step: u8,
    am_output: u8,
}

impl LowFrequencyOscillator {
    pub(super) fn new() -> Self {
        Self { enabled: false, frequency: 0, divider: 0, step: 0, am_output: 0 }
    }

    pub(super) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.step = 0;
            self.divider = 0;
        }
    }

    pub(super) fn set_frequency(&mut self, frequency: u8) {
        self.frequency = frequency & 7;
    }

    #[cfg(test)]
    pub(super) fn step(&self) -> u8 {
        self.step
    }

    #[inline]
    pub(super) fn tick(&mut self) {
        if !self.enabled {
            self.am_output = 0;
            return;
        }

        self.divider += 1;
        if self.divider >= LFO_DIVIDERS[self.frequency as usize] {
            self.divider = 0;
            self.step = (self.step + 1) & LFO_STEP_MASK;
        }

        // Triangle wave; attenuation decreases from 126 to 0 during the first half and then
        // increases back up
        self.am_output = if self.step < 64 { (63 - self.step) * 2 } else { (self.step - 64) * 2 };
    }

    /// Tremolo attenuation in envelope units (10 bits representing 0-96dB).
    #[inline]
    pub(super) fn am_attenuation(&self, am_sensitivity: u8) -> u16 {
        if am_sensitivity == 0 {
            return 0;
        }

        u16::from(self.am_output) >> AM_SENSITIVITY_SHIFTS[(am_sensitivity & 3) as usize]
    }

    /// Signed vibrato offset to apply to a doubled (12-bit) F-number.
    #[inline]
    pub(super) fn fm_delta(&self, fm_sensitivity: u8, f_number: u16) -> i32 {
        if fm_sensitivity == 0 || !self.enabled {
            return 0;
        }

        let pm_step = self.step >> 2;
        let table_idx = if pm_step.bit(3) {
            // Max to zero
            7 - (pm_step & 7)
        } else {
            // Zero to max
            pm_step & 7
        };

        // Compute total increment from the highest 7 bits of F-number; the lower 4 bits never add
        // any increment
        let raw_increment =
            i32::from(FM_INCREMENT_TABLE[(fm_sensitivity & 7) as usize][table_idx as usize]);
        let delta: i32 = (4..11)
            .filter(|&i| f_number.bit(i))
            .map(|i| raw_increment >> (10 - i))
            .sum();

        // Negative half of wave
        if pm_step.bit(4) { -delta } else { delta }
    }
}

impl Default for LowFrequencyOscillator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn lfo_dividers() {
        for (freq, divider) in LFO_DIVIDERS.into_iter().enumerate() {
            let mut lfo = LowFrequencyOscillator::new();
            lfo.set_enabled(true);
            lfo.set_frequency(freq as u8);

            for i in 0..4 {
                for tick in 0..divider - 1 {
                    lfo.tick();
                    assert_eq!(
                        i,
                        lfo.step(),
                        "LFO step should be {i} after {} ticks with divider {divider}",
                        tick + 1
                    );
                }

                lfo.tick();
                assert_eq!(
                    i + 1,
                    lfo.step(),
                    "LFO step should be {} after {divider} ticks (frequency {freq})",
                    i + 1
                );
            }
        }
    }

    #[test]
    fn am_triangle() {
        let mut lfo = LowFrequencyOscillator::new();
        lfo.set_enabled(true);
        lfo.set_frequency(7);

        let mut outputs = Vec::new();
        for _ in 0..128 * 5 {
            lfo.tick();
            outputs.push(lfo.am_attenuation(3));
        }

        assert_eq!(126, outputs[0]);
        assert_eq!(0, *outputs.iter().min().unwrap());
        assert_eq!(126, *outputs.iter().max().unwrap());

        // Steps 63 and 64 are the bottom of the triangle
        let step_64 = 64 * 5 - 1;
        assert_eq!(0, outputs[step_64]);
        assert_eq!(0, outputs[step_64 - 5]);
        assert_eq!(2, outputs[step_64 - 10]);
        assert_eq!(2, outputs[step_64 + 5]);

        lfo.set_enabled(false);
        lfo.tick();
        assert_eq!(0, lfo.am_attenuation(3));
        assert_eq!(0, lfo.step());
    }

    #[test]
    fn am_sensitivity_shifts() {
        let mut lfo = LowFrequencyOscillator::new();
        lfo.set_enabled(true);
        lfo.tick();

        assert_eq!(0, lfo.am_attenuation(0));
        assert_eq!(126 >> 3, lfo.am_attenuation(1));
        assert_eq!(126 >> 1, lfo.am_attenuation(2));
        assert_eq!(126, lfo.am_attenuation(3));
    }

    #[test]
    fn fm_delta_by_quarter() {
        let mut lfo = LowFrequencyOscillator::new();
        lfo.set_enabled(true);
        lfo.set_frequency(7);

        // All of F-number bits 4-10 set
        let f_number = 0x7F0;
        assert_eq!(0, lfo.fm_delta(7, f_number));

        let mut deltas = Vec::new();
        for _ in 0..128 {
            for _ in 0..5 {
                lfo.tick();
            }
            deltas.push(lfo.fm_delta(7, f_number));
        }

        // Step 28 => PM step 7, the positive peak
        let peak: i32 = (4..11).map(|bit| 96 >> (10 - bit)).sum();
        assert_eq!(peak, deltas[27]);
        assert_eq!(peak, *deltas.iter().max().unwrap());
        assert_eq!(-peak, *deltas.iter().min().unwrap());
        assert!(deltas[64..].iter().all(|&delta| delta <= 0));

        assert_eq!(0, lfo.fm_delta(0, f_number));
        lfo.set_enabled(false);
        assert_eq!(0, lfo.fm_delta(7, f_number));
    }
}
