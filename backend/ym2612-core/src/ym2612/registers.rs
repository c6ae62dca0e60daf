//! YM2612 register field extraction
//!
//! Every register that packs more than one field gets a small struct here with one `From<u8>`
//! impl, so the register write handlers never do bit math themselves.

use crate::ym2612::timer::TimerControl;
use bincode::{Decode, Encode};
use opn2_common::num::GetBit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub(super) enum Channel3Mode {
    #[default]
    Normal,
    // Operators 1-3 have their own frequency registers
    Special,
    // Special mode + Timer A overflow keys channel 3 on and off
    Csm,
}

impl Channel3Mode {
    pub(super) fn from_bits(bits: u8) -> Self {
        // Mode 3 behaves the same as mode 1
        match bits & 3 {
            0 => Self::Normal,
            2 => Self::Csm,
            _ => Self::Special,
        }
    }
}

/// $22
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct LfoControl {
    pub(super) enabled: bool,
    pub(super) frequency: u8,
}

impl From<u8> for LfoControl {
    fn from(value: u8) -> Self {
        Self { enabled: value.bit(3), frequency: value & 0x07 }
    }
}

/// $27
pub(super) struct ModeControl {
    pub(super) channel_3_mode: Channel3Mode,
    pub(super) timer_a: TimerControl,
    pub(super) timer_b: TimerControl,
}

impl From<u8> for ModeControl {
    fn from(value: u8) -> Self {
        Self {
            channel_3_mode: Channel3Mode::from_bits(value >> 6),
            timer_a: TimerControl {
                loaded: value.bit(0),
                overflow_flag_enabled: value.bit(2),
                clear_overflow_flag: value.bit(4),
            },
            timer_b: TimerControl {
                loaded: value.bit(1),
                overflow_flag_enabled: value.bit(3),
                clear_overflow_flag: value.bit(5),
            },
        }
    }
}

/// $28
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct KeyOnOff {
    // None if the channel bits select the invalid 4th slot
    pub(super) channel: Option<usize>,
    pub(super) operators: [bool; 4],
}

impl From<u8> for KeyOnOff {
    fn from(value: u8) -> Self {
        let slot = value & 0x03;
        let channel = (slot != 3).then(|| usize::from(slot) + if value.bit(2) { 3 } else { 0 });
        let operators = [value.bit(4), value.bit(5), value.bit(6), value.bit(7)];
        Self { channel, operators }
    }
}

/// $2B
pub(super) fn dac_enabled(value: u8) -> bool {
    value.bit(7)
}

/// $30-$3F
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DetuneMultiple {
    pub(super) detune: u8,
    pub(super) multiple: u8,
}

impl From<u8> for DetuneMultiple {
    fn from(value: u8) -> Self {
        Self { detune: (value >> 4) & 0x07, multiple: value & 0x0F }
    }
}

/// $40-$4F
pub(super) fn total_level(value: u8) -> u8 {
    value & 0x7F
}

/// $50-$5F
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct KeyScaleAttack {
    pub(super) key_scale: u8,
    pub(super) attack_rate: u8,
}

impl From<u8> for KeyScaleAttack {
    fn from(value: u8) -> Self {
        Self { key_scale: value >> 6, attack_rate: value & 0x1F }
    }
}

/// $60-$6F
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct AmDecay {
    pub(super) am_enabled: bool,
    pub(super) decay_rate: u8,
}

impl From<u8> for AmDecay {
    fn from(value: u8) -> Self {
        Self { am_enabled: value.bit(7), decay_rate: value & 0x1F }
    }
}

/// $70-$7F
pub(super) fn sustain_rate(value: u8) -> u8 {
    value & 0x1F
}

/// $80-$8F
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SustainRelease {
    pub(super) sustain_level: u8,
    pub(super) release_rate: u8,
}

impl From<u8> for SustainRelease {
    fn from(value: u8) -> Self {
        Self { sustain_level: value >> 4, release_rate: value & 0x0F }
    }
}

/// $A4-$A6 and $AC-$AE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct FrequencyHigh {
    pub(super) f_number_high: u8,
    pub(super) block: u8,
}

impl From<u8> for FrequencyHigh {
    fn from(value: u8) -> Self {
        Self { f_number_high: value & 0x07, block: (value >> 3) & 0x07 }
    }
}

/// $B0-$B2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct AlgorithmFeedback {
    pub(super) algorithm: u8,
    pub(super) feedback_level: u8,
}

impl From<u8> for AlgorithmFeedback {
    fn from(value: u8) -> Self {
        Self { algorithm: value & 0x07, feedback_level: (value >> 3) & 0x07 }
    }
}

/// $B4-$B6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PanSensitivity {
    pub(super) l_output: bool,
    pub(super) r_output: bool,
    pub(super) am_sensitivity: u8,
    pub(super) fm_sensitivity: u8,
}

impl From<u8> for PanSensitivity {
    fn from(value: u8) -> Self {
        Self {
            l_output: value.bit(7),
            r_output: value.bit(6),
            am_sensitivity: (value >> 4) & 0x03,
            fm_sensitivity: value & 0x07,
        }
    }
}

/// Channel within a part for a per-channel or per-operator register; slot 3 is invalid.
pub(super) fn channel_slot(register: u8) -> Option<usize> {
    let slot = register & 0x03;
    (slot != 3).then_some(slot.into())
}

/// Operator index for a per-operator register.
///
/// Bits 3-2 select the operator slot, except that slots 2 and 3 are swapped: the register order
/// is S1, S3, S2, S4.
pub(super) fn operator_index(register: u8) -> usize {
    (((register & 0x08) >> 3) | ((register & 0x04) >> 1)).into()
}

/// Channel 3 operator whose frequency is set by $A8-$AA / $AC-$AE.
pub(super) fn channel_3_operator(register: u8) -> Option<usize> {
    match register & 0x03 {
        0 => Some(2),
        1 => Some(0),
        2 => Some(1),
        _ => None,
    }
}

/// Channel 3 frequency override slot used by an operator in special mode, if any.
pub(super) fn channel_3_slot(operator_idx: usize) -> Option<usize> {
    match operator_idx {
        0 => Some(1),
        1 => Some(2),
        2 => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn operator_order() {
        let operators: Vec<_> = [0x30, 0x34, 0x38, 0x3C].into_iter().map(operator_index).collect();
        assert_eq!(vec![0, 2, 1, 3], operators);

        for operator_idx in 0..3 {
            let slot = channel_3_slot(operator_idx).unwrap();
            assert_eq!(Some(operator_idx), channel_3_operator(0xA8 + slot as u8));
        }
        assert_eq!(None, channel_3_slot(3));
    }

    #[test]
    fn invalid_channel_slot() {
        assert_eq!(Some(0), channel_slot(0xA0));
        assert_eq!(Some(2), channel_slot(0x36));
        assert_eq!(None, channel_slot(0x33));
        assert_eq!(None, channel_slot(0xB7));

        assert_eq!(None, KeyOnOff::from(0xF3).channel);
        assert_eq!(None, KeyOnOff::from(0xF7).channel);
    }

    #[test]
    fn key_on_off_fields() {
        let key = KeyOnOff::from(0x96);
        assert_eq!(Some(5), key.channel);
        assert_eq!([true, false, false, true], key.operators);

        let key = KeyOnOff::from(0x01);
        assert_eq!(Some(1), key.channel);
        assert_eq!([false; 4], key.operators);
    }

    #[test]
    fn mode_control_fields() {
        assert_eq!(Channel3Mode::Normal, ModeControl::from(0x3F).channel_3_mode);
        assert_eq!(Channel3Mode::Special, ModeControl::from(0x40).channel_3_mode);
        assert_eq!(Channel3Mode::Csm, ModeControl::from(0x80).channel_3_mode);
        assert_eq!(Channel3Mode::Special, ModeControl::from(0xC0).channel_3_mode);

        let control = ModeControl::from(0b0001_0101);
        assert!(control.timer_a.loaded);
        assert!(control.timer_a.overflow_flag_enabled);
        assert!(control.timer_a.clear_overflow_flag);
        assert!(!control.timer_b.loaded);
        assert!(!control.timer_b.overflow_flag_enabled);
        assert!(!control.timer_b.clear_overflow_flag);
    }

    #[test]
    fn packed_operator_fields() {
        assert_eq!(DetuneMultiple { detune: 7, multiple: 0xF }, DetuneMultiple::from(0xFF));
        assert_eq!(0x7F, total_level(0xFF));
        assert_eq!(KeyScaleAttack { key_scale: 3, attack_rate: 0x1F }, KeyScaleAttack::from(0xDF));
        assert_eq!(AmDecay { am_enabled: true, decay_rate: 0x14 }, AmDecay::from(0x94));
        assert_eq!(0x08, sustain_rate(0xE8));
        assert_eq!(
            SustainRelease { sustain_level: 4, release_rate: 8 },
            SustainRelease::from(0x48)
        );
    }

    #[test]
    fn packed_channel_fields() {
        assert_eq!(FrequencyHigh { f_number_high: 2, block: 4 }, FrequencyHigh::from(0x22));
        assert_eq!(
            AlgorithmFeedback { algorithm: 7, feedback_level: 7 },
            AlgorithmFeedback::from(0x3F)
        );
        assert_eq!(
            PanSensitivity {
                l_output: true,
                r_output: false,
                am_sensitivity: 3,
                fm_sensitivity: 7
            },
            PanSensitivity::from(0xB7)
        );
        assert_eq!(LfoControl { enabled: true, frequency: 7 }, LfoControl::from(0x0F));
        assert!(dac_enabled(0x80));
        assert!(!dac_enabled(0x7F));
    }
}
