//! YM2612 FM synthesis sound chip, also known as the OPN2
//!
//! The chip is driven by 68000 clock cycles and runs one native sample every 144 cycles
//! (~53267 Hz on NTSC). Native samples are downsampled to the host output frequency by dropping
//! samples, and buffered as interleaved stereo `i16` pairs until [`Ym2612::take_buffer`] is called.
//!
//! This implementation is mostly based on community research documented here:
//! <http://gendev.spritesmind.net/forum/viewtopic.php?f=24&t=386>

mod algorithm;
mod envelope;
mod lfo;
mod operator;
mod phase;
mod registers;
mod timer;

use crate::ym2612::algorithm::Quantization;
use crate::ym2612::envelope::EnvelopeClock;
use crate::ym2612::lfo::LowFrequencyOscillator;
use crate::ym2612::operator::FmOperator;
use crate::ym2612::registers::{
    AlgorithmFeedback, AmDecay, Channel3Mode, DetuneMultiple, FrequencyHigh, KeyOnOff,
    KeyScaleAttack, LfoControl, ModeControl, PanSensitivity, SustainRelease,
};
use crate::ym2612::timer::{TimerA, TimerB, TimerTickEffect};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use opn2_common::num::{GetBit, U16Ext};
use opn2_config::{Opn2BusyBehavior, Ym2612Config};
use std::array;

/// 68000 cycles per YM2612 native sample
pub const M68K_CYCLES_PER_SAMPLE: u32 = 144;

// Data port writes hold the busy flag for 2 native samples (32 internal cycles)
const WRITE_BUSY_SAMPLES: u64 = 2;

// Roughly how long (in native samples) a discrete YM2612 keeps returning the last status value
// through ports 1-3 before it decays to 0
const STATUS_DECAY_SAMPLES: u64 = 13_300;

// Unsigned 8-bit DAC midpoint; the DAC outputs silence until a sample is written
const DAC_SAMPLE_POWER_ON: u8 = 0x80;

const CHANNEL_3: usize = 2;
const DAC_CHANNEL: usize = 5;

fn compute_key_code(f_number: u16, block: u8) -> u8 {
    // Bits 4-2: Block
    // Bit 1: F11
    // Bit 0: (F11 & (F10 | F9 | F8)) | (!F11 & F10 & F9 & F8)
    let f11 = f_number.bit(10);
    let f10 = f_number.bit(9);
    let f9 = f_number.bit(8);
    let f8 = f_number.bit(7);
    (block << 2)
        | (u8::from(f11) << 1)
        | u8::from((f11 && (f10 || f9 || f8)) || (!f11 && f10 && f9 && f8))
}

#[derive(Debug, Clone, Encode, Decode)]
struct FmChannel {
    operators: [FmOperator; 4],
    f_number: u16,
    block: u8,
    algorithm: u8,
    feedback_level: u8,
    am_sensitivity: u8,
    fm_sensitivity: u8,
    l_output: bool,
    r_output: bool,
}

impl FmChannel {
    fn new() -> Self {
        Self {
            operators: array::from_fn(|_| FmOperator::default()),
            f_number: 0,
            block: 0,
            algorithm: 0,
            feedback_level: 0,
            am_sensitivity: 0,
            fm_sensitivity: 0,
            l_output: true,
            r_output: true,
        }
    }
}

impl Default for FmChannel {
    fn default() -> Self {
        Self::new()
    }
}

// Buffered output is not chip state; it is skipped when saving and comes back empty on load
#[derive(Debug, Clone, Default)]
struct SampleBuffer(Vec<i16>);

impl Encode for SampleBuffer {
    fn encode<E: Encoder>(&self, _encoder: &mut E) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl<Context> Decode<Context> for SampleBuffer {
    fn decode<D: Decoder<Context = Context>>(_decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Self::default())
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for SampleBuffer {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        _decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Ok(Self::default())
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ym2612 {
    channels: [FmChannel; 6],
    address_latches: [u8; 2],
    dac_enabled: bool,
    dac_sample: u8,
    lfo: LowFrequencyOscillator,
    envelope_clock: EnvelopeClock,
    timer_a: TimerA,
    timer_b: TimerB,
    channel_3_mode: Channel3Mode,
    // Channel 3 special mode frequencies, indexed by register slot ($A8-$AA / $AC-$AE)
    channel_3_f_numbers: [u16; 3],
    channel_3_blocks: [u8; 3],
    csm_key_on_pending: bool,
    clock_hz: u32,
    native_frequency: u32,
    output_frequency: u32,
    cycle_accumulator: u32,
    resample_accumulator: u32,
    native_sample_count: u64,
    busy_until: u64,
    last_status_read: u8,
    last_status_sample: u64,
    quantize_output: bool,
    emulate_ladder_effect: bool,
    busy_behavior: Opn2BusyBehavior,
    sample_buffer: SampleBuffer,
}

impl Ym2612 {
    /// Create a chip driven by a `clock_hz` 68000 clock that outputs samples at
    /// `output_frequency`, with default output and busy flag settings.
    #[must_use]
    pub fn new(clock_hz: u32, output_frequency: u32) -> Self {
        let config = Ym2612Config::default();
        Self::with_settings(
            clock_hz,
            output_frequency,
            config.quantize_output,
            config.emulate_ladder_effect,
            config.busy_behavior,
        )
    }

    #[must_use]
    pub fn new_from_config(config: &Ym2612Config) -> Self {
        Self::with_settings(
            config.clock_hz(),
            config.output_frequency,
            config.quantize_output,
            config.emulate_ladder_effect,
            config.busy_behavior,
        )
    }

    fn with_settings(
        clock_hz: u32,
        output_frequency: u32,
        quantize_output: bool,
        emulate_ladder_effect: bool,
        busy_behavior: Opn2BusyBehavior,
    ) -> Self {
        Self {
            channels: array::from_fn(|_| FmChannel::new()),
            address_latches: [0; 2],
            dac_enabled: false,
            dac_sample: DAC_SAMPLE_POWER_ON,
            lfo: LowFrequencyOscillator::new(),
            envelope_clock: EnvelopeClock::default(),
            timer_a: TimerA::default(),
            timer_b: TimerB::default(),
            channel_3_mode: Channel3Mode::default(),
            channel_3_f_numbers: [0; 3],
            channel_3_blocks: [0; 3],
            csm_key_on_pending: false,
            clock_hz,
            native_frequency: clock_hz / M68K_CYCLES_PER_SAMPLE,
            output_frequency,
            cycle_accumulator: 0,
            resample_accumulator: 0,
            native_sample_count: 0,
            busy_until: 0,
            last_status_read: 0,
            last_status_sample: 0,
            quantize_output,
            emulate_ladder_effect,
            busy_behavior,
            sample_buffer: SampleBuffer::default(),
        }
    }

    /// Return to power-on state, keeping the clock, output frequency, and output settings.
    pub fn reset(&mut self) {
        *self = Self::with_settings(
            self.clock_hz,
            self.output_frequency,
            self.quantize_output,
            self.emulate_ladder_effect,
            self.busy_behavior,
        );
    }

    /// Apply a new configuration without resetting chip state.
    ///
    /// Changing the clock or output frequency restarts the downsampling phase.
    pub fn reload_config(&mut self, config: Ym2612Config) {
        self.quantize_output = config.quantize_output;
        self.emulate_ladder_effect = config.emulate_ladder_effect;
        self.busy_behavior = config.busy_behavior;

        let clock_hz = config.clock_hz();
        if clock_hz != self.clock_hz || config.output_frequency != self.output_frequency {
            self.clock_hz = clock_hz;
            self.native_frequency = clock_hz / M68K_CYCLES_PER_SAMPLE;
            self.output_frequency = config.output_frequency;
            self.resample_accumulator = 0;
        }

        log::debug!("Reloaded YM2612 config: {config:?}");
    }

    /// Write to one of the 4 bus ports.
    ///
    /// Ports 0 and 2 select a register in part 1 (global + channels 1-3) or part 2
    /// (channels 4-6); ports 1 and 3 write data to the register selected for that part.
    pub fn write(&mut self, port: u8, value: u8) {
        match port & 3 {
            0 => self.address_latches[0] = value,
            1 => self.write_register(0, self.address_latches[0], value),
            2 => self.address_latches[1] = value,
            3 => self.write_register(1, self.address_latches[1], value),
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    /// Read the status register through one of the 4 bus ports.
    ///
    /// Bit 7 is the busy flag, bit 1 is the Timer B overflow flag, bit 0 is the Timer A
    /// overflow flag.
    pub fn read(&mut self, port: u8) -> u8 {
        if self.busy_behavior == Opn2BusyBehavior::Ym2612 && port.bit(0) {
            // On a discrete YM2612, ports 1 and 3 return the last value read through ports 0/2,
            // which decays to 0 after a while
            let elapsed = self.native_sample_count - self.last_status_sample;
            return if elapsed < STATUS_DECAY_SAMPLES { self.last_status_read } else { 0 };
        }

        let status = self.live_status();
        self.last_status_read = status;
        self.last_status_sample = self.native_sample_count;

        status
    }

    fn live_status(&self) -> u8 {
        let busy_flag = match self.busy_behavior {
            Opn2BusyBehavior::AlwaysZero => false,
            Opn2BusyBehavior::Ym2612 | Opn2BusyBehavior::Ym3438 => self.is_busy(),
        };

        (u8::from(busy_flag) << 7)
            | (u8::from(self.timer_b.overflow_flag()) << 1)
            | u8::from(self.timer_a.overflow_flag())
    }

    /// Advance the chip by the given number of 68000 cycles, generating native samples and
    /// buffering any output samples that fall due.
    #[inline]
    pub fn advance(&mut self, m68k_cycles: u32) {
        self.cycle_accumulator += m68k_cycles;
        while self.cycle_accumulator >= M68K_CYCLES_PER_SAMPLE {
            self.cycle_accumulator -= M68K_CYCLES_PER_SAMPLE;
            self.clock();
        }
    }

    /// Take all buffered output samples as interleaved L/R pairs, leaving the buffer empty.
    #[must_use]
    pub fn take_buffer(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.sample_buffer.0)
    }

    #[must_use]
    pub fn native_sample_count(&self) -> u64 {
        self.native_sample_count
    }

    #[must_use]
    pub fn native_frequency(&self) -> u32 {
        self.native_frequency
    }

    #[must_use]
    pub fn output_frequency(&self) -> u32 {
        self.output_frequency
    }

    #[must_use]
    pub fn timer_a_overflowed(&self) -> bool {
        self.timer_a.overflow_flag()
    }

    #[must_use]
    pub fn timer_b_overflowed(&self) -> bool {
        self.timer_b.overflow_flag()
    }

    /// Whether a data write happened within the last 2 native samples, regardless of how the
    /// busy flag is reported through [`Ym2612::read`].
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.native_sample_count < self.busy_until
    }

    pub(crate) fn replace_state(&mut self, mut loaded: Self) {
        // Output settings and timing belong to the host, not to the saved chip
        loaded.quantize_output = self.quantize_output;
        loaded.emulate_ladder_effect = self.emulate_ladder_effect;
        loaded.busy_behavior = self.busy_behavior;
        loaded.sample_buffer = std::mem::take(&mut self.sample_buffer);

        if loaded.clock_hz != self.clock_hz || loaded.output_frequency != self.output_frequency {
            loaded.clock_hz = self.clock_hz;
            loaded.native_frequency = self.native_frequency;
            loaded.output_frequency = self.output_frequency;
            loaded.resample_accumulator = 0;
        }

        *self = loaded;
    }

    fn write_register(&mut self, part: usize, register: u8, value: u8) {
        if register != 0x2A {
            log::trace!("Part {}: Wrote {value:02X} to {register:02X}", part + 1);
        }

        self.busy_until = self.native_sample_count + WRITE_BUSY_SAMPLES;

        match register {
            // Global registers only exist in part 1
            0x20..=0x2F if part == 0 => self.write_global_register(register, value),
            0x30..=0x9F => self.write_operator_register(part, register, value),
            0xA0..=0xBF => self.write_channel_register(part, register, value),
            _ => {}
        }
    }

    fn write_global_register(&mut self, register: u8, value: u8) {
        match register {
            0x22 => {
                let LfoControl { enabled, frequency } = value.into();
                self.lfo.set_enabled(enabled);
                self.lfo.set_frequency(frequency);

                log::trace!("LFO enabled={enabled}, frequency={frequency}");
            }
            0x24 => {
                // Timer A period bits 9-2
                self.timer_a.write_period_high(value);

                log::trace!("Timer A period: {}", self.timer_a.period());
            }
            0x25 => {
                // Timer A period bits 1-0
                self.timer_a.write_period_low(value);

                log::trace!("Timer A period: {}", self.timer_a.period());
            }
            0x26 => {
                self.timer_b.period = value;

                log::trace!("Timer B period: {}", self.timer_b.period);
            }
            0x27 => {
                let ModeControl { channel_3_mode, timer_a, timer_b } = value.into();
                self.channel_3_mode = channel_3_mode;
                self.timer_a.write_control(timer_a);
                self.timer_b.write_control(timer_b);

                log::trace!("Channel 3 mode: {channel_3_mode:?}");
                log::trace!("Timer A state: {:?}", self.timer_a);
                log::trace!("Timer B state: {:?}", self.timer_b);
            }
            0x28 => {
                let KeyOnOff { channel, operators } = value.into();
                let Some(channel_idx) = channel else { return };

                let channel = &mut self.channels[channel_idx];
                for (operator, key_on) in channel.operators.iter_mut().zip(operators) {
                    operator.write_key_latch(key_on);
                }

                log::trace!("Key on/off for channel {}: {:02X}", channel_idx + 1, value >> 4);
            }
            0x2A => {
                self.dac_sample = value;
            }
            0x2B => {
                self.dac_enabled = registers::dac_enabled(value);

                log::trace!("DAC enabled: {}", self.dac_enabled);
            }
            _ => {}
        }
    }

    fn write_operator_register(&mut self, part: usize, register: u8, value: u8) {
        let Some(slot) = registers::channel_slot(register) else {
            // Invalid; only 3 channels per part
            return;
        };

        let channel_idx = 3 * part + slot;
        let operator_idx = registers::operator_index(register);

        let operator = &mut self.channels[channel_idx].operators[operator_idx];
        match register >> 4 {
            0x03 => {
                let DetuneMultiple { detune, multiple } = value.into();
                operator.phase.detune = detune;
                operator.phase.multiple = multiple;
                self.update_phase_increment(channel_idx, operator_idx);
            }
            0x04 => {
                operator.envelope.total_level = registers::total_level(value);
            }
            0x05 => {
                let KeyScaleAttack { key_scale, attack_rate } = value.into();
                operator.envelope.key_scale = key_scale;
                operator.envelope.attack_rate = attack_rate;
            }
            0x06 => {
                let AmDecay { am_enabled, decay_rate } = value.into();
                operator.am_enabled = am_enabled;
                operator.envelope.decay_rate = decay_rate;
            }
            0x07 => {
                operator.envelope.sustain_rate = registers::sustain_rate(value);
            }
            0x08 => {
                let SustainRelease { sustain_level, release_rate } = value.into();
                operator.envelope.sustain_level = sustain_level;
                operator.envelope.release_rate = release_rate;
            }
            0x09 => {
                operator.envelope.write_ssg_register(value);
            }
            _ => unreachable!("register is in 0x30..=0x9F"),
        }

        log::trace!(
            "Channel {} operator {}: {:?}",
            channel_idx + 1,
            operator_idx + 1,
            self.channels[channel_idx].operators[operator_idx].envelope
        );
    }

    fn write_channel_register(&mut self, part: usize, register: u8, value: u8) {
        let Some(slot) = registers::channel_slot(register) else {
            return;
        };
        let channel_idx = 3 * part + slot;

        match register {
            0xA0..=0xA2 => {
                // F-number low bits; this write latches the full frequency
                self.channels[channel_idx].f_number.set_lsb(value);
                self.update_channel_frequency(channel_idx);

                let channel = &self.channels[channel_idx];
                log::trace!(
                    "Channel {}: F-number={:03X}, block={}",
                    channel_idx + 1,
                    channel.f_number,
                    channel.block
                );
            }
            0xA4..=0xA6 => {
                // Takes effect on the next F-number low write
                let FrequencyHigh { f_number_high, block } = value.into();
                let channel = &mut self.channels[channel_idx];
                channel.f_number.set_msb(f_number_high);
                channel.block = block;
            }
            0xA8..=0xAA if part == 0 => {
                self.channel_3_f_numbers[slot].set_lsb(value);
                if self.channel_3_mode != Channel3Mode::Normal {
                    if let Some(operator_idx) = registers::channel_3_operator(register) {
                        self.update_phase_increment(CHANNEL_3, operator_idx);
                    }
                }

                log::trace!(
                    "Channel 3 slot {slot}: F-number={:03X}, block={}",
                    self.channel_3_f_numbers[slot],
                    self.channel_3_blocks[slot]
                );
            }
            0xAC..=0xAE if part == 0 => {
                let FrequencyHigh { f_number_high, block } = value.into();
                self.channel_3_f_numbers[slot].set_msb(f_number_high);
                self.channel_3_blocks[slot] = block;
            }
            0xB0..=0xB2 => {
                let AlgorithmFeedback { algorithm, feedback_level } = value.into();
                let channel = &mut self.channels[channel_idx];
                channel.algorithm = algorithm;
                channel.feedback_level = feedback_level;

                log::trace!(
                    "Channel {}: algorithm={algorithm}, feedback={feedback_level}",
                    channel_idx + 1
                );
            }
            0xB4..=0xB6 => {
                let PanSensitivity { l_output, r_output, am_sensitivity, fm_sensitivity } =
                    value.into();
                let channel = &mut self.channels[channel_idx];
                channel.l_output = l_output;
                channel.r_output = r_output;
                channel.am_sensitivity = am_sensitivity;
                channel.fm_sensitivity = fm_sensitivity;

                log::trace!(
                    "Channel {}: L={l_output}, R={r_output}, AM sensitivity={am_sensitivity}, FM \
                     sensitivity={fm_sensitivity}",
                    channel_idx + 1
                );
            }
            _ => {}
        }
    }

    /// Channel 3 special mode frequency for an operator, if special mode applies to it.
    fn channel_3_frequency(&self, channel_idx: usize, operator_idx: usize) -> Option<(u16, u8)> {
        if channel_idx != CHANNEL_3 || self.channel_3_mode == Channel3Mode::Normal {
            return None;
        }

        let slot = registers::channel_3_slot(operator_idx)?;
        Some((self.channel_3_f_numbers[slot], self.channel_3_blocks[slot]))
    }

    fn operator_frequency(&self, channel_idx: usize, operator_idx: usize) -> (u16, u8) {
        self.channel_3_frequency(channel_idx, operator_idx).unwrap_or_else(|| {
            let channel = &self.channels[channel_idx];
            (channel.f_number, channel.block)
        })
    }

    fn update_phase_increment(&mut self, channel_idx: usize, operator_idx: usize) {
        let special_frequency = self.channel_3_frequency(channel_idx, operator_idx);
        let (f_number, block) = self.operator_frequency(channel_idx, operator_idx);

        let operator = &mut self.channels[channel_idx].operators[operator_idx];
        if special_frequency.is_some() {
            operator.key_code = compute_key_code(f_number, block);
        }
        operator.update_increment(f_number, block);
    }

    fn update_channel_frequency(&mut self, channel_idx: usize) {
        let channel = &mut self.channels[channel_idx];
        let key_code = compute_key_code(channel.f_number, channel.block);
        for operator in &mut channel.operators {
            operator.key_code = key_code;
        }

        for operator_idx in 0..4 {
            self.update_phase_increment(channel_idx, operator_idx);
        }
    }

    #[inline]
    fn clock(&mut self) {
        self.native_sample_count += 1;

        self.clock_timers();
        self.lfo.tick();

        if let Some(cycle_count) = self.envelope_clock.tick() {
            for channel in &mut self.channels {
                for operator in &mut channel.operators {
                    operator.envelope.clock(cycle_count, operator.key_code);
                }
            }
        }

        let mut sum_l = 0_i32;
        let mut sum_r = 0_i32;
        for channel_idx in 0..self.channels.len() {
            let (sample_l, sample_r) = self.generate_channel_sample(channel_idx);
            sum_l += i32::from(sample_l);
            sum_r += i32::from(sample_r);
        }

        let sample_l = (sum_l >> 1).clamp(i16::MIN.into(), i16::MAX.into()) as i16;
        let sample_r = (sum_r >> 1).clamp(i16::MIN.into(), i16::MAX.into()) as i16;

        // Keep every native sample whose output position has been reached
        self.resample_accumulator += self.output_frequency;
        if self.resample_accumulator >= self.native_frequency {
            self.resample_accumulator -= self.native_frequency;
            self.sample_buffer.0.extend([sample_l, sample_r]);
        }
    }

    fn clock_timers(&mut self) {
        if self.timer_a.loaded() && self.csm_key_on_pending {
            // CSM key on lasts for one sample; operators not keyed on through $28 release here
            for operator in &mut self.channels[CHANNEL_3].operators {
                if !operator.key_on_latch {
                    operator.key_off();
                }
            }
            self.csm_key_on_pending = false;
        }

        if self.timer_a.tick() == TimerTickEffect::Overflowed
            && self.channel_3_mode == Channel3Mode::Csm
        {
            for operator in &mut self.channels[CHANNEL_3].operators {
                operator.key_on();
            }
            self.csm_key_on_pending = true;

            log::trace!("CSM key on at native sample {}", self.native_sample_count);
        }

        self.timer_b.tick();
    }

    fn generate_channel_sample(&mut self, channel_idx: usize) -> (i16, i16) {
        if channel_idx == DAC_CHANNEL && self.dac_enabled {
            // DAC replaces channel 6 FM output entirely; the operators do not advance
            let sample = (i16::from(self.dac_sample) - 128) << 6;
            let channel = &self.channels[channel_idx];
            return (
                self.apply_panning(sample, channel.l_output),
                self.apply_panning(sample, channel.r_output),
            );
        }

        let fm_sensitivity = self.channels[channel_idx].fm_sensitivity;
        if fm_sensitivity != 0 && self.lfo.enabled() {
            let frequencies: [(u16, u8); 4] =
                array::from_fn(|operator_idx| self.operator_frequency(channel_idx, operator_idx));
            for (operator, (f_number, block)) in
                self.channels[channel_idx].operators.iter_mut().zip(frequencies)
            {
                // Vibrato is applied to the doubled 12-bit F-number
                let delta = self.lfo.fm_delta(fm_sensitivity, f_number);
                let modulated_f_num = (((i32::from(f_number) << 1) + delta) & 0xFFF) as u16;
                let increment =
                    operator.phase.modulated_increment(modulated_f_num, block, operator.key_code);
                operator.phase.clock(increment);
            }
        } else {
            for operator in &mut self.channels[channel_idx].operators {
                operator.phase.clock(operator.phase.increment());
            }
        }

        let am_attenuation = self.lfo.am_attenuation(self.channels[channel_idx].am_sensitivity);
        let quantization = Quantization::new(self.quantize_output);

        let channel = &mut self.channels[channel_idx];
        let sample = algorithm::generate_sample(
            &mut channel.operators,
            channel.algorithm,
            channel.feedback_level,
            am_attenuation,
            quantization,
        );

        let channel = &self.channels[channel_idx];
        (self.apply_panning(sample, channel.l_output), self.apply_panning(sample, channel.r_output))
    }

    fn apply_panning(&self, sample: i16, pan_enabled: bool) -> i16 {
        let pan_enabled: i16 = pan_enabled.into();

        if !self.emulate_ladder_effect {
            return sample * pan_enabled;
        }

        // Ladder effect emulation
        // If channel is not muted through panning, add +4 to non-negative samples and -3 to negative
        // If muted, output a constant +4 for non-negative samples and -4 for negative
        // See https://gendev.spritesmind.net/forum/viewtopic.php?p=32605#p32605
        let adjustment = if sample >= 0 { 4 } else { -(4 - pan_enabled) };

        sample * pan_enabled + (adjustment << 5)
    }
}
