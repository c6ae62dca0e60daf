mod script;

use crate::script::Command;
use anyhow::Context;
use clap::Parser;
use crc::{CRC_32_ISO_HDLC, Crc};
use env_logger::Env;
use opn2_common::TimingMode;
use opn2_config::{Opn2BusyBehavior, Ym2612Config};
use std::fs;
use std::path::{Path, PathBuf};
use ym2612_core::Ym2612;

// The chip is driven one NTSC/PAL scanline's worth of 68000 cycles at a time
const M68K_CYCLES_PER_SCANLINE: u32 = 488;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Parser)]
struct Args {
    /// Register-write script path
    #[arg(short = 's', long)]
    script_path: PathBuf,

    /// Output file path; a 16-bit stereo WAV file unless --raw is set
    #[arg(short = 'o', long)]
    output_path: PathBuf,

    /// Write headerless interleaved 16-bit little-endian PCM instead of WAV
    #[arg(long, default_value_t)]
    raw: bool,

    /// TOML file containing chip configuration; command-line options override it
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Timing mode (Ntsc / Pal), which selects the 68000 clock and the frame length
    #[arg(long)]
    timing_mode: Option<TimingMode>,

    /// 68000 clock in Hz, overriding the timing mode's clock
    #[arg(long)]
    clock_hz: Option<u32>,

    /// Output sample rate in Hz
    #[arg(long)]
    output_frequency: Option<u32>,

    /// Disable 9-bit DAC quantization of carrier outputs
    #[arg(long, default_value_t)]
    no_quantize_output: bool,

    /// Disable emulation of the DAC ladder effect
    #[arg(long, default_value_t)]
    no_ladder_effect: bool,

    /// Status register busy flag behavior (Ym2612 / Ym3438 / AlwaysZero)
    #[arg(long)]
    busy_behavior: Option<Opn2BusyBehavior>,

    /// Write the chip's save state to this path after rendering
    #[arg(long)]
    save_state: Option<PathBuf>,
}

impl Args {
    fn ym2612_config(&self) -> anyhow::Result<Ym2612Config> {
        let mut config = match &self.config_path {
            Some(path) => read_config(path)?,
            None => Ym2612Config::default(),
        };

        if let Some(timing_mode) = self.timing_mode {
            config.timing_mode = timing_mode;
        }
        if let Some(clock_hz) = self.clock_hz {
            config.clock_hz_override = Some(clock_hz);
        }
        if let Some(output_frequency) = self.output_frequency {
            config.output_frequency = output_frequency;
        }
        if self.no_quantize_output {
            config.quantize_output = false;
        }
        if self.no_ladder_effect {
            config.emulate_ladder_effect = false;
        }
        if let Some(busy_behavior) = self.busy_behavior {
            config.busy_behavior = busy_behavior;
        }

        if config.output_frequency == 0 {
            anyhow::bail!("output frequency must be non-zero");
        }

        Ok(config)
    }
}

fn read_config(path: &Path) -> anyhow::Result<Ym2612Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Unable to read config file '{}'", path.display()))?;
    let config = toml::from_str(&config_str)
        .with_context(|| format!("Unable to parse config file '{}'", path.display()))?;

    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.ym2612_config()?;

    log::info!(
        "Rendering with timing mode {}, clock {} Hz, output frequency {} Hz, busy behavior {}",
        config.timing_mode,
        config.clock_hz(),
        config.output_frequency,
        config.busy_behavior
    );
    log::info!(
        "Quantize output: {}, emulate ladder effect: {}",
        config.quantize_output,
        config.emulate_ladder_effect
    );

    let script_str = fs::read_to_string(&args.script_path)
        .with_context(|| format!("Unable to read script '{}'", args.script_path.display()))?;
    let commands = script::parse(&script_str)
        .with_context(|| format!("Invalid script '{}'", args.script_path.display()))?;

    let mut ym2612 = Ym2612::new_from_config(&config);
    let samples = render(&mut ym2612, &commands, frame_cycles(&config));

    if args.raw {
        write_raw(&args.output_path, &samples)?;
    } else {
        write_wav(&args.output_path, &samples, config.output_frequency)?;
    }

    let sample_bytes = to_le_bytes(&samples);
    log::info!(
        "Wrote {} stereo samples ({:.3}s) to '{}', CRC32 {:08X}",
        samples.len() / 2,
        (samples.len() / 2) as f64 / f64::from(config.output_frequency),
        args.output_path.display(),
        CRC.checksum(&sample_bytes)
    );

    if let Some(save_state_path) = &args.save_state {
        let state = ym2612.save_state()?;
        fs::write(save_state_path, &state).with_context(|| {
            format!("Unable to write save state '{}'", save_state_path.display())
        })?;

        log::info!("Wrote {}-byte save state to '{}'", state.len(), save_state_path.display());
    }

    Ok(())
}

fn frame_cycles(config: &Ym2612Config) -> u32 {
    config.clock_hz() / config.timing_mode.frames_per_second()
}

fn render(ym2612: &mut Ym2612, commands: &[Command], frame_cycles: u32) -> Vec<i16> {
    let mut samples = Vec::new();

    for &command in commands {
        match command {
            Command::Write { port, value } => ym2612.write(port, value),
            Command::Wait { cycles } => run_cycles(ym2612, u64::from(cycles), &mut samples),
            Command::Frames { count } => {
                run_cycles(ym2612, u64::from(count) * u64::from(frame_cycles), &mut samples);
            }
        }
    }

    samples
}

fn run_cycles(ym2612: &mut Ym2612, mut cycles: u64, samples: &mut Vec<i16>) {
    while cycles != 0 {
        let scanline_cycles = cycles.min(M68K_CYCLES_PER_SCANLINE.into()) as u32;
        ym2612.advance(scanline_cycles);
        samples.extend(ym2612.take_buffer());
        cycles -= u64::from(scanline_cycles);
    }
}

fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().copied().flat_map(i16::to_le_bytes).collect()
}

fn write_raw(path: &Path, samples: &[i16]) -> anyhow::Result<()> {
    fs::write(path, to_le_bytes(samples))
        .with_context(|| format!("Unable to write raw PCM file '{}'", path.display()))
}

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Unable to create WAV file '{}'", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn silent_frames() {
        let config = Ym2612Config::default();
        let mut ym2612 = Ym2612::new_from_config(&config);

        let samples = render(&mut ym2612, &[Command::Frames { count: 2 }], frame_cycles(&config));
        // 1775 native samples => 1599 stereo output samples
        assert_eq!(2 * 1599, samples.len());
        assert!(samples.iter().all(|&sample| sample == 384));
    }

    #[test]
    fn scanline_chunks_match_single_advance() {
        let config = Ym2612Config::default();
        let script = script::parse(
            "w 0 0xB0\nw 1 0x07\nw 0 0xA4\nw 1 0x22\nw 0 0xA0\nw 1 0x9A\n\
             w 0 0x30\nw 1 0x01\nw 0 0x28\nw 1 0xF0\nwait 20000",
        )
        .unwrap();

        let mut chunked = Ym2612::new_from_config(&config);
        let chunked_samples = render(&mut chunked, &script, frame_cycles(&config));

        let mut whole = Ym2612::new_from_config(&config);
        for &command in &script {
            match command {
                Command::Write { port, value } => whole.write(port, value),
                Command::Wait { cycles } => whole.advance(cycles),
                Command::Frames { .. } => unreachable!("script has no frame commands"),
            }
        }

        assert_eq!(whole.take_buffer(), chunked_samples);
        assert_eq!(whole.native_sample_count(), chunked.native_sample_count());
    }

    #[test]
    fn pal_frames_are_longer() {
        let config = Ym2612Config { timing_mode: TimingMode::Pal, ..Ym2612Config::default() };
        assert_eq!(152_009, frame_cycles(&config));

        let config = Ym2612Config { clock_hz_override: Some(7_200_000), ..config };
        assert_eq!(144_000, frame_cycles(&config));
    }

    #[test]
    fn config_overrides() {
        let args = Args::parse_from([
            "ym2612-render",
            "-s",
            "song.txt",
            "-o",
            "song.wav",
            "--timing-mode",
            "pal",
            "--no-ladder-effect",
            "--busy-behavior",
            "ym3438",
        ]);
        let config = args.ym2612_config().unwrap();

        assert_eq!(TimingMode::Pal, config.timing_mode);
        assert!(!config.emulate_ladder_effect);
        assert!(config.quantize_output);
        assert_eq!(Opn2BusyBehavior::Ym3438, config.busy_behavior);
        assert_eq!(48_000, config.output_frequency);
    }
}
