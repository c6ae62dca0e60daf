use test_log::test;
use ym2612_core::{M68K_CYCLES_PER_SAMPLE, SaveStateError, TimingMode, Ym2612, Ym2612Config};

fn write(ym2612: &mut Ym2612, register: u8, value: u8) {
    ym2612.write(0, register);
    ym2612.write(1, value);
}

// Channel 1 algorithm 5 with feedback, vibrato, tremolo, and a slow decay, plus a running timer
fn busy_chip() -> Ym2612 {
    let mut ym2612 = Ym2612::new(TimingMode::Ntsc.m68k_clock_hz(), 44_100);
    write(&mut ym2612, 0x22, 0x0B);
    write(&mut ym2612, 0xB0, 0x2D);
    write(&mut ym2612, 0xB4, 0xF5);
    write(&mut ym2612, 0xA4, 0x22);
    write(&mut ym2612, 0xA0, 0x9A);
    for offset in [0x0, 0x4, 0x8, 0xC] {
        write(&mut ym2612, 0x30 + offset, 0x32);
        write(&mut ym2612, 0x40 + offset, 0x08);
        write(&mut ym2612, 0x50 + offset, 0x9C);
        write(&mut ym2612, 0x60 + offset, 0x85);
        write(&mut ym2612, 0x70 + offset, 0x03);
        write(&mut ym2612, 0x80 + offset, 0x57);
    }
    write(&mut ym2612, 0x26, 0xC0);
    write(&mut ym2612, 0x27, 0x0A);
    write(&mut ym2612, 0x28, 0xF0);
    ym2612
}

#[test]
fn round_trip_continues_identically() {
    let frame_cycles = TimingMode::Ntsc.m68k_cycles_per_frame();

    let mut original = busy_chip();
    original.advance(frame_cycles + 77);
    let _ = original.take_buffer();

    let state = original.save_state().unwrap();

    let mut restored = Ym2612::new(TimingMode::Ntsc.m68k_clock_hz(), 44_100);
    restored.load_state(&state).unwrap();
    assert_eq!(state, restored.save_state().unwrap());
    assert_eq!(original.native_sample_count(), restored.native_sample_count());
    assert_eq!(original.timer_b_overflowed(), restored.timer_b_overflowed());

    original.advance(frame_cycles);
    restored.advance(frame_cycles);

    let expected = original.take_buffer();
    assert!(!expected.is_empty());
    assert_eq!(expected, restored.take_buffer());
}

#[test]
fn buffered_samples_are_not_saved() {
    let mut ym2612 = busy_chip();
    ym2612.advance(10_000);
    let state = ym2612.save_state().unwrap();

    let mut restored = Ym2612::new(TimingMode::Ntsc.m68k_clock_hz(), 44_100);
    restored.load_state(&state).unwrap();
    assert!(restored.take_buffer().is_empty());
    assert!(!ym2612.take_buffer().is_empty());
}

#[test]
fn load_keeps_host_output_settings() {
    let mut ym2612 = busy_chip();
    ym2612.advance(10_000);
    let state = ym2612.save_state().unwrap();

    // Ladder effect off: muting channel 1 makes the output exactly 0
    let mut restored = Ym2612::new_from_config(&Ym2612Config {
        output_frequency: 44_100,
        emulate_ladder_effect: false,
        ..Ym2612Config::default()
    });
    restored.load_state(&state).unwrap();
    write(&mut restored, 0xB4, 0x00);

    restored.advance(10_000);
    assert!(restored.take_buffer().iter().all(|&sample| sample == 0));
}

#[test]
fn load_keeps_host_timing() {
    // Whole native samples only, so the loaded chip has no leftover 68000 cycles
    let mut ym2612 = busy_chip();
    ym2612.advance(1000 * M68K_CYCLES_PER_SAMPLE);
    let _ = ym2612.take_buffer();
    let state = ym2612.save_state().unwrap();

    let mut pal = Ym2612::new(TimingMode::Pal.m68k_clock_hz(), 48_000);
    pal.load_state(&state).unwrap();
    assert_eq!(48_000, pal.output_frequency());
    assert_eq!(TimingMode::Pal.m68k_clock_hz() / M68K_CYCLES_PER_SAMPLE, pal.native_frequency());
    assert_eq!(ym2612.native_sample_count(), pal.native_sample_count());

    // 1055 native samples at 52781 Hz resampled to 48000 Hz
    pal.advance(TimingMode::Pal.m68k_cycles_per_frame());
    assert_eq!(2 * 959, pal.take_buffer().len());
}

#[test]
fn failed_load_leaves_chip_unmodified() {
    let mut source = busy_chip();
    source.advance(5_000);
    let state = source.save_state().unwrap();

    let mut ym2612 = Ym2612::new(TimingMode::Ntsc.m68k_clock_hz(), 44_100);
    ym2612.advance(1_000);
    let before = ym2612.save_state().unwrap();

    let mut wrong_version = state.clone();
    wrong_version[0] = 0xFF;
    assert!(matches!(
        ym2612.load_state(&wrong_version),
        Err(SaveStateError::UnsupportedVersion { found: 0xFF, .. })
    ));
    assert_eq!(before, ym2612.save_state().unwrap());

    assert!(matches!(
        ym2612.load_state(&state[..state.len() - 1]),
        Err(SaveStateError::Truncated { .. })
    ));
    assert!(matches!(ym2612.load_state(&[]), Err(SaveStateError::Truncated { .. })));
    assert_eq!(before, ym2612.save_state().unwrap());
}
