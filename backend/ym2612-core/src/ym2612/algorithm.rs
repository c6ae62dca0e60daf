//! YM2612 operator routing: the 8 fixed connections between a channel's 4 operators

use crate::ym2612::operator::FmOperator;

// Carrier outputs are signed 14-bit, and multi-carrier sums are clamped after every addition.
// With 9-bit quantization the limits are the largest multiples of 32 in range, biased by the
// DAC's asymmetric negative step
const QUANTIZED_OUTPUT_MIN: i32 = -0x1FF0;
const QUANTIZED_OUTPUT_MAX: i32 = 0x1FE0;
const OUTPUT_MIN: i32 = -0x2000;
const OUTPUT_MAX: i32 = 0x1FFF;

// Simulate a 9-bit DAC by masking out the lowest 5 bits of the 14-bit carrier outputs
const QUANTIZATION_MASK: i16 = !((1 << 5) - 1);

#[derive(Debug, Clone, Copy)]
pub(super) struct Quantization {
    mask: i16,
    min: i32,
    max: i32,
}

impl Quantization {
    pub(super) fn new(quantize_output: bool) -> Self {
        if quantize_output {
            Self { mask: QUANTIZATION_MASK, min: QUANTIZED_OUTPUT_MIN, max: QUANTIZED_OUTPUT_MAX }
        } else {
            Self { mask: !0, min: OUTPUT_MIN, max: OUTPUT_MAX }
        }
    }
}

/// Clock all 4 operators in the algorithm's evaluation order and return the channel's sample.
///
/// Algorithms 0-3 evaluate operators in order 1, 2, 3, 4; algorithms 4-7 evaluate them in order
/// 1, 3, 2, 4. Modulator outputs are halved before being applied as phase modulation.
#[inline]
pub(super) fn generate_sample(
    operators: &mut [FmOperator; 4],
    algorithm: u8,
    feedback_level: u8,
    am_attenuation: u16,
    quantization: Quantization,
) -> i16 {
    let Quantization { mask, min, max } = quantization;

    macro_rules! carrier_sum {
        ($first:expr $(, $carrier:expr)*) => {
            {
                let mut sum = i32::from($first & mask);
                $(sum = (sum + i32::from($carrier & mask)).clamp(min, max);)*
                sum as i16
            }
        }
    }

    let op1_feedback = operators[0].feedback(feedback_level);
    let [o1, o2, o3, o4] = operators;

    match algorithm & 7 {
        0 => {
            // O1 -> O2 -> O3 -> O4 -> Output
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let m2 = o2.sample_clock(i32::from(m1) >> 1, am_attenuation);
            let m3 = o3.sample_clock(i32::from(m2) >> 1, am_attenuation);
            let c4 = o4.sample_clock(i32::from(m3) >> 1, am_attenuation);

            c4 & mask
        }
        1 => {
            // O1 --|
            //      --> O3 -> O4 -> Output
            // O2 --|
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let m2 = o2.sample_clock(0, am_attenuation);
            let m3 = o3.sample_clock((i32::from(m1) + i32::from(m2)) >> 1, am_attenuation);
            let c4 = o4.sample_clock(i32::from(m3) >> 1, am_attenuation);

            c4 & mask
        }
        2 => {
            //       O1 --|
            //            --> O4 -> Output
            // O2 -> O3 --|
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let m2 = o2.sample_clock(0, am_attenuation);
            let m3 = o3.sample_clock(i32::from(m2) >> 1, am_attenuation);
            let c4 = o4.sample_clock((i32::from(m1) + i32::from(m3)) >> 1, am_attenuation);

            c4 & mask
        }
        3 => {
            // O1 -> O2 --|
            //            --> O4 -> Output
            //       O3 --|
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let m2 = o2.sample_clock(i32::from(m1) >> 1, am_attenuation);
            let m3 = o3.sample_clock(0, am_attenuation);
            let c4 = o4.sample_clock((i32::from(m2) + i32::from(m3)) >> 1, am_attenuation);

            c4 & mask
        }
        4 => {
            // O1 -> O2 --|
            //            --> Output
            // O3 -> O4 --|
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let m3 = o3.sample_clock(0, am_attenuation);
            let c2 = o2.sample_clock(i32::from(m1) >> 1, am_attenuation);
            let c4 = o4.sample_clock(i32::from(m3) >> 1, am_attenuation);

            carrier_sum!(c2, c4)
        }
        5 => {
            //      --> O2 --|
            //      |        |
            // O1 --|-> O3 ----> Output
            //      |        |
            //      --> O4 --|
            let m1 = i32::from(o1.sample_clock(op1_feedback, am_attenuation)) >> 1;
            let c3 = o3.sample_clock(m1, am_attenuation);
            let c2 = o2.sample_clock(m1, am_attenuation);
            let c4 = o4.sample_clock(m1, am_attenuation);

            carrier_sum!(c2, c3, c4)
        }
        6 => {
            // O1 --> O2 --|
            //             |
            //        O3 ----> Output
            //             |
            //        O4 --|
            let m1 = o1.sample_clock(op1_feedback, am_attenuation);
            let c3 = o3.sample_clock(0, am_attenuation);
            let c2 = o2.sample_clock(i32::from(m1) >> 1, am_attenuation);
            let c4 = o4.sample_clock(0, am_attenuation);

            carrier_sum!(c2, c3, c4)
        }
        7 => {
            // O1 --|
            //      |
            // O2 --|
            //      --> Output
            // O3 --|
            //      |
            // O4 --|
            let c1 = o1.sample_clock(op1_feedback, am_attenuation);
            let c3 = o3.sample_clock(0, am_attenuation);
            let c2 = o2.sample_clock(0, am_attenuation);
            let c4 = o4.sample_clock(0, am_attenuation);

            carrier_sum!(c1, c2, c3, c4)
        }
        _ => unreachable!("value & 7 is always <= 7"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn keyed_operators() -> [FmOperator; 4] {
        std::array::from_fn(|_| {
            let mut operator = FmOperator::default();
            operator.envelope.attack_rate = 31;
            operator.phase.multiple = 1;
            operator.update_increment(0x29A, 4);
            operator.write_key_latch(true);
            operator
        })
    }

    #[test]
    fn silent_operators_output_zero() {
        for algorithm in 0..8 {
            let mut operators: [FmOperator; 4] = std::array::from_fn(|_| FmOperator::default());
            for _ in 0..10 {
                let sample =
                    generate_sample(&mut operators, algorithm, 7, 0, Quantization::new(true));
                assert_eq!(0, sample, "algorithm {algorithm}");
            }
        }
    }

    #[test]
    fn quantized_output_is_9_bit() {
        for algorithm in 0..8 {
            let mut operators = keyed_operators();
            for _ in 0..200 {
                for operator in &mut operators {
                    operator.phase.clock(operator.phase.increment());
                }

                let sample =
                    generate_sample(&mut operators, algorithm, 0, 0, Quantization::new(true));
                assert_eq!(0, sample & 0x1F, "algorithm {algorithm}");
                assert!(
                    (QUANTIZED_OUTPUT_MIN..=QUANTIZED_OUTPUT_MAX).contains(&i32::from(sample)),
                    "algorithm {algorithm}: {sample}"
                );
            }
        }
    }

    #[test]
    fn four_carriers_clamp() {
        // All 4 carriers at full volume and phase 0x0FF produce 4 * 8168, far above the limit
        let mut operators = keyed_operators();
        for operator in &mut operators {
            for _ in 0..0x100 {
                operator.phase.clock(0x3FF);
            }
        }

        let sample = generate_sample(&mut operators, 7, 0, 0, Quantization::new(true));
        assert_eq!(QUANTIZED_OUTPUT_MAX as i16, sample);

        let mut operators = keyed_operators();
        for operator in &mut operators {
            for _ in 0..0x100 {
                operator.phase.clock(0x3FF);
            }
        }

        let sample = generate_sample(&mut operators, 7, 0, 0, Quantization::new(false));
        assert_eq!(OUTPUT_MAX as i16, sample);
    }

    // Operators 1 and 2 at phase 0x0FF (+8168), operator 3 at phase 0x2FF (-8168), operator 4 muted
    fn mixed_sign_carriers() -> [FmOperator; 4] {
        let mut operators = keyed_operators();
        for (operator, clocks) in operators.iter_mut().zip([0x100, 0x100, 0x300]) {
            for _ in 0..clocks {
                operator.phase.clock(0x3FF);
            }
        }
        operators[3] = FmOperator::default();
        operators
    }

    #[test]
    fn carriers_clamp_after_each_addition() {
        // 8160 + 8160 clamps to 8160 before -8192 is added; clamping only the final sum would
        // give 8128
        let sample =
            generate_sample(&mut mixed_sign_carriers(), 7, 0, 0, Quantization::new(true));
        assert_eq!(-32, sample);

        // Unquantized: 8168 + 8168 clamps to 8191, then -8168
        let sample =
            generate_sample(&mut mixed_sign_carriers(), 7, 0, 0, Quantization::new(false));
        assert_eq!(23, sample);
    }
}
