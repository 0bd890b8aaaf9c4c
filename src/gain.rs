/// Lowest gain the mixer accepts, meaning silence
pub const GAIN_FLOOR_DB: f64 = -100.0;

const CURVE_SCALE_DB: f64 = -6.75;
const CURVE_OCTAVES: f64 = 4.0;

/// Convert a volume fraction into the mixer's dB unit.
///
/// The curve is `(2^((1 - x) * 4) - 1) * -6.75`, floored at -100 dB:
/// 100% is 0 dB, 75% is -6.75 dB, 50% is -20.25 dB, 25% is -47.25 dB and
/// 0% lands below the floor. Callers clamp the fraction first with
/// [`clamp_fraction`].
pub fn gain(fraction: f64) -> f64 {
    let db = ((1.0 - fraction) * CURVE_OCTAVES).exp2() - 1.0;
    (db * CURVE_SCALE_DB).max(GAIN_FLOOR_DB)
}

/// Clamp a requested volume into `[0, 1]`; NaN counts as 0.
pub fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn full_volume_is_zero_db() {
        assert_eq!(gain(1.0), 0.0);
    }

    #[test]
    fn silence_is_clamped_to_floor() {
        assert_eq!(gain(0.0), GAIN_FLOOR_DB);
    }

    #[test]
    fn matches_slider_checkpoints() {
        assert!(close(gain(0.75), -6.75));
        assert!(close(gain(0.5), -20.25));
        assert!(close(gain(0.25), -47.25));
    }

    #[test]
    fn decreasing_volume_never_raises_gain() {
        let mut previous = gain(1.0);
        for step in (0..=100).rev() {
            let current = gain(step as f64 / 100.0);
            assert!(current <= previous, "gain rose at {}%", step);
            assert!(current >= GAIN_FLOOR_DB);
            previous = current;
        }
    }

    #[test]
    fn clamps_out_of_range_fractions() {
        assert_eq!(clamp_fraction(-0.3), 0.0);
        assert_eq!(clamp_fraction(1.7), 1.0);
        assert_eq!(clamp_fraction(0.42), 0.42);
        assert_eq!(clamp_fraction(f64::NAN), 0.0);
        assert_eq!(clamp_fraction(f64::INFINITY), 1.0);
        assert_eq!(clamp_fraction(f64::NEG_INFINITY), 0.0);
    }
}
