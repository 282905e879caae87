//! Linear conversion between raw register values and engineering units

use crate::constants::MAX_RAW_VALUE;

/// `scale * raw + deviation`, without clamping
pub fn convert_to_egu(scale: f64, deviation: f64, raw: u16) -> f64 {
    scale * f64::from(raw) + deviation
}

/// Inverse of [`convert_to_egu`], rounded half away from zero and clamped to `[0, 65535]`
///
/// A scale of zero has no inverse, in which case the EGU value itself is clamped and rounded.
/// NaN converts to 0.
pub fn convert_to_raw(scale: f64, deviation: f64, egu: f64) -> u16 {
    if scale == 0.0 {
        return saturate(egu.clamp(0.0, MAX_RAW_VALUE).round());
    }
    saturate(((egu - deviation) / scale).round())
}

/// Clamp an EGU value to the configured range, checking the maximum first
///
/// Unlike `f64::clamp` this never panics on a misconfigured range where `min > max`
pub fn clamp_egu(egu: f64, egu_min: f64, egu_max: f64) -> f64 {
    if egu > egu_max {
        egu_max
    } else if egu < egu_min {
        egu_min
    } else {
        egu
    }
}

fn saturate(value: f64) -> u16 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= MAX_RAW_VALUE {
        u16::MAX
    } else {
        value as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_raw_to_egu_linearly() {
        assert_eq!(convert_to_egu(2.0, 5.0, 10), 25.0);
        assert_eq!(convert_to_egu(0.5, -10.0, 0), -10.0);
        assert_eq!(convert_to_egu(1.0, 0.0, u16::MAX), 65535.0);
    }

    #[test]
    fn raw_conversion_saturates_at_both_ends() {
        assert_eq!(convert_to_raw(2.0, 5.0, -100.0), 0);
        assert_eq!(convert_to_raw(2.0, 5.0, 1e9), 65535);
        assert_eq!(convert_to_raw(2.0, 5.0, f64::NAN), 0);
        assert_eq!(convert_to_raw(2.0, 5.0, f64::INFINITY), 65535);
    }

    #[test]
    fn round_trips_through_egu() {
        for raw in [0u16, 1, 7, 1000, 32767, 65535] {
            let egu = convert_to_egu(2.0, 5.0, raw);
            assert_eq!(convert_to_raw(2.0, 5.0, egu), raw);
        }
    }

    #[test]
    fn egu_lands_within_half_a_step_after_conversion() {
        // scale, deviation, value
        for (scale, deviation, egu) in [
            (1.0, 0.0, 10.3),
            (1.0, 0.0, 1000.7),
            (2.0, 5.0, 99.9),
            (0.25, -10.0, 3.1),
            (0.1, -50.0, -12.34),
            (0.01, -273.15, -250.005),
        ] {
            let raw = convert_to_raw(scale, deviation, egu);
            let back = convert_to_egu(scale, deviation, raw);
            assert!(
                (back - egu).abs() <= scale / 2.0 + 1e-9,
                "{egu} came back as {back} with scale {scale} and deviation {deviation}"
            );
        }
    }

    #[test]
    fn clamped_egu_lands_within_half_a_step_after_conversion() {
        // scale, deviation, min, max, value
        for (scale, deviation, min, max, egu) in [
            (0.5, -20.0, -20.0, 100.0, 250.3),
            (0.5, -20.0, -20.0, 100.0, -75.0),
            (0.1, -50.0, -40.0, 40.0, 17.77),
        ] {
            let clamped = clamp_egu(egu, min, max);
            let back = convert_to_egu(scale, deviation, convert_to_raw(scale, deviation, clamped));
            assert!((min..=max).contains(&clamped));
            assert!((back - clamped).abs() <= scale / 2.0 + 1e-9);
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // (10 - 5) / 2 == 2.5
        assert_eq!(convert_to_raw(2.0, 5.0, 10.0), 3);
        // (8 - 5) / 2 == 1.5
        assert_eq!(convert_to_raw(2.0, 5.0, 8.0), 2);
        assert_eq!(convert_to_raw(1.0, 0.0, 0.49), 0);
    }

    #[test]
    fn zero_scale_clamps_the_egu_value() {
        assert_eq!(convert_to_raw(0.0, 5.0, 12.5), 13);
        assert_eq!(convert_to_raw(0.0, 5.0, -3.0), 0);
        assert_eq!(convert_to_raw(0.0, 5.0, 70000.0), 65535);
    }

    #[test]
    fn clamps_egu_to_configured_range() {
        assert_eq!(clamp_egu(120.0, 0.0, 100.0), 100.0);
        assert_eq!(clamp_egu(-1.0, 0.0, 100.0), 0.0);
        assert_eq!(clamp_egu(42.0, 0.0, 100.0), 42.0);
        // inverted range doesn't panic
        assert_eq!(clamp_egu(42.0, 100.0, 0.0), 0.0);
    }
}
