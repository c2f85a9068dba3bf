//! KPI normalization.
//!
//! Linear maps of a raw value onto `[0, 1]` over the range of values seen
//! among competing offers.

use crate::error::KpiError;

const SNAP: f64 = 1e-6;

/// Increasing score: `min` maps to 0, `max` to 1.
///
/// A degenerate range scores 1. Values outside `[min, max]` are an error.
pub fn increasing(value: f64, min: f64, max: f64) -> Result<f64, KpiError> {
    if max == min {
        return Ok(1.0);
    }
    if value > max || value < min {
        return Err(KpiError::OutOfRange { value, min, max });
    }
    if (value - min).abs() < SNAP {
        return Ok(0.0);
    }
    if (value - max).abs() < SNAP {
        return Ok(1.0);
    }
    Ok((value - min) / (max - min))
}

/// Decreasing score: `min` maps to 1, `max` to 0.
///
/// A degenerate range scores 1. Values outside `[min, max]` are an error.
pub fn decreasing(value: f64, min: f64, max: f64) -> Result<f64, KpiError> {
    if max == min {
        return Ok(1.0);
    }
    increasing(value, min, max).map(|score| 1.0 - score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(0.0, 0.0, 10.0, 0.0 ; "min")]
    #[test_case(10.0, 0.0, 10.0, 1.0 ; "max")]
    #[test_case(2.5, 0.0, 10.0, 0.25 ; "quarter")]
    #[test_case(5.0, 5.0, 5.0, 1.0 ; "degenerate range")]
    #[test_case(3e-7, 0.0, 10.0, 0.0 ; "snaps to min")]
    fn increasing_scores(value: f64, min: f64, max: f64, expected: f64) {
        assert_eq!(increasing(value, min, max), Ok(expected));
    }

    #[test_case(0.0, 0.0, 10.0, 1.0 ; "min")]
    #[test_case(10.0, 0.0, 10.0, 0.0 ; "max")]
    #[test_case(2.5, 0.0, 10.0, 0.75 ; "quarter")]
    #[test_case(5.0, 5.0, 5.0, 1.0 ; "degenerate range")]
    fn decreasing_scores(value: f64, min: f64, max: f64, expected: f64) {
        assert_eq!(decreasing(value, min, max), Ok(expected));
    }

    #[test_case(-1.0 ; "below")]
    #[test_case(11.0 ; "above")]
    fn out_of_range_is_an_error(value: f64) {
        let err = KpiError::OutOfRange {
            value,
            min: 0.0,
            max: 10.0,
        };
        assert_eq!(increasing(value, 0.0, 10.0), Err(err));
        assert_eq!(decreasing(value, 0.0, 10.0), Err(err));
    }

    #[test]
    fn degenerate_range_wins_over_range_check() {
        assert_eq!(increasing(7.0, 3.0, 3.0), Ok(1.0));
        assert_eq!(decreasing(7.0, 3.0, 3.0), Ok(1.0));
    }

    proptest! {
        #[test]
        fn scores_stay_in_unit_interval(a in -1e6f64..1e6, b in -1e6f64..1e6, t in 0.0f64..=1.0) {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let value = (min + t * (max - min)).clamp(min, max);
            let up = increasing(value, min, max).expect("in range");
            let down = decreasing(value, min, max).expect("in range");
            prop_assert!((0.0..=1.0).contains(&up));
            prop_assert!((0.0..=1.0).contains(&down));
            if min != max {
                prop_assert!((up + down - 1.0).abs() < 1e-9);
            }
        }
    }
}
