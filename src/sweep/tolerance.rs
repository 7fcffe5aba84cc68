//! Pass/fail judgement of a measured value against its expected value.

/// Absolute margin used when the expected value is exactly zero.
pub const ZERO_EXPECTED_MARGIN: f64 = 0.02;

/// Whether `measured` lies within `tolerance_percent` of `expected`.
///
/// A relative window around zero is empty, so an expected value of exactly zero is
/// judged against [`ZERO_EXPECTED_MARGIN`] instead. Non-finite readings never pass.
pub fn within_tolerance(expected: f64, measured: f64, tolerance_percent: f64) -> bool {
    if !measured.is_finite() {
        return false;
    }
    if expected == 0.0 {
        measured.abs() <= ZERO_EXPECTED_MARGIN
    } else {
        (measured - expected).abs() <= expected.abs() * tolerance_percent / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_expected_uses_absolute_margin() {
        assert!(within_tolerance(0.0, 0.02, 15.0));
        assert!(within_tolerance(0.0, -0.019, 1.0));
        assert!(!within_tolerance(0.0, 0.021, 99.0));
    }

    #[test]
    fn relative_window() {
        assert!(within_tolerance(1000.0, 1150.0, 15.0));
        assert!(within_tolerance(1000.0, 850.0, 15.0));
        assert!(!within_tolerance(1000.0, 1151.0, 15.0));
        assert!(within_tolerance(-2.0, -2.2, 15.0));
        assert!(!within_tolerance(2.0, -2.0, 15.0));
    }

    #[test]
    fn sentinels_fail() {
        assert!(!within_tolerance(100.0, -1.0, 15.0));
        assert!(!within_tolerance(100.0, f64::NAN, 15.0));
        assert!(!within_tolerance(1e37, f64::INFINITY, 15.0));
    }
}
