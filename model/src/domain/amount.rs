use nutype::nutype;

/// A monetary amount offered by a bidder; non-finite and non-positive
/// values are unrepresentable.
#[nutype(
    derive(Debug, Clone, Copy, PartialEq),
    validate(finite, greater = 0.0)
)]
pub struct Amount(f64);

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        zero = { 0.0 },
        negative = { -1.0 },
        nan = { f64::NAN },
        infinite = { f64::INFINITY },
    )]
    fn test_rejects(raw: f64) {
        assert!(Amount::try_new(raw).is_err());
    }

    #[test]
    fn test_accepts_positive_finite() {
        assert_eq!(Amount::try_new(20.5).unwrap().into_inner(), 20.5);
    }
}
