use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_interval`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Interval is empty")]
    Empty,
    #[error("Invalid interval {0:?}: expected forms like 30s, 1m or 1h30m")]
    Invalid(String),
    #[error("Unknown unit {unit:?} in interval {input:?}")]
    UnknownUnit { input: String, unit: String },
    #[error("Interval {0:?} overflows")]
    Overflow(String),
    #[error("Interval must be greater than zero")]
    Zero,
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a polling interval such as `30s`, `1m`, `1h30m`, `1.5h` or `500ms`.
///
/// Every number needs a unit; valid units are `ns`, `us` (`µs`), `ms`, `s`,
/// `m` and `h`. Zero and negative intervals are rejected.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }
    let invalid = || IntervalError::Invalid(input.to_string());
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.starts_with('-') {
        return Err(IntervalError::Zero);
    }
    if s == "0" {
        return Err(IntervalError::Zero);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid());
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| IntervalError::UnknownUnit {
                input: input.to_string(),
                unit: unit.to_string(),
            })?;

        let nanos = scaled(number, scale).ok_or_else(invalid)?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| IntervalError::Overflow(input.to_string()))?;
        rest = tail;
    }

    if total == 0 {
        return Err(IntervalError::Zero);
    }
    let total = u64::try_from(total).map_err(|_| IntervalError::Overflow(input.to_string()))?;
    Ok(Duration::from_nanos(total))
}

/// `number * scale` in nanoseconds; fractional digits beyond nanosecond
/// precision are dropped.
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (number, ""),
    };
    if frac.contains('.') || (whole.is_empty() && frac.is_empty()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    let mut place = scale;
    for digit in frac.chars() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit.to_digit(10)?) * place)?;
    }
    Some(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_interval("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_interval("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_interval("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_interval("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_interval("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_interval("10ns"), Ok(Duration::from_nanos(10)));
    }

    #[test]
    fn test_compound() {
        assert_eq!(parse_interval("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_interval("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(
            parse_interval("1s500ms"),
            Ok(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_fractional() {
        assert_eq!(parse_interval("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_interval(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_interval("2.s"), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(parse_interval(" 1m "), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn test_rejects_zero_and_negative() {
        assert_eq!(parse_interval("0"), Err(IntervalError::Zero));
        assert_eq!(parse_interval("0s"), Err(IntervalError::Zero));
        assert_eq!(parse_interval("-1m"), Err(IntervalError::Zero));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse_interval(""), Err(IntervalError::Empty));
        assert!(matches!(parse_interval("10"), Err(IntervalError::Invalid(_))));
        assert!(matches!(parse_interval("m"), Err(IntervalError::Invalid(_))));
        assert!(matches!(parse_interval("1.2.3s"), Err(IntervalError::Invalid(_))));
        assert!(matches!(
            parse_interval("5d"),
            Err(IntervalError::UnknownUnit { unit, .. }) if unit == "d"
        ));
        assert!(matches!(
            parse_interval("1 m"),
            Err(IntervalError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            parse_interval("99999999999999999999h"),
            Err(IntervalError::Overflow(_)) | Err(IntervalError::Invalid(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_never_panics(input in "\\PC{0,32}") {
            let _ = parse_interval(&input);
        }

        #[test]
        fn prop_whole_seconds(secs in 1u64..1_000_000) {
            prop_assert_eq!(parse_interval(&format!("{secs}s")), Ok(Duration::from_secs(secs)));
        }

        #[test]
        fn prop_hours_minutes(h in 0u64..100, m in 1u64..60) {
            prop_assert_eq!(
                parse_interval(&format!("{h}h{m}m")),
                Ok(Duration::from_secs(h * 3600 + m * 60))
            );
        }
    }
}
