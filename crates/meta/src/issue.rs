use crate::error::{Error, ErrorKind};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Longest decimal fraction accepted ("12.123456789").
const MAX_DECIMAL_PLACES: u32 = 9;

/// An issue number as a rational: "12", "12.5", "1/2", "½", "-1".
///
/// Equality and ordering compare values, so "012" == "12" and "12.50" ==
/// "12.5". Display writes the canonical form: no leading zeros, no trailing
/// fractional zeros, fractions kept as fractions.
#[derive(Debug, Clone, Copy)]
pub struct IssueNumber {
    numerator: i64,
    denominator: u64,
    written_as_fraction: bool,
}

impl IssueNumber {
    pub fn whole(number: i64) -> Self {
        Self { numerator: number, denominator: 1, written_as_fraction: false }
    }

    fn reduced(numerator: i64, denominator: u64, written_as_fraction: bool) -> Self {
        let divisor = gcd(numerator.unsigned_abs(), denominator).max(1);
        Self {
            numerator: numerator / divisor as i64,
            denominator: denominator / divisor,
            written_as_fraction,
        }
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    pub fn is_whole(&self) -> bool {
        self.denominator == 1
    }

    /// Decimal places needed to write the value exactly, if it has a
    /// terminating decimal expansion.
    fn decimal_places(&self) -> Option<u32> {
        (0..=MAX_DECIMAL_PLACES).find(|&places| 10u64.pow(places) % self.denominator == 0)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn vulgar_fraction(c: char) -> Option<(i64, u64)> {
    Some(match c {
        '½' => (1, 2),
        '¼' => (1, 4),
        '¾' => (3, 4),
        '⅓' => (1, 3),
        '⅔' => (2, 3),
        _ => return None,
    })
}

impl FromStr for IssueNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ErrorKind::parse("issue_number", s);
        let text = s.trim().trim_start_matches('#').trim();
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next())
            && let Some((numerator, denominator)) = vulgar_fraction(c)
        {
            return Ok(Self::reduced(numerator, denominator, true));
        }
        if let Some((numerator, denominator)) = text.split_once('/') {
            let numerator: i64 = numerator.trim().parse().map_err(|_| invalid())?;
            let denominator: u64 = denominator.trim().parse().map_err(|_| invalid())?;
            if denominator == 0 {
                exn::bail!(invalid());
            }
            return Ok(Self::reduced(numerator, denominator, true));
        }
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
            exn::bail!(invalid());
        }
        let fraction = fraction.trim_end_matches('0');
        let places = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        if places > MAX_DECIMAL_PLACES {
            exn::bail!(invalid());
        }
        let scale = 10i64.pow(places);
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = if fraction.is_empty() { 0 } else { fraction.parse().map_err(|_| invalid())? };
        let magnitude = whole.checked_mul(scale).and_then(|w| w.checked_add(fraction)).ok_or_else(invalid)?;
        let numerator = if negative { -magnitude } else { magnitude };
        Ok(Self::reduced(numerator, scale as u64, false))
    }
}

impl Display for IssueNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.denominator == 1 {
            return write!(f, "{}", self.numerator);
        }
        match self.decimal_places() {
            Some(places) if !self.written_as_fraction => {
                let scale = 10u64.pow(places);
                let scaled = self.numerator.unsigned_abs() * (scale / self.denominator);
                let sign = if self.numerator < 0 { "-" } else { "" };
                write!(f, "{sign}{}.{:0width$}", scaled / scale, scaled % scale, width = places as usize)
            },
            _ => write!(f, "{}/{}", self.numerator, self.denominator),
        }
    }
}

impl PartialEq for IssueNumber {
    fn eq(&self, other: &Self) -> bool {
        self.numerator == other.numerator && self.denominator == other.denominator
    }
}
impl Eq for IssueNumber {}

impl PartialOrd for IssueNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IssueNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = i128::from(self.numerator) * i128::from(other.denominator);
        let right = i128::from(other.numerator) * i128::from(self.denominator);
        left.cmp(&right)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for IssueNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12", "12")]
    #[case("001", "1")]
    #[case("#7", "7")]
    #[case("12.5", "12.5")]
    #[case("12.50", "12.5")]
    #[case("0.25", "0.25")]
    #[case("1/2", "1/2")]
    #[case("2/4", "1/2")]
    #[case("½", "1/2")]
    #[case("-1", "-1")]
    #[case("-0.5", "-0.5")]
    #[case(" 3 ", "3")]
    fn canonical_form(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(input.parse::<IssueNumber>().unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("12a")]
    #[case("one")]
    #[case("1/0")]
    #[case("1.2.3")]
    #[case(".5")]
    fn rejects(#[case] input: &str) {
        assert!(input.parse::<IssueNumber>().is_err());
    }

    #[test]
    fn compares_by_value() {
        let parse = |s: &str| s.parse::<IssueNumber>().unwrap();
        assert_eq!(parse("012"), parse("12"));
        assert_eq!(parse("0.5"), parse("1/2"));
        assert!(parse("12") < parse("12.5"));
        assert!(parse("-1") < parse("0"));
        assert!(parse("½").denominator() == 2 && !parse("½").is_whole());
    }
}
