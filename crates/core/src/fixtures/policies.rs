//! Discount Policy Fixtures

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::fixtures::FixtureError;

/// Wrapper for a discount policy in YAML
#[derive(Debug, Deserialize)]
pub struct PolicyFixture {
    /// Map of product key -> discount ceiling (e.g. "25%")
    pub ceilings: FxHashMap<String, String>,
}

/// Parse a ceiling string (e.g. "25%" or "25") into percent points
///
/// Accepts the value with or without a trailing percent sign; both mean
/// the same number of percent points.
///
/// # Errors
///
/// Returns an error if the value cannot be parsed as a decimal.
pub fn parse_percent_points(s: &str) -> Result<Decimal, FixtureError> {
    let trimmed = s.trim();
    let digits = trimmed.strip_suffix('%').unwrap_or(trimmed);

    digits
        .trim()
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn policy_fixture_parses_ceiling_map() -> TestResult {
        let yaml = r#"
ceilings:
  platform: 25%
  archive: "10"
"#;
        let fixture: PolicyFixture = serde_norway::from_str(yaml)?;

        assert_eq!(fixture.ceilings.len(), 2);
        assert_eq!(
            fixture.ceilings.get("platform").map(String::as_str),
            Some("25%")
        );

        Ok(())
    }

    #[test]
    fn parse_percent_points_accepts_percent_suffix() -> Result<(), FixtureError> {
        assert_eq!(parse_percent_points("25%")?, Decimal::from(25));

        Ok(())
    }

    #[test]
    fn parse_percent_points_accepts_bare_numbers() -> Result<(), FixtureError> {
        assert_eq!(parse_percent_points("12.5")?, Decimal::new(125, 1));

        Ok(())
    }

    #[test]
    fn parse_percent_points_handles_whitespace() -> Result<(), FixtureError> {
        assert_eq!(parse_percent_points("  25 % ")?, Decimal::from(25));

        Ok(())
    }

    #[test]
    fn parse_percent_points_rejects_invalid_format() {
        let result = parse_percent_points("one quarter");

        assert!(matches!(result, Err(FixtureError::InvalidPercentage(_))));
    }
}
