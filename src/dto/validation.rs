//! Validation helpers for DTOs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::ValidationError;

/// Score value as submitted by a form: either a JSON number or numeric text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    Number(serde_json::Number),
    Text(String),
}

impl From<i64> for RawScore {
    fn from(value: i64) -> Self {
        RawScore::Number(value.into())
    }
}

impl From<&str> for RawScore {
    fn from(value: &str) -> Self {
        RawScore::Text(value.to_owned())
    }
}

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Require a non-blank text field, returning it trimmed.
pub fn require_text(field: &str, value: Option<&str>) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_owned()),
        _ => Err(error("required", format!("{field} is required"))),
    }
}

/// Require a field that parses into one of the variants of `T`.
pub fn require_variant<T>(field: &str, value: Option<&str>) -> Result<T, ValidationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = require_text(field, value)?;
    text.parse::<T>()
        .map_err(|err| error("unknown_variant", err.to_string()))
}

/// Parse a score into an integer. Fractional values are rejected.
///
/// # Examples
///
/// ```ignore
/// parse_score(&RawScore::from("10"))   // Ok(10)
/// parse_score(&RawScore::from("-3.0")) // Ok(-3)
/// parse_score(&RawScore::from("2.5"))  // Err - fractional
/// parse_score(&RawScore::from("ten"))  // Err - not a number
/// ```
pub fn parse_score(raw: &RawScore) -> Result<i64, ValidationError> {
    let not_integer = || error("score_format", "score must be a whole number".to_owned());

    match raw {
        RawScore::Number(number) => match number.as_i64() {
            Some(value) => Ok(value),
            None => number.as_f64().and_then(integral).ok_or_else(not_integer),
        },
        RawScore::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(error("required", "score is required".to_owned()));
            }
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
                .ok_or_else(not_integer)
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_007_199_254_740_992.0;
    (value.is_finite() && value.fract() == 0.0 && value.abs() <= LIMIT).then_some(value as i64)
}

/// Validates a `#rgb`, `#rrggbb` or `#rrggbbaa` hex color.
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let digits = color.strip_prefix('#').unwrap_or_default();
    let valid_length = matches!(digits.len(), 3 | 6 | 8);
    if !color.starts_with('#') || !valid_length || !digits.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(error(
            "color_format",
            format!("color `{color}` must be a hex value such as #ef4444"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::Category;

    #[test]
    fn test_parse_score_accepts_whole_numbers() {
        assert_eq!(parse_score(&RawScore::from("10")), Ok(10));
        assert_eq!(parse_score(&RawScore::from(" -4 ")), Ok(-4));
        assert_eq!(parse_score(&RawScore::from("0")), Ok(0));
        assert_eq!(parse_score(&RawScore::from("7.0")), Ok(7));
        assert_eq!(parse_score(&RawScore::from(15)), Ok(15));
    }

    #[test]
    fn test_parse_score_rejects_non_integers() {
        assert!(parse_score(&RawScore::from("2.5")).is_err());
        assert!(parse_score(&RawScore::from("ten")).is_err());
        assert!(parse_score(&RawScore::from("")).is_err());
        assert!(parse_score(&RawScore::from("NaN")).is_err());
        let fractional: RawScore = serde_json::from_str("1.5").unwrap();
        assert!(parse_score(&fractional).is_err());
    }

    #[test]
    fn test_require_text_trims_and_rejects_blank() {
        assert_eq!(require_text("name", Some("  A ")), Ok("A".to_owned()));
        assert!(require_text("name", Some("   ")).is_err());
        assert!(require_text("name", None).is_err());
    }

    #[test]
    fn test_require_variant_parses_enums() {
        assert_eq!(
            require_variant::<Category>("category", Some("Arts")),
            Ok(Category::Arts)
        );
        assert!(require_variant::<Category>("category", Some("Music")).is_err());
    }

    #[test]
    fn test_validate_color() {
        assert!(validate_color("#ef4444").is_ok());
        assert!(validate_color("#FFF").is_ok());
        assert!(validate_color("ef4444").is_err()); // missing hash
        assert!(validate_color("#ef44").is_err()); // bad length
        assert!(validate_color("#gg4444").is_err()); // not hex
    }
}
