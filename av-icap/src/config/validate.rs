//! Field validation strategies for raw configuration text.

/// Per-field validation predicate applied to the raw property text.
///
/// Numeric ranges are exclusive on the low end and inclusive on the high end;
/// schema keys for which 0 is a legal value use `min = -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Case-insensitive `true` or `false`.
    Boolean,
    /// 32-bit integer in `(min, max]`; parse failure is invalid.
    RangedInteger { min: i32, max: i32 },
    /// 64-bit integer in `(min, max]`; parse failure is invalid.
    RangedLong { min: i64, max: i64 },
    /// Non-blank string of at most `max_len` characters.
    RangedString { max_len: usize },
}

impl Validator {
    pub fn validate(&self, input: &str) -> bool {
        match *self {
            Validator::Boolean => {
                input.eq_ignore_ascii_case("true") || input.eq_ignore_ascii_case("false")
            }
            Validator::RangedInteger { min, max } => match input.parse::<i32>() {
                Ok(value) => value > min && value <= max,
                Err(_) => false,
            },
            Validator::RangedLong { min, max } => match input.parse::<i64>() {
                Ok(value) => value > min && value <= max,
                Err(_) => false,
            },
            Validator::RangedString { max_len } => {
                !input.trim().is_empty() && input.len() <= max_len
            }
        }
    }
}
