use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("remaining teams value {raw:?} contains no digits")]
    NoDigits { raw: String },
    #[error("remaining teams value {raw:?} is out of range")]
    OutOfRange { raw: String },
}

/// Parse a remaining-teams label such as `"3팀"` or `"잔여 12팀"`.
///
/// Every ASCII digit in the label is kept, in order, and the result is read as
/// a decimal count. Labels without digits (including the `정보없음` placeholder)
/// are rejected rather than read as zero.
pub fn parse_remaining_teams(raw: &str) -> Result<u32, ParseError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(ParseError::NoDigits { raw: raw.to_string() });
    }
    digits
        .parse::<u32>()
        .map_err(|_| ParseError::OutOfRange { raw: raw.to_string() })
}
