use super::{Color, Error};

/// Represents an error for a malformed `#RRGGBB` string.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
#[error("invalid hex color {0:?}")]
pub struct HexParseError(pub String);

/// Formats a color as an uppercase `#RRGGBB` string.
pub fn to_hex(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

/// Parses `#RRGGBB` or `RRGGBB` (either case) into a color.
pub fn from_hex(hex: &str) -> Result<Color, HexParseError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HexParseError(hex.to_owned()));
    }

    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| HexParseError(hex.to_owned()))
    };
    Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
}

/// Parses a comma-separated list of hex colors, e.g. `"#C81E1E, 1e1ec8"`.
/// Blank entries are skipped.
pub fn parse_palette(list: &str) -> Result<Vec<Color>, Error> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| from_hex(s).map_err(Error::from))
        .collect()
}
