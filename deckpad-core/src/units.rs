use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeckError, DeckResult};

pub const EMU_PER_INCH: i64 = 914_400;
pub const EMU_PER_POINT: i64 = 12_700;

/// 10in x 7.5in, the classic 4:3 slide.
pub const DEFAULT_SLIDE_WIDTH: i64 = 9_144_000;
pub const DEFAULT_SLIDE_HEIGHT: i64 = 6_858_000;

/// Largest magnitude a drawing coordinate may take (ST_Coordinate).
pub const MAX_COORDINATE: i64 = 27_273_042_316_900;

/// Widest outline a shape may carry (ST_LineWidth).
pub const MAX_LINE_WIDTH: i64 = 20_116_800;

pub fn inches_to_emu(value: f64) -> DeckResult<i64> {
    if !value.is_finite() {
        return Err(DeckError::invalid(format!(
            "dimension must be a finite number of inches, got {value}"
        )));
    }
    let emu = (value * EMU_PER_INCH as f64).round();
    if emu.abs() > MAX_COORDINATE as f64 {
        return Err(DeckError::invalid(format!(
            "{value} inches is outside the drawing coordinate range"
        )));
    }
    Ok(emu as i64)
}

/// Like [`inches_to_emu`] but also rejects zero and negative extents.
pub fn extent_to_emu(name: &str, value: f64) -> DeckResult<i64> {
    let emu = inches_to_emu(value)?;
    if emu <= 0 {
        return Err(DeckError::invalid(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(emu)
}

/// Bounds check for extents derived from other values rather than given.
pub fn check_extent(name: &str, emu: i64) -> DeckResult<i64> {
    if emu <= 0 || emu > MAX_COORDINATE {
        return Err(DeckError::invalid(format!(
            "{name} of {:.3} inches is outside the drawing coordinate range",
            emu_to_inches(emu)
        )));
    }
    Ok(emu)
}

pub fn emu_to_inches(emu: i64) -> f64 {
    emu as f64 / EMU_PER_INCH as f64
}

pub fn points_to_emu(points: f64) -> DeckResult<i64> {
    if !points.is_finite() || points < 0.0 {
        return Err(DeckError::invalid(format!(
            "line width must be a non-negative number of points, got {points}"
        )));
    }
    let emu = (points * EMU_PER_POINT as f64).round();
    if emu > MAX_LINE_WIDTH as f64 {
        return Err(DeckError::invalid(format!(
            "line width must be at most {} points, got {points}",
            MAX_LINE_WIDTH / EMU_PER_POINT
        )));
    }
    Ok(emu as i64)
}

/// Font size in hundredths of a point, the unit run properties store.
pub fn font_size_to_centipoints(points: f64) -> DeckResult<u32> {
    if !points.is_finite() || points <= 0.0 || points > 4000.0 {
        return Err(DeckError::invalid(format!(
            "font size must be between 0 and 4000 points, got {points}"
        )));
    }
    Ok((points * 100.0).round() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Six upper-case hex digits without the leading `#`.
    pub fn hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.hex())
    }
}

impl FromStr for Rgb {
    type Err = DeckError;

    fn from_str(value: &str) -> DeckResult<Self> {
        let digits = value.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeckError::invalid(format!(
                "color must be a hex string like #RRGGBB, got '{value}'"
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|err| DeckError::invalid(format!("bad color '{value}': {err}")))
        };
        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = DeckError;

    fn try_from(value: String) -> DeckResult<Self> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

/// Optional position and size overrides, in inches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Placement {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Placement {
    pub fn at(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left: Some(left),
            top: Some(top),
            width: Some(width),
            height: Some(height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colors_with_and_without_hash() {
        assert_eq!("#FF8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert_eq!("00ff00".parse::<Rgb>().unwrap(), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::new(1, 2, 255).to_string(), "#0102FF");
    }

    #[test]
    fn rejects_malformed_colors() {
        for bad in ["#FFF", "red", "#GG0000", "#1234567", ""] {
            let err = bad.parse::<Rgb>().unwrap_err();
            assert_eq!(err.kind(), "InvalidInputError", "{bad}");
        }
    }

    #[test]
    fn inch_conversion_round_trips() {
        for value in [0.0, 0.5, 1.0, 1.3, 2.75, 7.5] {
            let emu = inches_to_emu(value).unwrap();
            assert_eq!(emu_to_inches(emu), value);
        }
        assert!(inches_to_emu(f64::NAN).is_err());
        assert!(extent_to_emu("width", 0.0).is_err());
        assert!(extent_to_emu("width", -1.0).is_err());
    }

    #[test]
    fn coordinates_outside_the_drawing_range_are_rejected() {
        for value in [1e30, -1e30, 3e7] {
            let err = inches_to_emu(value).unwrap_err();
            assert_eq!(err.kind(), "InvalidInputError", "{value}");
        }
        assert!(inches_to_emu(-29_000_000.0).is_ok());
        assert!(extent_to_emu("width", 1e30).is_err());
        assert!(check_extent("height", MAX_COORDINATE + 1).is_err());
        assert_eq!(check_extent("height", MAX_COORDINATE).unwrap(), MAX_COORDINATE);
        assert!(points_to_emu(1584.0).is_ok());
        assert!(points_to_emu(1585.0).is_err());
    }

    #[test]
    fn colors_deserialize_from_json_strings() {
        let color: Rgb = serde_json::from_str("\"#336699\"").unwrap();
        assert_eq!(color, Rgb::new(0x33, 0x66, 0x99));
        assert!(serde_json::from_str::<Rgb>("\"#33669\"").is_err());
        assert_eq!(serde_json::to_string(&color).unwrap(), "\"#336699\"");
    }
}
