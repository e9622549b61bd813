//! Status indicator colors
//!
//! Colors are plain 0xRRGGBB values. [`StatusColor::DEFAULT`] (cyan) is the
//! platform's normal "cloud connected" color and doubles as the "no override"
//! sentinel: configuring it as the backup color means the indicator keeps its
//! default theme while on backup.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// RGB color shown by the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusColor(u32);

impl StatusColor {
    pub const CYAN: StatusColor = StatusColor(0x00FF_FF);
    pub const YELLOW: StatusColor = StatusColor(0xFFFF_00);
    pub const GREEN: StatusColor = StatusColor(0x00FF_00);
    pub const RED: StatusColor = StatusColor(0xFF00_00);
    pub const BLUE: StatusColor = StatusColor(0x0000_FF);
    pub const MAGENTA: StatusColor = StatusColor(0xFF00_FF);
    pub const WHITE: StatusColor = StatusColor(0xFFFF_FF);
    pub const ORANGE: StatusColor = StatusColor(0xFF60_00);

    /// The "no override" sentinel
    pub const DEFAULT: StatusColor = StatusColor::CYAN;

    /// Create a color from a 0xRRGGBB value (upper byte is masked off)
    pub const fn from_rgb(rgb: u32) -> Self {
        Self(rgb & 0x00FF_FFFF)
    }

    /// The 0xRRGGBB value
    pub const fn rgb(self) -> u32 {
        self.0
    }

    /// Whether this color means "keep the default theme"
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl Default for StatusColor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

impl FromStr for StatusColor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let named = match s.to_lowercase().as_str() {
            "default" | "none" => Some(Self::DEFAULT),
            "cyan" => Some(Self::CYAN),
            "yellow" => Some(Self::YELLOW),
            "green" => Some(Self::GREEN),
            "red" => Some(Self::RED),
            "blue" => Some(Self::BLUE),
            "magenta" => Some(Self::MAGENTA),
            "white" => Some(Self::WHITE),
            "orange" => Some(Self::ORANGE),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = s
            .strip_prefix('#')
            .or_else(|| s.strip_prefix("0x"))
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| crate::Error::config(format!("Unknown status color '{}'", s)))?;

        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::Error::config(format!(
                "Status color '{}' must be exactly 6 hex digits",
                s
            )));
        }

        u32::from_str_radix(hex, 16)
            .map(Self::from_rgb)
            .map_err(|_| crate::Error::config(format!("Status color '{}' is not valid hex", s)))
    }
}

impl Serialize for StatusColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_and_hex() {
        assert_eq!("yellow".parse::<StatusColor>().unwrap(), StatusColor::YELLOW);
        assert_eq!("Default".parse::<StatusColor>().unwrap(), StatusColor::DEFAULT);
        assert_eq!("#ff6000".parse::<StatusColor>().unwrap(), StatusColor::ORANGE);
        assert_eq!(
            "0x123456".parse::<StatusColor>().unwrap(),
            StatusColor::from_rgb(0x123456)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("chartreuse".parse::<StatusColor>().is_err());
        assert!("#12345".parse::<StatusColor>().is_err());
        assert!("#GGGGGG".parse::<StatusColor>().is_err());
        assert!("#+12345".parse::<StatusColor>().is_err());
        assert!("0x-12345".parse::<StatusColor>().is_err());
    }

    #[test]
    fn test_display_and_sentinel() {
        assert_eq!(StatusColor::YELLOW.to_string(), "#FFFF00");
        assert!(StatusColor::CYAN.is_default());
        assert!(!StatusColor::YELLOW.is_default());
        assert_eq!(StatusColor::from_rgb(0xAB00_00FF).rgb(), 0x0000FF);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&StatusColor::YELLOW).unwrap();
        assert_eq!(json, "\"#FFFF00\"");
        let back: StatusColor = serde_json::from_str("\"cyan\"").unwrap();
        assert_eq!(back, StatusColor::CYAN);
    }
}
