//! Terminal color types and X11-style color spec parsing.

use serde::{Deserialize, Serialize};

/// A 24-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse a color specification like `#RRGGBB`, `rgb:RR/GG/BB` or
    /// `rgb:RRRR/GGGG/BBBB` (as used by OSC 10..14).
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();

        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::new(r, g, b));
            }
        } else if let Some(rgb) = spec.strip_prefix("rgb:") {
            let parts: Vec<&str> = rgb.split('/').collect();
            if parts.len() == 3 {
                let parse_component = |s: &str| -> Option<u8> {
                    if s.is_empty() || s.len() > 4 {
                        return None;
                    }
                    let val = u16::from_str_radix(s, 16).ok()?;
                    // Scale 4/12/16-bit components down to 8 bit.
                    Some(match s.len() {
                        1 => (val * 0x11) as u8,
                        2 => val as u8,
                        3 => (val >> 4) as u8,
                        _ => (val >> 8) as u8,
                    })
                };
                let r = parse_component(parts[0])?;
                let g = parse_component(parts[1])?;
                let b = parse_component(parts[2])?;
                return Some(Self::new(r, g, b));
            }
        }

        None
    }

    /// Format as a 16-bit-per-channel X11 spec (`rgb:RRRR/GGGG/BBBB`),
    /// the form used in dynamic color query replies.
    pub fn to_x11_spec(self) -> String {
        let scale = |v: u8| u16::from(v) * 0x101;
        format!(
            "rgb:{:04x}/{:04x}/{:04x}",
            scale(self.red),
            scale(self.green),
            scale(self.blue)
        )
    }
}

/// A cell or pen color.
///
/// `Indexed` covers the 256-color palette, `Bright` the high-intensity
/// variants of the first eight palette entries (SGR 90..97 / 100..107).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Bright(u8),
    Rgb(RgbColor),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hash_spec() {
        assert_eq!(RgbColor::parse("#ff8000"), Some(RgbColor::new(255, 128, 0)));
        assert_eq!(RgbColor::parse("#FF8000"), Some(RgbColor::new(255, 128, 0)));
        assert_eq!(RgbColor::parse("#ff80"), None);
    }

    #[test]
    fn parse_x11_spec() {
        assert_eq!(
            RgbColor::parse("rgb:ff/80/00"),
            Some(RgbColor::new(255, 128, 0))
        );
        assert_eq!(
            RgbColor::parse("rgb:ffff/8080/0000"),
            Some(RgbColor::new(255, 128, 0))
        );
        assert_eq!(RgbColor::parse("rgb:ff/80"), None);
        assert_eq!(RgbColor::parse("rgb:gg/00/00"), None);
    }

    #[test]
    fn x11_roundtrip() {
        let color = RgbColor::new(0x12, 0x34, 0x56);
        assert_eq!(color.to_x11_spec(), "rgb:1212/3434/5656");
        assert_eq!(RgbColor::parse(&color.to_x11_spec()), Some(color));
    }
}
