// Colors and the logical key identifiers the host hands to the device.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An ARGB color with 8 bits per channel.
///
/// Equality is an exact match on all four components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Opaque black, the "off" color the device assumes after startup or reset.
    pub const BLACK: Color = Color::from_argb(255, 0, 0, 0);

    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(255, r, g, b)
    }

    pub const fn to_argb_bytes(self) -> [u8; 4] {
        [self.a, self.r, self.g, self.b]
    }

    pub const fn from_argb_bytes(bytes: [u8; 4]) -> Self {
        Self::from_argb(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02X}{:02X}{:02X}{:02X}",
            self.a, self.r, self.g, self.b
        )
    }
}

/// Logical lighting slots produced by the host's color pipeline.
///
/// The host computes colors for many more keys than this device cares about;
/// only [`DeviceKey::PeripheralLogo`] is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKey {
    Peripheral,
    PeripheralLogo,
    PeripheralScrollWheel,
    PeripheralFrontLight,
    Logo,
    Logo2,
    Escape,
}

/// Per-frame mapping from key identifier to requested color.
pub type KeyColors = HashMap<DeviceKey, Color>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_exact() {
        let base = Color::from_argb(255, 10, 20, 30);
        assert_eq!(base, Color::from_argb(255, 10, 20, 30));
        assert_ne!(base, Color::from_argb(254, 10, 20, 30));
        assert_ne!(base, Color::from_argb(255, 10, 20, 31));
    }

    #[test]
    fn test_default_is_opaque_black() {
        assert_eq!(Color::default(), Color::BLACK);
        assert_eq!(Color::BLACK.to_argb_bytes(), [255, 0, 0, 0]);
    }

    #[test]
    fn test_display_is_argb_hex() {
        assert_eq!(Color::from_argb(0x80, 0xFF, 0x0A, 0x00).to_string(), "#80FF0A00");
    }
}
