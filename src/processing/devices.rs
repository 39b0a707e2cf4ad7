//! Static table of supported reading devices.

use std::collections::BTreeMap;
use std::fmt;
use lazy_static::lazy_static;
use serde::Serialize;
use crate::core::Resolution;
use crate::utils::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayType {
    Eink,
    Lcd,
    Oled,
    Retina,
}

impl DisplayType {
    pub fn is_eink(self) -> bool {
        self == Self::Eink
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eink => "E-Ink",
            Self::Lcd => "LCD",
            Self::Oled => "OLED",
            Self::Retina => "Retina",
        };
        f.write_str(name)
    }
}

/// Display characteristics shared by a family of devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    EinkMono,
    EinkColor,
    Tablet,
}

impl Panel {
    fn display_type(self) -> DisplayType {
        match self {
            Self::EinkMono | Self::EinkColor => DisplayType::Eink,
            Self::Tablet => DisplayType::Retina,
        }
    }

    fn color(self) -> bool {
        !matches!(self, Self::EinkMono)
    }

    fn bit_depth(self) -> u8 {
        match self {
            Self::EinkMono => 4,
            Self::EinkColor => 12,
            Self::Tablet => 24,
        }
    }
}

/// One device the converter can target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub resolution: Resolution,
    pub display_type: DisplayType,
    pub ppi: u32,
    pub color: bool,
    /// Bits per pixel the panel resolves (4 means 16 gray levels)
    pub bit_depth: u8,
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {} ppi, {})",
            self.name,
            self.resolution,
            self.display_type,
            self.ppi,
            if self.color { "color" } else { "B&W" }
        )
    }
}

type DeviceRow = (&'static str, &'static str, u32, u32, u32, Panel);

const DEVICE_TABLE: &[DeviceRow] = &[
    ("kindle_paperwhite_11", "Kindle Paperwhite 11th Gen", 1236, 1648, 300, Panel::EinkMono),
    ("kindle_paperwhite_12", "Kindle Paperwhite 12th Gen", 1264, 1680, 300, Panel::EinkMono),
    ("kindle_paperwhite", "Kindle Paperwhite (older)", 1072, 1448, 300, Panel::EinkMono),
    ("kindle_scribe", "Kindle Scribe", 1860, 2480, 300, Panel::EinkMono),
    ("kindle_oasis", "Kindle Oasis", 1264, 1680, 300, Panel::EinkMono),
    ("kindle_11_2022", "Kindle 11th Gen 2022", 1072, 1448, 300, Panel::EinkMono),
    ("kindle_colorsoft", "Kindle Colorsoft", 1264, 1680, 300, Panel::EinkColor),
    ("kobo_nia", "Kobo Nia", 1024, 758, 212, Panel::EinkMono),
    ("kobo_elipsa", "Kobo Elipsa", 1404, 1872, 227, Panel::EinkMono),
    ("kobo_elipsa_2e", "Kobo Elipsa 2E", 1404, 1872, 227, Panel::EinkMono),
    ("kobo_libra_2", "Kobo Libra 2", 1680, 1264, 300, Panel::EinkMono),
    ("kobo_sage", "Kobo Sage", 1920, 1440, 300, Panel::EinkMono),
    ("kobo_clara_2e", "Kobo Clara 2E", 1448, 1072, 300, Panel::EinkMono),
    ("kobo_clara_colour", "Kobo Clara Colour", 1448, 1072, 300, Panel::EinkColor),
    ("kobo_libra_colour", "Kobo Libra Colour", 1680, 1264, 300, Panel::EinkColor),
    ("tolino_vision_6", "Tolino Vision 6", 1264, 1680, 300, Panel::EinkMono),
    ("tolino_epos_3", "Tolino Epos 3", 1404, 1872, 227, Panel::EinkMono),
    ("tolino_page_2", "Tolino Page 2", 1072, 1448, 300, Panel::EinkMono),
    ("pocketbook_touch_lux_5", "PocketBook Touch Lux 5", 758, 1024, 212, Panel::EinkMono),
    ("pocketbook_era", "PocketBook Era", 1264, 1680, 300, Panel::EinkMono),
    ("pocketbook_inkpad_4", "PocketBook InkPad 4", 1404, 1872, 300, Panel::EinkMono),
    ("pocketbook_verse", "PocketBook Verse", 758, 1024, 212, Panel::EinkMono),
    ("pocketbook_verse_pro", "PocketBook Verse Pro", 1072, 1448, 300, Panel::EinkMono),
    ("pocketbook_inkpad_color_3", "PocketBook InkPad Color 3", 1404, 1872, 300, Panel::EinkColor),
    ("pocketbook_era_color", "PocketBook Era Color", 1264, 1680, 300, Panel::EinkColor),
    ("ipad_pro_11", "iPad Pro 11\"", 1668, 2388, 264, Panel::Tablet),
    ("ipad_pro_129", "iPad Pro 12.9\"", 2048, 2732, 264, Panel::Tablet),
    ("ipad_air", "iPad Air", 1640, 2360, 264, Panel::Tablet),
    ("ipad_mini", "iPad Mini", 1488, 2266, 326, Panel::Tablet),
    ("ipad_10", "iPad 10th Gen", 1620, 2360, 264, Panel::Tablet),
];

lazy_static! {
    static ref DEVICES: BTreeMap<&'static str, DeviceSpec> = DEVICE_TABLE
        .iter()
        .map(|&(key, name, width, height, ppi, panel)| {
            let spec = DeviceSpec {
                key,
                name,
                resolution: Resolution::new(width, height),
                display_type: panel.display_type(),
                ppi,
                color: panel.color(),
                bit_depth: panel.bit_depth(),
            };
            (key, spec)
        })
        .collect();
}

/// Look up a device by key, ignoring case.
pub fn device(key: &str) -> Result<&'static DeviceSpec, ValidationError> {
    let normalized = key.trim().to_lowercase();
    DEVICES
        .get(normalized.as_str())
        .ok_or(ValidationError::UnknownDevice { key: key.to_string() })
}

/// All devices, sorted by key.
pub fn all_devices() -> impl Iterator<Item = &'static DeviceSpec> {
    DEVICES.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let spec = device("Kobo_Elipsa").unwrap();
        assert_eq!(spec.resolution, Resolution::new(1404, 1872));
        assert_eq!(spec.bit_depth, 4);
        assert!(!spec.color);
        assert!(spec.display_type.is_eink());
    }

    #[test]
    fn unknown_device() {
        assert_eq!(
            device("nook_glowlight").unwrap_err(),
            ValidationError::UnknownDevice { key: "nook_glowlight".into() }
        );
    }

    #[test]
    fn table_keys_are_unique() {
        assert_eq!(all_devices().count(), DEVICE_TABLE.len());
    }
}
