//! `--list-presets` and `--list-devices` output.

use std::fmt::Write;
use crate::processing::{PresetFactory, all_devices};

/// One line per preset with the steps it runs.
pub fn render_presets() -> String {
    let mut out = String::from("Available presets:\n");
    for name in PresetFactory::list_presets() {
        match PresetFactory::get_preset(name) {
            Ok(pipeline) => {
                let _ = writeln!(out, "  {:<18} {}", name, pipeline);
            }
            Err(e) => {
                let _ = writeln!(out, "  {:<18} <invalid: {}>", name, e);
            }
        }
    }
    out
}

/// One line per device, sorted by key.
pub fn render_devices() -> String {
    let mut out = String::from("Supported devices:\n");
    for spec in all_devices() {
        let _ = writeln!(out, "  {:<24} {}", spec.key, spec);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_preset() {
        let listing = render_presets();
        for name in PresetFactory::list_presets() {
            assert!(listing.contains(name), "{} missing", name);
        }
        assert!(!listing.contains("<invalid"));
    }

    #[test]
    fn lists_devices() {
        let listing = render_devices();
        assert!(listing.contains("kobo_elipsa"));
        assert!(listing.contains("1404x1872"));
    }
}
