//! Command handlers for the `mangapress` binary.
//!
//! - [`process`]: Run one batch conversion
//! - [`render_presets`] / [`render_devices`]: Listings for `--list-presets` and `--list-devices`

mod presets;
mod process;

pub use presets::{render_devices, render_presets};
pub use process::{ConfigFile, DEFAULT_PRESET, ProcessArgs, build_config, process};
