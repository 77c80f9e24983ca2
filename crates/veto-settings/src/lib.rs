//! # veto-settings
//!
//! Configuration for the map veto server, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`VetoSettings::default()`]
//! 2. **User file**: `~/.veto/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VETO_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
