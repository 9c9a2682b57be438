//! Helpers shared by the hostlink binary and its library crates.

pub mod settings;

pub use settings::{SETTINGS_FILE_NAME, SETTINGS_PATH_ENV, SettingsError, default_settings_path, expand_tilde, load_settings, load_settings_from_path};
