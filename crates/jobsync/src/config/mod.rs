pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_settings, load_settings_from_str, validate_settings};
pub use schema::{RemoteSettings, Settings};
