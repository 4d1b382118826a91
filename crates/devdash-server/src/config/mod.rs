// crates/devdash-server/src/config/mod.rs
// Configuration and shared constants

pub mod env;
pub mod file;
pub mod ignore;

pub use env::{ConfigValidation, EnvConfig};
pub use file::{DevdashConfig, MissingPolicy, PipelineConfig, ScanConfig};

use std::path::PathBuf;

/// Base directory for devdash state (~/.devdash)
pub fn devdash_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".devdash")
}

/// Load file config, then layer environment overrides on top.
///
/// `.env` files must already be loaded into the process environment.
pub fn load() -> (DevdashConfig, ConfigValidation) {
    let mut config = DevdashConfig::load();
    let env = EnvConfig::load();
    env.apply(&mut config);
    let mut validation = env.validate();
    config.validate_into(&mut validation);
    (config, validation)
}
