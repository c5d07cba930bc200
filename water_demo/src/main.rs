//! Water demo
//!
//! Loads `config/water.toml` (or the path given as the first argument), then
//! renders the lake scene until the window closes. WASD/Space/Backspace move
//! the camera, Q/E roll, the mouse looks around and the left button stirs the
//! water.

use water_engine::config::Config;
use water_engine::core::config::ApplicationConfig;
use water_engine::foundation::logging;

const DEFAULT_CONFIG: &str = "config/water.toml";

fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    // The logger needs the configured level, so loading reports nothing itself
    let loaded = ApplicationConfig::load_if_exists(&path);
    let filter = match &loaded {
        Ok(Some(config)) => config.engine.log_level.as_str(),
        _ => "info",
    };
    logging::init(filter);

    log::info!("Starting water demo with {}", path);

    let result = loaded
        .map(|config| {
            config.unwrap_or_else(|| {
                log::warn!("Config file {} not found, using defaults", path);
                ApplicationConfig::default()
            })
        })
        .map_err(water_engine::AppError::from)
        .and_then(|config| {
            config.validate()?;
            water_engine::application::run(config)
        });

    match result {
        Ok(()) => log::info!("Water demo finished"),
        Err(e) => {
            log::error!("Water demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
