use hrflow_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    database: &'a hrflow_core::config::DatabaseConfig,
    logging: &'a hrflow_core::config::LoggingConfig,
}

/// Renders the effective configuration after defaults, file, and environment
/// layering, as TOML. There are no secret fields to redact.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let effective = EffectiveConfig { database: &config.database, logging: &config.logging };
    match toml::to_string_pretty(&effective) {
        Ok(rendered) => format!(
            "effective config (source precedence: overrides > env > file > default):\n{rendered}"
        ),
        Err(error) => format!("could not render effective config: {error}"),
    }
}
