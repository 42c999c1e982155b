use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging the TOML file with `OI_`-prefixed
    /// environment variables (environment wins). Nested fields use `__`
    /// as the separator, e.g. `OI_DATABASE__URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from a specific TOML file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("OI_").split("__"))
            .extract()?;

        Ok(config)
    }
}
