use super::types::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // 明示指定がなければ標準の場所を探す
        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::with_name("scorewatch").required(false))
                .add_source(File::with_name("config/scorewatch").required(false));
        }

        // SCOREWATCH_MODEL__CONTAMINATION=0.1 の形式で上書き
        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("SCOREWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            );
        }

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .validate()
            .context("Configuration failed validation")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_build_with_defaults_only() {
        let config = ConfigLoader::new()
            .load_from_file(Some("does-not-matter"))
            .build();
        // 明示指定したファイルが存在しない場合はエラー
        assert!(config.is_err());

        let config = ConfigLoader::new().build().unwrap();
        assert_eq!(config.model.n_estimators, 100);
    }

    #[test]
    fn test_build_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorewatch.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[model]
contamination = 0.1
n_estimators = 50

[cache]
ttl_seconds = 60
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .load_from_file(path.to_str())
            .build()
            .unwrap();

        assert_eq!(config.model.contamination, 0.1);
        assert_eq!(config.model.n_estimators, 50);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.cache.capacity, 100);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[model]\ncontamination = 0.9\n").unwrap();

        let result = ConfigLoader::new().load_from_file(path.to_str()).build();
        assert!(result.is_err());
    }
}
