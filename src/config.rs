//! Run configuration and the TOML/JSON loader

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::expand::ExpansionStrategy;
use crate::sources::SymbolResolver;
use crate::{Side, TimeFrame};

/// Errors raised while loading or validating configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config file error: {0}")]
    File(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    /// From the file extension; for strings, JSON first then TOML
    Auto,
}

pub trait ConfigValidation {
    fn validate(&self) -> ConfigResult<()>;
}

// ============================================================
// ANALYSIS CONFIG
// ============================================================

/// Settings for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Symbols analysed, in order
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<TimeFrame>,

    #[serde(default = "default_sides")]
    pub sides: Vec<Side>,

    /// Trend touch lists longer than this are skipped without fitting
    #[serde(default = "default_max_touch_points")]
    pub max_touch_points: usize,

    /// Half-width of the extremum window when extrema are computed locally
    #[serde(default = "default_extremum_window")]
    pub extremum_window: usize,

    #[serde(default)]
    pub strategy: ExpansionStrategy,

    /// Symbol → instrument token
    #[serde(default)]
    pub tokens: BTreeMap<String, u32>,
}

fn default_timeframes() -> Vec<TimeFrame> {
    TimeFrame::ALL.to_vec()
}

fn default_sides() -> Vec<Side> {
    Side::ALL.to_vec()
}

fn default_max_touch_points() -> usize {
    100
}

fn default_extremum_window() -> usize {
    crate::touch::DEFAULT_HALF_WINDOW
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframes: default_timeframes(),
            sides: default_sides(),
            max_touch_points: default_max_touch_points(),
            extremum_window: default_extremum_window(),
            strategy: ExpansionStrategy::default(),
            tokens: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_symbol(mut self, symbol: impl Into<String>, token: u32) -> Self {
        let symbol = symbol.into();
        self.tokens.insert(symbol.clone(), token);
        self.symbols.push(symbol);
        self
    }
}

impl ConfigValidation for AnalysisConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.timeframes.is_empty() {
            return Err(ConfigError::Validation("timeframes must not be empty".into()));
        }
        if self.sides.is_empty() {
            return Err(ConfigError::Validation("sides must not be empty".into()));
        }
        if self.max_touch_points < 3 {
            return Err(ConfigError::Validation(format!(
                "max_touch_points must be at least 3, got {}",
                self.max_touch_points
            )));
        }
        if self.extremum_window == 0 {
            return Err(ConfigError::Validation("extremum_window must be positive".into()));
        }
        let mut seen = self.timeframes.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.timeframes.len() {
            return Err(ConfigError::Validation("timeframes contain duplicates".into()));
        }
        if let Some(s) = self.symbols.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("blank symbol {:?}", s)));
        }
        Ok(())
    }
}

impl SymbolResolver for AnalysisConfig {
    fn resolve(&self, symbol: &str) -> Option<u32> {
        self.tokens.get(symbol).copied()
    }
}

// ============================================================
// LOADER
// ============================================================

#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_file<T>(path: &Path, format: ConfigFormat) -> ConfigResult<T>
    where
        T: DeserializeOwned + ConfigValidation,
    {
        debug!("loading config from {}", path.display());
        let format = match format {
            ConfigFormat::Auto => Self::detect_format(path)?,
            f => f,
        };

        let content = fs::read_to_string(path).map_err(|e| {
            error!("cannot read config {}: {}", path.display(), e);
            ConfigError::File(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: T = match format {
            ConfigFormat::Json => Self::parse_json(&content)?,
            _ => Self::parse_toml(&content)?,
        };
        config.validate().map_err(|e| {
            error!("config {} is invalid: {}", path.display(), e);
            e
        })?;

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn load_from_string<T>(content: &str, format: ConfigFormat) -> ConfigResult<T>
    where
        T: DeserializeOwned + ConfigValidation,
    {
        let config: T = match format {
            ConfigFormat::Json => Self::parse_json(content)?,
            ConfigFormat::Toml => Self::parse_toml(content)?,
            ConfigFormat::Auto => match Self::parse_json::<T>(content) {
                Ok(config) => config,
                Err(_) => Self::parse_toml(content)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<T>(config: &T, path: &Path, format: ConfigFormat) -> ConfigResult<()>
    where
        T: Serialize + ConfigValidation,
    {
        config.validate()?;
        let format = match format {
            ConfigFormat::Auto => Self::detect_format(path).unwrap_or(ConfigFormat::Toml),
            f => f,
        };

        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| ConfigError::Parse(format!("JSON serialization failed: {}", e)))?,
            _ => toml::to_string_pretty(config)
                .map_err(|e| ConfigError::Parse(format!("TOML serialization failed: {}", e)))?,
        };

        fs::write(path, content).map_err(|e| {
            error!("cannot write config {}: {}", path.display(), e);
            ConfigError::File(format!("cannot write {}: {}", path.display(), e))
        })?;
        info!("saved config to {}", path.display());
        Ok(())
    }

    fn parse_json<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
        serde_json::from_str(content).map_err(|e| {
            warn!("JSON parse failed: {}", e);
            ConfigError::Parse(format!("JSON: {}", e))
        })
    }

    fn parse_toml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
        toml::from_str(content).map_err(|e| {
            warn!("TOML parse failed: {}", e);
            ConfigError::Parse(format!("TOML: {}", e))
        })
    }

    fn detect_format(path: &Path) -> ConfigResult<ConfigFormat> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(ConfigFormat::Json),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::File(format!("cannot detect format of {}", path.display()))),
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
symbols = ["INFY", "TCS"]
timeframes = ["1D", "1W"]
max_touch_points = 80

[strategy]
kind = "hyper_clique"
parallel = true

[tokens]
INFY = 408065
TCS = 2953217
"#;

    #[test]
    fn test_load_toml_string() {
        let config: AnalysisConfig = ConfigLoader::load_from_string(SAMPLE, ConfigFormat::Toml).unwrap();
        assert_eq!(config.symbols, vec!["INFY", "TCS"]);
        assert_eq!(config.timeframes, vec![TimeFrame::Day, TimeFrame::Week]);
        assert_eq!(config.sides, vec![Side::High, Side::Low]);
        assert_eq!(config.max_touch_points, 80);
        assert_eq!(config.extremum_window, 5);
        assert_eq!(config.strategy, ExpansionStrategy::HyperClique { parallel: true });
        assert_eq!(config.resolve("TCS"), Some(2953217));
        assert_eq!(config.resolve("WIPRO"), None);
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: AnalysisConfig = ConfigLoader::load_from_string("{}", ConfigFormat::Auto).unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.max_touch_points, 100);
        assert_eq!(config.timeframes.len(), 8);
    }

    #[test]
    fn test_validation_errors() {
        let bad = r#"{"max_touch_points": 2}"#;
        match ConfigLoader::load_from_string::<AnalysisConfig>(bad, ConfigFormat::Json) {
            Err(ConfigError::Validation(_)) => {},
            other => panic!("expected validation error, got {:?}", other),
        }
        let dup = r#"{"timeframes": ["1D", "1d"]}"#;
        assert!(ConfigLoader::load_from_string::<AnalysisConfig>(dup, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = ConfigLoader::load_from_string::<AnalysisConfig>("symbols = [", ConfigFormat::Toml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let config = AnalysisConfig::default().with_symbol("INFY", 408065);

        for name in ["run.toml", "run.json"] {
            let path = dir.path().join(name);
            ConfigLoader::save_to_file(&config, &path, ConfigFormat::Auto).unwrap();
            let loaded: AnalysisConfig = ConfigLoader::load_from_file(&path, ConfigFormat::Auto).unwrap();
            assert_eq!(loaded, config, "{}", name);
        }
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "{}").unwrap();
        let result = ConfigLoader::load_from_file::<AnalysisConfig>(&path, ConfigFormat::Auto);
        assert!(matches!(result, Err(ConfigError::File(_))));
    }
}
