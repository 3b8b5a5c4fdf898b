//! Language settings parsed from `.toml` files.

use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LanguageSettings {
    /// Declarations introduced after this version are hidden.
    #[serde(default = "default_api_version")]
    pub api_version: Version,
    /// Opt-in markers the current compilation unit has accepted.
    #[serde(default)]
    pub opt_in: Vec<Box<str>>,
    /// Whether a non-generic candidate beats an equally specific generic one.
    #[serde(default = "default_true")]
    pub discriminate_generics: bool,
}

fn default_api_version() -> Version {
    Version::new(2, 0, 0)
}

fn default_true() -> bool {
    true
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            opt_in: Vec::new(),
            discriminate_generics: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl LanguageSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_contents = std::fs::read_to_string(&path)?;
        let settings = toml::from_str(&file_contents)?;
        Ok(settings)
    }

    pub fn has_opted_into(&self, marker: &str) -> bool {
        self.opt_in.iter().any(|accepted| &**accepted == marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_settings() {
        let src = r#"
            api-version = "1.9.20"
            opt-in = ["ExperimentalStdlibApi"]
            discriminate-generics = false
        "#;

        let settings: LanguageSettings = toml::from_str(src).unwrap();
        assert_eq!(settings.api_version, Version::new(1, 9, 20));
        assert!(settings.has_opted_into("ExperimentalStdlibApi"));
        assert!(!settings.has_opted_into("DelicateApi"));
        assert!(!settings.discriminate_generics);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: LanguageSettings = toml::from_str("").unwrap();
        assert_eq!(settings, LanguageSettings::default());
    }

    #[test]
    fn reject_bad_versions() {
        let result = toml::from_str::<LanguageSettings>(r#"api-version = "two""#);
        assert!(result.is_err());
    }
}
