//! Definições de configuração declaradas pelo manifest (ou embutidas no drunner)

use crate::error::{DrunnerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tipo de valor aceito por uma configuração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    #[default]
    String,
    Bool,
    Port,
    Path,
    #[serde(alias = "existing-path", alias = "existing_path")]
    ExistingPath,
    Url,
    Password,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigType::String => "string",
            ConfigType::Bool => "bool",
            ConfigType::Port => "port",
            ConfigType::Path => "path",
            ConfigType::ExistingPath => "existingpath",
            ConfigType::Url => "url",
            ConfigType::Password => "password",
        };
        f.write_str(s)
    }
}

fn default_true() -> bool {
    true
}

/// Uma entrada da tabela de configurações.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDefinition {
    pub key: String,

    #[serde(default)]
    pub default: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type", default)]
    pub config_type: ConfigType,

    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_true")]
    pub user_settable: bool,
}

impl ConfigurationDefinition {
    pub fn new(
        key: &str,
        default: &str,
        description: &str,
        config_type: ConfigType,
        required: bool,
        user_settable: bool,
    ) -> Self {
        Self {
            key: key.to_string(),
            default: default.to_string(),
            description: description.to_string(),
            config_type,
            required,
            user_settable,
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    pub fn is_password(&self) -> bool {
        self.config_type == ConfigType::Password
    }

    /// Valida um valor de acordo com o tipo. Valor vazio sempre limpa a configuração.
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }

        let problem = match self.config_type {
            ConfigType::String | ConfigType::Path | ConfigType::Password => None,
            ConfigType::Bool => {
                let first = value.chars().next().map(|c| c.to_ascii_lowercase());
                match first {
                    Some('y' | 'n' | 't' | 'f' | '1' | '0') => None,
                    _ => Some("esperado um booleano (true/false, yes/no)".to_string()),
                }
            }
            ConfigType::Port => match value.parse::<u32>() {
                Ok(port) if (1..=65535).contains(&port) => None,
                _ => Some("esperada uma porta entre 1 e 65535".to_string()),
            },
            ConfigType::ExistingPath => {
                if Path::new(value).exists() {
                    None
                } else {
                    Some(format!("o caminho {value} não existe"))
                }
            }
            ConfigType::Url => match value.split_once("://") {
                Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => None,
                _ => Some("esperada uma URL no formato esquema://host".to_string()),
            },
        };

        match problem {
            None => Ok(()),
            Some(reason) => Err(DrunnerError::ValidationFailed(format!(
                "valor inválido para {} ({}): {}",
                self.key, self.config_type, reason
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(t: ConfigType) -> ConfigurationDefinition {
        ConfigurationDefinition::new("K", "", "", t, false, true)
    }

    #[test]
    fn test_port_validation() {
        assert!(def(ConfigType::Port).validate("8080").is_ok());
        assert!(def(ConfigType::Port).validate("0").is_err());
        assert!(def(ConfigType::Port).validate("70000").is_err());
        assert!(def(ConfigType::Port).validate("http").is_err());
    }

    #[test]
    fn test_bool_validation() {
        assert!(def(ConfigType::Bool).validate("True").is_ok());
        assert!(def(ConfigType::Bool).validate("no").is_ok());
        assert!(def(ConfigType::Bool).validate("maybe").is_err());
    }

    #[test]
    fn test_url_and_existing_path() {
        assert!(def(ConfigType::Url).validate("https://drunner.io").is_ok());
        assert!(def(ConfigType::Url).validate("drunner.io").is_err());

        let tmp = tempfile::TempDir::new().unwrap();
        let existing = tmp.path().to_string_lossy().to_string();
        assert!(def(ConfigType::ExistingPath).validate(&existing).is_ok());
        assert!(def(ConfigType::ExistingPath)
            .validate("/definitely/not/here/xyz")
            .is_err());
    }

    #[test]
    fn test_empty_value_always_accepted() {
        assert!(def(ConfigType::Port).validate("").is_ok());
    }

    #[test]
    fn test_type_aliases_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            t: ConfigType,
        }
        let w: Wrapper = toml::from_str("t = \"existing-path\"").unwrap();
        assert_eq!(w.t, ConfigType::ExistingPath);
        let w: Wrapper = toml::from_str("t = \"password\"").unwrap();
        assert_eq!(w.t, ConfigType::Password);
    }
}
