//! Manifest declarativo do serviço (`dservice.toml`)

use crate::config::{ConfigStore, ConfigurationDefinition};
use crate::error::{DrunnerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Diretório, dentro da imagem principal, com os arquivos do serviço.
pub const EMBEDDED_DIR: &str = "/drunner";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,

    #[serde(default)]
    pub run_as_root: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Nome do volume; aceita `$SERVICENAME` e outras variáveis.
    pub name: String,

    #[serde(default = "default_true")]
    pub backup: bool,

    /// Volumes externos não são criados nem destruídos pelo drunner.
    #[serde(default)]
    pub external: bool,
}

impl VolumeSpec {
    /// Nome do tar no backup: o template com os marcadores removidos, para que
    /// o backup de `myapp` possa ser restaurado como `myapp2`.
    pub fn backup_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .filter(|c| !matches!(c, '$' | '{' | '}'))
            .map(|c| if c == '/' { '_' } else { c })
            .collect();
        format!("{stem}.tar")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CronEntry {
    #[serde(default)]
    pub offset_minutes: u32,
    pub repeat_minutes: u32,
    pub function: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct HookSettings {
    /// Programa dentro da imagem principal que recebe `<hook>_<fase> args...`.
    pub command: Option<String>,
}

/// Volume gerenciado já com o nome resolvido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedVolume {
    pub name: String,
    pub backup_name: String,
    pub backup: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ServiceManifest {
    #[serde(default)]
    pub hooks: HookSettings,

    #[serde(default)]
    pub containers: Vec<ContainerSpec>,

    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub configuration: Vec<ConfigurationDefinition>,

    #[serde(default)]
    pub cron: Vec<CronEntry>,
}

impl ServiceManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: ServiceManifest =
            toml::from_str(text).map_err(|e| DrunnerError::CorruptManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DrunnerError::NoSuchFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|e| DrunnerError::fs(path, e))?;
        Self::parse(&text).map_err(|e| match e {
            DrunnerError::CorruptManifest(reason) => {
                DrunnerError::CorruptManifest(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        for (i, def) in self.configuration.iter().enumerate() {
            if def.key.trim().is_empty() {
                return Err(DrunnerError::CorruptManifest(
                    "configuração sem chave".to_string(),
                ));
            }
            if self.configuration[..i].iter().any(|d| d.matches(&def.key)) {
                return Err(DrunnerError::CorruptManifest(format!(
                    "configuração '{}' declarada mais de uma vez",
                    def.key
                )));
            }
        }

        if let Some(c) = self.containers.iter().find(|c| c.name.trim().is_empty()) {
            return Err(DrunnerError::CorruptManifest(format!(
                "container sem nome: {c:?}"
            )));
        }

        if self.volumes.iter().any(|v| v.name.trim().is_empty()) {
            return Err(DrunnerError::CorruptManifest("volume sem nome".to_string()));
        }

        Ok(())
    }

    pub fn hook_command(&self) -> Option<&str> {
        self.hooks
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }

    pub fn embedded_dir(&self) -> &'static str {
        EMBEDDED_DIR
    }

    pub fn lists_image(&self, image: &str) -> bool {
        self.containers.iter().any(|c| c.name == image)
    }

    /// Volumes criados e destruídos pelo drunner (não externos), com nomes resolvidos.
    pub fn managed_volumes(&self, vars: &ConfigStore) -> Vec<ManagedVolume> {
        self.volumes
            .iter()
            .filter(|v| !v.external)
            .map(|v| ManagedVolume {
                name: vars.substitute(&v.name),
                backup_name: v.backup_name(),
                backup: v.backup,
            })
            .collect()
    }

    pub fn managed_volume_names(&self, vars: &ConfigStore) -> Vec<String> {
        self.managed_volumes(vars).into_iter().map(|v| v.name).collect()
    }

    pub fn backup_volumes(&self, vars: &ConfigStore) -> Vec<ManagedVolume> {
        self.managed_volumes(vars)
            .into_iter()
            .filter(|v| v.backup)
            .collect()
    }

    /// Tarefas agendadas válidas; entradas com `repeat_minutes = 0` são ignoradas.
    pub fn cron_entries(&self) -> Vec<&CronEntry> {
        self.cron
            .iter()
            .filter(|c| {
                let valid = c.repeat_minutes > 0 && !c.function.trim().is_empty();
                if !valid {
                    warn!("Ignorando tarefa agendada inválida: {:?}", c);
                }
                valid
            })
            .collect()
    }
}
