//! Layout de diretórios do drunner no host

use crate::error::{DrunnerError, Result};
use std::path::{Path, PathBuf};

/// Variável de ambiente que substitui a raiz padrão (`~/.drunner`).
pub const ROOT_ENV: &str = "DRUNNER_ROOT";

/// Nome do manifest dentro do diretório do serviço.
pub const MANIFEST_FILE: &str = "dservice.toml";

/// Raiz de instalação do drunner e seus subdiretórios.
#[derive(Debug, Clone)]
pub struct DrunnerPaths {
    root: PathBuf,
}

impl DrunnerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a raiz a partir de `DRUNNER_ROOT` ou do home do usuário.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV) {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            DrunnerError::ValidationFailed("não foi possível determinar o diretório home".to_string())
        })?;
        Ok(Self::new(home.join(".drunner")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn services(&self) -> PathBuf {
        self.root.join("dServices")
    }

    pub fn temp(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn host_volumes(&self) -> PathBuf {
        self.root.join("hostVolumes")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings")
    }

    pub fn global_settings_file(&self) -> PathBuf {
        self.settings().join("drunnerSettings.json")
    }

    /// Cria os diretórios de primeiro nível que ainda não existem.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.bin(), self.services(), self.temp(), self.host_volumes(), self.settings()] {
            std::fs::create_dir_all(&dir).map_err(|e| DrunnerError::fs(&dir, e))?;
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> ServicePaths {
        ServicePaths::new(self, name)
    }

    /// Lista os serviços instalados (diretórios em `dServices`).
    pub fn installed_services(&self) -> Result<Vec<String>> {
        let dir = self.services();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| DrunnerError::fs(&dir, e))? {
            let entry = entry.map_err(|e| DrunnerError::fs(&dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Caminhos de um serviço específico.
#[derive(Debug, Clone)]
pub struct ServicePaths {
    name: String,
    service_dir: PathBuf,
    host_volume: PathBuf,
    launch_script: PathBuf,
}

impl ServicePaths {
    fn new(paths: &DrunnerPaths, name: &str) -> Self {
        Self {
            name: name.to_string(),
            service_dir: paths.services().join(name),
            host_volume: paths.host_volumes().join(name),
            launch_script: paths.bin().join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diretório com os arquivos copiados da imagem (apagado no uninstall).
    pub fn service_dir(&self) -> &Path {
        &self.service_dir
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.service_dir.join(MANIFEST_FILE)
    }

    /// Armazenamento local persistente (sobrevive ao uninstall).
    pub fn host_volume(&self) -> &Path {
        &self.host_volume
    }

    /// As variáveis ficam no host volume para sobreviver a update/uninstall.
    pub fn vars_file(&self) -> PathBuf {
        self.host_volume.join("drunner").join("servicevars.json")
    }

    pub fn launch_script(&self) -> &Path {
        &self.launch_script
    }

    pub fn is_installed(&self) -> bool {
        self.service_dir.exists()
    }
}

/// Verifica se o nome do serviço é seguro para uso como nome de diretório.
pub fn validate_service_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(DrunnerError::ValidationFailed(format!(
            "nome de serviço inválido: '{name}' (use letras, números, '_', '-' ou '.')"
        )))
    }
}

/// Deriva um nome de serviço a partir da imagem (`registry/demo/app:1.0` -> `app`).
pub fn service_name_from_image(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    let repo = last.split(':').next().unwrap_or(last);
    repo.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
