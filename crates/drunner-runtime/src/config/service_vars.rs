//! Stores concretos: variáveis de um serviço e configurações globais do drunner

use super::definition::{ConfigType, ConfigurationDefinition};
use super::store::ConfigStore;
use super::variables::Variables;
use crate::error::{DrunnerError, Result};
use crate::paths::{DrunnerPaths, ServicePaths};
use tracing::warn;

pub const IMAGENAME: &str = "IMAGENAME";
pub const DEVMODE: &str = "DEVMODE";
pub const SERVICENAME: &str = "SERVICENAME";

pub const PULLIMAGES: &str = "PULLIMAGES";
pub const UTILSIMAGE: &str = "UTILSIMAGE";

/// Imagem auxiliar usada para tar/openssl/chmod em volumes.
pub const DEFAULT_UTILS_IMAGE: &str = "drunner/drunner_utils";

/// Variáveis persistidas de um serviço (definições embutidas + manifest).
#[derive(Debug, Clone)]
pub struct ServiceVars {
    store: ConfigStore,
}

impl ServiceVars {
    pub fn builtin_definitions() -> Vec<ConfigurationDefinition> {
        vec![
            ConfigurationDefinition::new(IMAGENAME, "", "Imagem principal", ConfigType::String, true, false),
            ConfigurationDefinition::new(DEVMODE, "False", "Modo de desenvolvimento", ConfigType::Bool, true, false),
        ]
    }

    pub fn new(paths: &ServicePaths, manifest_definitions: &[ConfigurationDefinition]) -> Result<Self> {
        let mut definitions = Self::builtin_definitions();
        definitions.extend(manifest_definitions.iter().cloned());

        let mut store = ConfigStore::new(paths.name(), paths.vars_file(), definitions)
            .map_err(|e| DrunnerError::CorruptManifest(e.to_string()))?;
        store.set_mem(SERVICENAME, paths.name());

        Ok(Self { store })
    }

    /// Cria o store e carrega o arquivo existente.
    pub fn load(paths: &ServicePaths, manifest_definitions: &[ConfigurationDefinition]) -> Result<Self> {
        let mut vars = Self::new(paths, manifest_definitions)?;
        vars.store.load()?;
        Ok(vars)
    }

    /// Lê só `IMAGENAME` e `DEVMODE` do arquivo, sem depender do manifest.
    ///
    /// Usado pelo `recover`, quando o diretório do serviço pode estar danificado.
    pub fn read_identity(paths: &ServicePaths) -> Result<(String, bool)> {
        let path = paths.vars_file();
        if !path.exists() {
            return Err(DrunnerError::NoSuchFile(path));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| DrunnerError::fs(&path, e))?;
        let raw: Variables =
            serde_json::from_str(&text).map_err(|e| DrunnerError::CorruptSettings {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let image = raw.get(IMAGENAME).unwrap_or_default().to_string();
        let dev_mode = matches!(
            raw.get(DEVMODE).and_then(|v| v.chars().next()),
            Some('y' | 'Y' | 't' | 'T')
        );
        Ok((image, dev_mode))
    }

    pub fn image_name(&self) -> String {
        let image = self.store.get(IMAGENAME);
        if image.is_empty() {
            warn!("IMAGENAME não definido.");
        }
        image
    }

    pub fn set_image_name(&mut self, image: &str) -> Result<()> {
        self.store.assign(IMAGENAME, image)
    }

    pub fn dev_mode(&self) -> bool {
        self.store.get_bool(DEVMODE)
    }

    pub fn set_dev_mode(&mut self, dev_mode: bool) -> Result<()> {
        self.store.assign(DEVMODE, if dev_mode { "True" } else { "False" })
    }

    pub fn service_name(&self) -> String {
        self.store.get(SERVICENAME)
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn save(&self) -> Result<()> {
        self.store.save()
    }
}

/// Configurações globais da instalação do drunner.
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    store: ConfigStore,
}

impl GlobalSettings {
    pub fn definitions() -> Vec<ConfigurationDefinition> {
        vec![
            ConfigurationDefinition::new(PULLIMAGES, "true", "Baixar imagens antes de instalar/atualizar", ConfigType::Bool, false, true),
            ConfigurationDefinition::new(UTILSIMAGE, DEFAULT_UTILS_IMAGE, "Imagem auxiliar para volumes e backups", ConfigType::String, false, true),
        ]
    }

    /// Carrega o arquivo global, ou usa os padrões se ele ainda não existir.
    pub fn load(paths: &DrunnerPaths) -> Result<Self> {
        let mut store = ConfigStore::new("drunner", paths.global_settings_file(), Self::definitions())?;
        if store.exists() {
            store.load()?;
        }
        Ok(Self { store })
    }

    pub fn pull_images(&self) -> bool {
        self.store.get_bool(PULLIMAGES)
    }

    pub fn utils_image(&self) -> String {
        let image = self.store.get(UTILSIMAGE);
        if image.is_empty() {
            DEFAULT_UTILS_IMAGE.to_string()
        } else {
            image
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_service_vars_builtins() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let svc = paths.service("myapp");

        let mut vars = ServiceVars::new(&svc, &[]).unwrap();
        assert_eq!(vars.service_name(), "myapp");
        assert!(!vars.dev_mode());

        vars.set_image_name("demo/app:1.0").unwrap();
        vars.set_dev_mode(true).unwrap();
        vars.save().unwrap();

        let reloaded = ServiceVars::load(&svc, &[]).unwrap();
        assert_eq!(reloaded.image_name(), "demo/app:1.0");
        assert!(reloaded.dev_mode());
        assert!(svc.vars_file().exists());
    }

    #[test]
    fn test_read_identity_ignores_manifest_keys() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let svc = paths.service("myapp");
        assert!(matches!(ServiceVars::read_identity(&svc), Err(DrunnerError::NoSuchFile(_))));

        let port = ConfigurationDefinition::new("PORT", "8080", "", ConfigType::Port, false, true);
        let mut vars = ServiceVars::new(&svc, &[port]).unwrap();
        vars.set_image_name("demo/app:1.0").unwrap();
        vars.save().unwrap();

        let (image, dev) = ServiceVars::read_identity(&svc).unwrap();
        assert_eq!(image, "demo/app:1.0");
        assert!(!dev);
    }

    #[test]
    fn test_service_name_is_memory_only() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let svc = paths.service("myapp");

        let vars = ServiceVars::new(&svc, &[]).unwrap();
        vars.save().unwrap();
        let text = std::fs::read_to_string(svc.vars_file()).unwrap();
        assert!(!text.contains(SERVICENAME));
    }

    #[test]
    fn test_manifest_cannot_redefine_builtins() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let clash = ConfigurationDefinition::new("imagename", "", "", ConfigType::String, false, true);
        assert!(matches!(
            ServiceVars::new(&paths.service("x"), &[clash]),
            Err(DrunnerError::CorruptManifest(_))
        ));
    }

    #[test]
    fn test_global_settings_defaults() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let settings = GlobalSettings::load(&paths).unwrap();
        assert!(settings.pull_images());
        assert_eq!(settings.utils_image(), DEFAULT_UTILS_IMAGE);
    }

    #[test]
    fn test_global_settings_persisted() {
        let tmp = TempDir::new().unwrap();
        let paths = DrunnerPaths::new(tmp.path());
        let mut settings = GlobalSettings::load(&paths).unwrap();
        settings
            .store_mut()
            .handle_configure_with(&["PULLIMAGES=false".to_string()], |_| None)
            .unwrap();

        let reloaded = GlobalSettings::load(&paths).unwrap();
        assert!(!reloaded.pull_images());
    }
}
