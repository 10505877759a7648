//! Contexto de uma operação (uma invocação do drunner)

use crate::config::GlobalSettings;
use crate::error::Result;
use crate::paths::DrunnerPaths;
use crate::runtime::{ContainerRuntime, PullCache};
use std::sync::Arc;
use tracing::debug;

/// Tudo que uma operação compartilha entre os passos: caminhos, runtime,
/// configurações globais e o registro de imagens já baixadas.
pub struct OperationContext {
    paths: DrunnerPaths,
    runtime: Arc<dyn ContainerRuntime>,
    settings: GlobalSettings,
    pulled: PullCache,
}

impl OperationContext {
    /// Carrega as configurações globais a partir de `paths`.
    pub fn new(paths: DrunnerPaths, runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        let settings = GlobalSettings::load(&paths)?;
        Ok(Self::with_settings(paths, runtime, settings))
    }

    pub fn with_settings(
        paths: DrunnerPaths,
        runtime: Arc<dyn ContainerRuntime>,
        settings: GlobalSettings,
    ) -> Self {
        Self {
            paths,
            runtime,
            settings,
            pulled: PullCache::new(),
        }
    }

    pub fn paths(&self) -> &DrunnerPaths {
        &self.paths
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GlobalSettings {
        &mut self.settings
    }

    pub fn utils_image(&self) -> String {
        self.settings.utils_image()
    }

    /// Baixa a imagem respeitando a política: nada em modo dev, nada com
    /// `PULLIMAGES=false`, e no máximo uma vez por operação.
    pub fn pull(&mut self, image: &str, dev_mode: bool) -> Result<()> {
        if dev_mode {
            debug!("Modo dev: não baixando {image}.");
            return Ok(());
        }
        if !self.settings.pull_images() {
            debug!("PULLIMAGES desativado: não baixando {image}.");
            return Ok(());
        }
        self.pulled.pull_once(self.runtime.as_ref(), image)
    }
}
