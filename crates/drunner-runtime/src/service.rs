//! Um serviço instalado: caminhos, manifest e variáveis carregados juntos

use crate::config::ServiceVars;
use crate::error::{DrunnerError, Result};
use crate::hooks::HookRunner;
use crate::manifest::{ManagedVolume, ServiceManifest};
use crate::paths::{validate_service_name, DrunnerPaths, ServicePaths};
use crate::runtime::ContainerRuntime;

pub struct Service {
    paths: ServicePaths,
    manifest: ServiceManifest,
    vars: ServiceVars,
}

impl Service {
    /// Carrega manifest e variáveis de um serviço instalado.
    pub fn load(paths: &DrunnerPaths, name: &str) -> Result<Self> {
        validate_service_name(name)?;
        let svc = paths.service(name);
        if !svc.is_installed() {
            return Err(DrunnerError::NotInstalled(name.to_string()));
        }

        let manifest = ServiceManifest::load(&svc.manifest_file())?;
        let vars = ServiceVars::load(&svc, &manifest.configuration)?;

        Ok(Self {
            paths: svc,
            manifest,
            vars,
        })
    }

    /// Verifica se a instalação está íntegra o suficiente para backup.
    pub fn check_valid(paths: &DrunnerPaths, name: &str) -> Result<Self> {
        validate_service_name(name)?;
        let service = Self::load(paths, name).map_err(|e| match e {
            DrunnerError::NotInstalled(_) => e,
            other => DrunnerError::ValidationFailed(format!(
                "o serviço {name} está danificado ({other}). Tente: drunner recover {name}"
            )),
        })?;

        if service.vars.store().get(crate::config::IMAGENAME).is_empty() {
            return Err(DrunnerError::ValidationFailed(format!(
                "o serviço {name} não tem IMAGENAME definido. Tente: drunner recover {name}"
            )));
        }
        Ok(service)
    }

    pub fn name(&self) -> &str {
        self.paths.name()
    }

    pub fn paths(&self) -> &ServicePaths {
        &self.paths
    }

    pub fn manifest(&self) -> &ServiceManifest {
        &self.manifest
    }

    pub fn vars(&self) -> &ServiceVars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut ServiceVars {
        &mut self.vars
    }

    pub fn image_name(&self) -> String {
        self.vars.image_name()
    }

    pub fn dev_mode(&self) -> bool {
        self.vars.dev_mode()
    }

    pub fn managed_volume_names(&self) -> Vec<String> {
        self.manifest.managed_volume_names(self.vars.store())
    }

    pub fn backup_volumes(&self) -> Vec<ManagedVolume> {
        self.manifest.backup_volumes(self.vars.store())
    }

    pub fn hooks<'a>(&self, runtime: &'a dyn ContainerRuntime) -> HookRunner<'a> {
        HookRunner::new(
            runtime,
            self.name(),
            &self.image_name(),
            self.manifest.hook_command(),
        )
    }
}
