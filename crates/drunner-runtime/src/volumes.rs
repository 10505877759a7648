//! Criação e permissões dos volumes gerenciados

use crate::error::{DrunnerError, Result};
use crate::runtime::{ContainerRuntime, Mount, OneShot};
use tracing::{debug, info};

pub struct VolumeManager<'a> {
    runtime: &'a dyn ContainerRuntime,
    utils_image: String,
}

impl<'a> VolumeManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, utils_image: &str) -> Self {
        Self {
            runtime,
            utils_image: utils_image.to_string(),
        }
    }

    /// Garante que cada volume existe e pode ser acessado por qualquer UID.
    ///
    /// Volume já existente não é erro; falha ao ajustar permissões é.
    pub fn ensure_volumes(&self, names: &[String]) -> Result<()> {
        for name in names {
            if self.runtime.volume_exists(name)? {
                info!("Volume {name} já existe.");
            } else {
                info!("Criando volume {name}.");
                self.runtime.create_volume(name)?;
            }

            // Permissões reaplicadas sempre.
            let request = OneShot::new(&self.utils_image)
                .user("root")
                .mount(Mount::volume(name, "/vol"))
                .command(["chmod", "0777", "/vol"]);
            let out = self.runtime.run_one_shot(&request)?;
            if !out.success() {
                return Err(DrunnerError::RuntimeCallFailed(format!(
                    "não foi possível ajustar as permissões do volume {name}: {}",
                    out.output.trim()
                )));
            }
            debug!("Permissões de {name} ajustadas para 0777.");
        }
        Ok(())
    }
}
