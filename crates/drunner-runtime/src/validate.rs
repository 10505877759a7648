//! Validação de imagens de dService

use crate::error::{DrunnerError, Result};
use crate::manifest::EMBEDDED_DIR;
use crate::paths::MANIFEST_FILE;
use crate::runtime::{ContainerRuntime, OneShot};
use tracing::{debug, warn};

/// Validador do contrato mínimo de uma imagem de dService
pub struct ImageValidator<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> ImageValidator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Verifica que a imagem traz o manifest em `/drunner` e avisa se roda como root
    pub fn validate(&self, image: &str) -> Result<()> {
        // 1. Manifest presente no diretório embutido; 2. UID do usuário padrão
        let manifest = format!("{EMBEDDED_DIR}/{MANIFEST_FILE}");
        let request = OneShot::new(image)
            .command(["sh", "-c", &format!("test -f {manifest} && id -u")]);

        let out = self.runtime.run_one_shot(&request)?;
        if !out.success() {
            return Err(DrunnerError::ValidationFailed(format!(
                "a imagem {image} não é um dService: {manifest} não encontrado"
            )));
        }

        // 3. Rodar como root funciona, mas não é recomendado
        match out.output.lines().last().map(str::trim) {
            Some("0") => warn!("A imagem {image} roda como root; prefira um usuário sem privilégios."),
            Some(uid) => debug!("{image} roda com UID {uid}."),
            None => debug!("{image} não informou o UID."),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    #[test]
    fn test_valid_image() {
        let runtime = FakeRuntime::new();
        runtime.add_image("demo/app:1.0", "");
        assert!(ImageValidator::new(&runtime).validate("demo/app:1.0").is_ok());
    }

    #[test]
    fn test_image_without_manifest() {
        let runtime = FakeRuntime::new();
        let err = ImageValidator::new(&runtime)
            .validate("busybox")
            .unwrap_err();
        assert!(matches!(err, DrunnerError::ValidationFailed(msg) if msg.contains("dservice.toml")));
    }

    #[test]
    fn test_root_image_is_accepted() {
        let runtime = FakeRuntime::new();
        runtime.add_image("demo/root:1.0", "");
        runtime.set_image_uid("demo/root:1.0", 0);
        assert!(ImageValidator::new(&runtime).validate("demo/root:1.0").is_ok());
    }
}
