//! Compressão e criptografia das camadas do backup
//!
//! Os tars por volume são só comprimidos (`tar -czf`); a camada externa é
//! comprimida e cifrada com `openssl enc -aes-256-cbc -pbkdf2`. Tudo roda em
//! containers descartáveis da imagem utilitária. A senha chega ao container
//! pelo ambiente e nunca aparece em argumentos ou logs.

use crate::error::{DrunnerError, Result};
use crate::runtime::{ContainerRuntime, Mount, OneShot};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Variável de ambiente com a senha do backup.
pub const PASS_ENV: &str = "PASS";

const OPENSSL: &str = "openssl enc -aes-256-cbc -pbkdf2 -salt -pass env:PASS";

/// Senha do backup. Nunca é persistida nem impressa.
#[derive(Clone, Default)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Lê `PASS` do ambiente; ausente equivale a senha vazia.
    pub fn from_env() -> Self {
        Self(std::env::var(PASS_ENV).unwrap_or_default())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<oculta>)")
    }
}

/// Operações de arquivo usadas pelo backup/restore.
///
/// `per_volume = true` só comprime; `false` comprime e cifra com a senha.
pub trait Archiver {
    fn compress_volume(
        &self,
        pass: &Passphrase,
        volume: &str,
        dest_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()>;

    fn decompress_volume(
        &self,
        pass: &Passphrase,
        volume: &str,
        src_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()>;

    fn compress_folder(
        &self,
        pass: &Passphrase,
        folder: &Path,
        dest_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()>;

    fn decompress_folder(
        &self,
        pass: &Passphrase,
        folder: &Path,
        src_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()>;
}

/// `Archiver` real, via containers da imagem utilitária.
pub struct ArchiveCodec {
    runtime: Arc<dyn ContainerRuntime>,
    utils_image: String,
}

impl ArchiveCodec {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, utils_image: &str) -> Self {
        Self {
            runtime,
            utils_image: utils_image.to_string(),
        }
    }

    fn compress(
        &self,
        pass: &Passphrase,
        source: Mount,
        dest_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        check_file_name(file_name)?;
        let target = format!("/dst/{file_name}");
        let script = if per_volume {
            format!("tar -czf '{target}' -C /src . && chmod a+rw '{target}'")
        } else {
            format!("set -o pipefail; tar -cz -C /src . | {OPENSSL} -out '{target}' && chmod a+rw '{target}'")
        };

        let what = format!("compressão de {}", describe_source(&source));
        let request = self.request(pass, per_volume, [source, Mount::bind(dest_dir, "/dst")], &script);
        self.runtime.run_checked(&request, &what)?;

        // O container pode sair com 0 sem gerar o arquivo.
        let produced = dest_dir.join(file_name);
        if !produced.exists() {
            return Err(DrunnerError::RuntimeCallFailed(format!(
                "{what}: {} não foi gerado",
                produced.display()
            )));
        }
        debug!("Gerado {}", produced.display());
        Ok(())
    }

    fn decompress(
        &self,
        pass: &Passphrase,
        target: Mount,
        src_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        check_file_name(file_name)?;
        let archive = src_dir.join(file_name);
        if !archive.exists() {
            return Err(DrunnerError::NoSuchFile(archive));
        }

        let source = format!("/src/{file_name}");
        let script = if per_volume {
            format!("tar -xzf '{source}' -C /dst")
        } else {
            format!("set -o pipefail; {OPENSSL} -d -in '{source}' | tar -xz -C /dst")
        };

        let what = format!("descompressão para {}", describe_source(&target));
        let request = self.request(pass, per_volume, [target, Mount::bind(src_dir, "/src")], &script);
        self.runtime.run_checked(&request, &what)?;
        Ok(())
    }

    fn request(
        &self,
        pass: &Passphrase,
        per_volume: bool,
        mounts: [Mount; 2],
        script: &str,
    ) -> OneShot {
        let request = mounts
            .into_iter()
            .fold(OneShot::new(&self.utils_image).user("root"), OneShot::mount)
            .script(script);
        if per_volume {
            request
        } else {
            request.secret_env(PASS_ENV, pass.expose())
        }
    }
}

fn describe_source(mount: &Mount) -> String {
    match mount {
        Mount::Volume { name, .. } => format!("volume {name}"),
        Mount::Bind { source, .. } => source.display().to_string(),
    }
}

/// Nomes de arquivo vão para um script shell entre aspas simples.
fn check_file_name(file_name: &str) -> Result<()> {
    let valid = !file_name.is_empty()
        && !file_name.contains(['/', '\'', '\\'])
        && file_name != "."
        && file_name != "..";
    if valid {
        Ok(())
    } else {
        Err(DrunnerError::ValidationFailed(format!(
            "nome de arquivo inválido para o backup: '{file_name}'"
        )))
    }
}

impl Archiver for ArchiveCodec {
    fn compress_volume(
        &self,
        pass: &Passphrase,
        volume: &str,
        dest_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        self.compress(pass, Mount::volume(volume, "/src"), dest_dir, file_name, per_volume)
    }

    fn decompress_volume(
        &self,
        pass: &Passphrase,
        volume: &str,
        src_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        self.decompress(pass, Mount::volume(volume, "/dst"), src_dir, file_name, per_volume)
    }

    fn compress_folder(
        &self,
        pass: &Passphrase,
        folder: &Path,
        dest_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        if !folder.is_dir() {
            return Err(DrunnerError::NoSuchFile(folder.to_path_buf()));
        }
        self.compress(pass, Mount::bind(folder, "/src"), dest_dir, file_name, per_volume)
    }

    fn decompress_folder(
        &self,
        pass: &Passphrase,
        folder: &Path,
        src_dir: &Path,
        file_name: &str,
        per_volume: bool,
    ) -> Result<()> {
        std::fs::create_dir_all(folder).map_err(|e| DrunnerError::fs(folder, e))?;
        self.decompress(pass, Mount::bind(folder, "/dst"), src_dir, file_name, per_volume)
    }
}
