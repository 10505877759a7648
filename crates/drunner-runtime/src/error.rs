//! Erros de domínio do drunner

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrunnerError {
    #[error("O serviço '{0}' já existe. Tente: drunner update {0}")]
    AlreadyExists(String),

    #[error("O serviço '{0}' não está instalado.")]
    NotInstalled(String),

    #[error("Manifest corrompido: {0}")]
    CorruptManifest(String),

    #[error("Backup corrompido: {0}")]
    CorruptBackup(String),

    #[error("A configuração '{0}' não é reconhecida.")]
    UnrecognisedKey(String),

    #[error("Não é permitido sobrescrever '{0}'.")]
    NotUserSettable(String),

    #[error("Arquivo de configurações corrompido em {path}: {reason}")]
    CorruptSettings { path: PathBuf, reason: String },

    #[error("O arquivo não existe: {0}")]
    NoSuchFile(PathBuf),

    #[error("Não foi possível gravar {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Chamada ao runtime de containers falhou: {0}")]
    RuntimeCallFailed(String),

    #[error("Falha de sistema de arquivos em {path}: {source}")]
    FilesystemFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validação falhou: {0}")]
    ValidationFailed(String),

    #[error("Hook {hook} falhou: {output}")]
    HookFailed { hook: String, output: String },
}

impl DrunnerError {
    /// Atalho para erros de IO associados a um caminho.
    pub fn fs(path: &Path, source: std::io::Error) -> Self {
        DrunnerError::FilesystemFailed {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DrunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_keeps_path() {
        let err = DrunnerError::fs(
            Path::new("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "negado"),
        );
        assert!(err.to_string().contains("/tmp/x"));
        assert!(err.to_string().contains("negado"));
    }
}
