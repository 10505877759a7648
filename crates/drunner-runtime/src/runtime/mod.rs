//! Fronteira com o runtime de containers (docker)
//!
//! O resto do drunner só conversa com o trait [`ContainerRuntime`]; a
//! implementação real chama o CLI do docker e os testes usam um fake.

mod docker;

pub use docker::DockerCli;

use crate::error::{DrunnerError, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Ponto de montagem de um container descartável.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    /// Volume do docker montado em `target`.
    Volume { name: String, target: String },
    /// Diretório do host montado em `target`.
    Bind { source: PathBuf, target: String },
}

impl Mount {
    pub fn volume(name: &str, target: &str) -> Self {
        Mount::Volume {
            name: name.to_string(),
            target: target.to_string(),
        }
    }

    pub fn bind(source: impl Into<PathBuf>, target: &str) -> Self {
        Mount::Bind {
            source: source.into(),
            target: target.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Mount::Volume { target, .. } | Mount::Bind { target, .. } => target,
        }
    }

    /// Argumento no formato de `docker run -v`.
    pub fn to_arg(&self) -> String {
        match self {
            Mount::Volume { name, target } => format!("{name}:{target}"),
            Mount::Bind { source, target } => format!("{}:{target}", source.display()),
        }
    }
}

/// Execução de um container descartável (`docker run --rm`).
#[derive(Debug, Clone, Default)]
pub struct OneShot {
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    /// Variáveis sensíveis: repassadas só pelo nome, nunca na linha de comando.
    pub secret_env: Vec<(String, String)>,
    pub user: Option<String>,
}

impl OneShot {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Self::default()
        }
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    /// Atalho para `bash -c <script>`.
    pub fn script(self, script: &str) -> Self {
        self.command(["bash", "-c", script])
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn secret_env(mut self, key: &str, value: &str) -> Self {
        self.secret_env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    /// Descrição para logs; valores sensíveis nunca aparecem.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.image.clone()];
        parts.extend(self.mounts.iter().map(|m| format!("-v {}", m.to_arg())));
        parts.extend(self.env.iter().map(|(k, v)| format!("-e {k}={v}")));
        parts.extend(self.secret_env.iter().map(|(k, _)| format!("-e {k}=<oculto>")));
        parts.extend(self.command.iter().cloned());
        parts.join(" ")
    }
}

/// Saída de um comando: código de saída e stdout+stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Primitivas do runtime de containers consumidas pelo drunner.
pub trait ContainerRuntime: Send + Sync {
    fn pull(&self, image: &str) -> Result<()>;
    fn image_exists(&self, image: &str) -> Result<bool>;
    fn volume_exists(&self, name: &str) -> Result<bool>;
    fn create_volume(&self, name: &str) -> Result<()>;
    fn remove_volume(&self, name: &str) -> Result<()>;
    fn container_running(&self, name: &str) -> Result<bool>;
    fn container_exists(&self, name: &str) -> Result<bool>;
    fn remove_container(&self, name: &str) -> Result<()>;
    fn run_one_shot(&self, request: &OneShot) -> Result<CommandOutput>;

    /// Como `run_one_shot`, mas código de saída diferente de zero vira erro.
    fn run_checked(&self, request: &OneShot, what: &str) -> Result<CommandOutput> {
        let out = self.run_one_shot(request)?;
        if !out.success() {
            return Err(DrunnerError::RuntimeCallFailed(format!(
                "{what} (código {}): {}",
                out.exit_code,
                out.output.trim()
            )));
        }
        Ok(out)
    }
}

/// Imagens já baixadas nesta operação.
#[derive(Debug, Default)]
pub struct PullCache {
    pulled: HashSet<String>,
}

impl PullCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, image: &str) -> bool {
        self.pulled.contains(image)
    }

    /// Baixa a imagem uma única vez por operação.
    pub fn pull_once(&mut self, runtime: &dyn ContainerRuntime, image: &str) -> Result<()> {
        if self.pulled.contains(image) {
            debug!("{image} já foi baixada nesta operação.");
            return Ok(());
        }
        runtime.pull(image)?;
        self.pulled.insert(image.to_string());
        Ok(())
    }
}
