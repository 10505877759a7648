//! Execução dos hooks de ciclo de vida dentro da imagem principal
//!
//! Cada hook roda como um container descartável da imagem do serviço,
//! chamando o programa declarado em `[hooks] command` com
//! `<hook>_<fase> args...`. Os argumentos são diretórios do host, montados
//! no mesmo caminho dentro do container.

use crate::error::{DrunnerError, Result};
use crate::outcome::Outcome;
use crate::runtime::{ContainerRuntime, Mount, OneShot};
use drunner_sdk::{HookInvocation, HookKind, HookPhase, ENV_SERVICE_NAME, EXIT_HANDLED, EXIT_NOT_HANDLED};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub struct HookRunner<'a> {
    runtime: &'a dyn ContainerRuntime,
    service: String,
    image: String,
    command: Option<String>,
}

impl<'a> HookRunner<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        service: &str,
        image: &str,
        command: Option<&str>,
    ) -> Self {
        Self {
            runtime,
            service: service.to_string(),
            image: image.to_string(),
            command: command.map(str::to_string),
        }
    }

    /// Hook de início: falha do hook aborta a operação.
    pub fn start_hook(&self, kind: HookKind, args: &[PathBuf]) -> Result<Outcome> {
        match self.run(HookInvocation::new(kind, HookPhase::Start, path_args(args)), args)? {
            Outcome::Error(output) => Err(DrunnerError::HookFailed {
                hook: format!("{kind}_start"),
                output,
            }),
            other => Ok(other),
        }
    }

    /// Hook de fim: a operação já aconteceu, então falha vira aviso.
    pub fn end_hook(&self, kind: HookKind, args: &[PathBuf]) -> Outcome {
        let invocation = HookInvocation::new(kind, HookPhase::End, path_args(args));
        let name = invocation.event_name();
        match self.run(invocation, args) {
            Ok(Outcome::Error(output)) => {
                warn!("Hook {name} falhou: {}", output.trim());
                Outcome::Error(output)
            }
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Hook {name} falhou: {e}");
                Outcome::Error(e.to_string())
            }
        }
    }

    fn run(&self, invocation: HookInvocation, mounts: &[PathBuf]) -> Result<Outcome> {
        let name = invocation.event_name();

        let Some(command) = &self.command else {
            debug!("{} não declara hooks; ignorando {name}.", self.service);
            return Ok(Outcome::NoChange);
        };

        // Container inacessível é capacidade degradada, não erro.
        match self.runtime.image_exists(&self.image) {
            Ok(true) => {}
            Ok(false) => {
                warn!("Imagem {} indisponível; hook {name} não executado.", self.image);
                return Ok(Outcome::NoChange);
            }
            Err(e) => {
                warn!("Não foi possível consultar {}: {e}; hook {name} não executado.", self.image);
                return Ok(Outcome::NoChange);
            }
        }

        let mut request = OneShot::new(&self.image)
            .env(ENV_SERVICE_NAME, &self.service)
            .command(std::iter::once(command.clone()).chain(invocation.to_argv()));
        for path in mounts {
            let target = path.to_string_lossy().to_string();
            request = request.mount(Mount::bind(path, &target));
        }

        info!("Executando hook {name}.");
        let out = match self.runtime.run_one_shot(&request) {
            Ok(out) => out,
            Err(e) => {
                warn!("Hook {name} não pôde ser executado: {e}");
                return Ok(Outcome::NoChange);
            }
        };
        if !out.output.trim().is_empty() {
            debug!("{name}: {}", out.output.trim());
        }

        Ok(match out.exit_code {
            EXIT_HANDLED => Outcome::Success,
            EXIT_NOT_HANDLED => Outcome::NoChange,
            code => Outcome::Error(format!("código {code}: {}", out.output.trim())),
        })
    }
}

fn path_args(args: &[PathBuf]) -> Vec<String> {
    args.iter().map(|p| p.to_string_lossy().to_string()).collect()
}
