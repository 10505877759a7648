//! Protocolo de hooks entre o drunner (host) e o dService (container).
//!
//! O host executa o comando de hook declarado no manifest dentro do container
//! principal, passando como primeiro argumento `<hook>_<fase>` (por exemplo
//! `backup_start`) e, em seguida, os caminhos dos diretórios de staging
//! compartilhados. O container responde apenas pelo código de saída.

use std::fmt;
use std::str::FromStr;

/// O hook foi tratado com sucesso.
pub const EXIT_HANDLED: i32 = 0;

/// Erro genérico do hook (o host decide se aborta ou só avisa).
pub const EXIT_FAILED: i32 = 1;

/// O dService não implementa esse hook; o host trata como "sem mudanças".
pub const EXIT_NOT_HANDLED: i32 = 3;

/// Variável de ambiente com o nome do serviço dentro do container de hook.
pub const ENV_SERVICE_NAME: &str = "SERVICENAME";

/// Evento do ciclo de vida que dispara um hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Install,
    Update,
    Uninstall,
    Obliterate,
    Backup,
    Restore,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::Install,
        HookKind::Update,
        HookKind::Uninstall,
        HookKind::Obliterate,
        HookKind::Backup,
        HookKind::Restore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Install => "install",
            HookKind::Update => "update",
            HookKind::Uninstall => "uninstall",
            HookKind::Obliterate => "obliterate",
            HookKind::Backup => "backup",
            HookKind::Restore => "restore",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError(format!("hook desconhecido: '{s}'")))
    }
}

/// Fase do hook: antes (`Start`) ou depois (`End`) do trabalho principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Start,
    End,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::Start => "start",
            HookPhase::End => "end",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(HookPhase::Start),
            "end" => Ok(HookPhase::End),
            _ => Err(ProtocolError(format!("fase de hook desconhecida: '{s}'"))),
        }
    }
}

/// Erro de decodificação da linha de comando de um hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError(pub String);

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// Uma chamada de hook: tipo, fase e argumentos (caminhos de staging).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    pub kind: HookKind,
    pub phase: HookPhase,
    pub args: Vec<String>,
}

impl HookInvocation {
    pub fn new(kind: HookKind, phase: HookPhase, args: Vec<String>) -> Self {
        Self { kind, phase, args }
    }

    /// Nome do evento, como `restore_end`.
    pub fn event_name(&self) -> String {
        format!("{}_{}", self.kind, self.phase)
    }

    /// Argumentos passados ao comando de hook no container.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.event_name());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Decodifica os argumentos recebidos pelo programa de hook (sem o argv[0]).
    pub fn parse<I, S>(argv: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let event = iter
            .next()
            .ok_or_else(|| ProtocolError("nenhum evento de hook informado".to_string()))?;

        let (kind, phase) = event
            .rsplit_once('_')
            .ok_or_else(|| ProtocolError(format!("evento de hook mal formado: '{event}'")))?;

        Ok(Self {
            kind: kind.parse()?,
            phase: phase.parse()?,
            args: iter.collect(),
        })
    }
}

/// Resultado de um handler de hook escrito em Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResponse {
    Handled,
    NotHandled,
}

/// Executa um handler de hook dentro do container e devolve o código de saída.
///
/// Uso típico no binário de hook do dService:
///
/// ```no_run
/// use drunner_sdk::{run, HookKind, HookPhase, HookResponse};
///
/// fn main() {
///     std::process::exit(run(|hook| match (hook.kind, hook.phase) {
///         (HookKind::Backup, HookPhase::Start) => {
///             // grava um dump em hook.args[0]
///             Ok(HookResponse::Handled)
///         }
///         _ => Ok(HookResponse::NotHandled),
///     }));
/// }
/// ```
pub fn run<F>(handler: F) -> i32
where
    F: FnOnce(&HookInvocation) -> Result<HookResponse, Box<dyn std::error::Error>>,
{
    let hook = match HookInvocation::parse(std::env::args().skip(1)) {
        Ok(hook) => hook,
        Err(e) => {
            eprintln!("[drunner-sdk] {e}");
            return EXIT_FAILED;
        }
    };

    match handler(&hook) {
        Ok(HookResponse::Handled) => EXIT_HANDLED,
        Ok(HookResponse::NotHandled) => EXIT_NOT_HANDLED,
        Err(e) => {
            eprintln!("[drunner-sdk] hook {} falhou: {e}", hook.event_name());
            EXIT_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_and_argv() {
        let hook = HookInvocation::new(
            HookKind::Backup,
            HookPhase::Start,
            vec!["/tmp/containerbackup".to_string()],
        );
        assert_eq!(hook.event_name(), "backup_start");
        assert_eq!(hook.to_argv(), vec!["backup_start", "/tmp/containerbackup"]);
    }

    #[test]
    fn test_parse_argv() {
        let hook = HookInvocation::parse(["restore_end", "/staging/c"]).unwrap();
        assert_eq!(hook.kind, HookKind::Restore);
        assert_eq!(hook.phase, HookPhase::End);
        assert_eq!(hook.args, vec!["/staging/c".to_string()]);
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        assert!(HookInvocation::parse(["deploy_start"]).is_err());
        assert!(HookInvocation::parse(["install"]).is_err());
        assert!(HookInvocation::parse(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_kind_from_str_is_case_insensitive() {
        assert_eq!("OBLITERATE".parse::<HookKind>().unwrap(), HookKind::Obliterate);
    }
}
