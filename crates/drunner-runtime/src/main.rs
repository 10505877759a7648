use anyhow::Context;
use clap::{Parser, Subcommand};
use drunner_runtime::archive::{ArchiveCodec, Passphrase, PASS_ENV};
use drunner_runtime::backup::BackupRestore;
use drunner_runtime::config::ServiceVars;
use drunner_runtime::context::OperationContext;
use drunner_runtime::lifecycle::Lifecycle;
use drunner_runtime::outcome::Outcome;
use drunner_runtime::paths::{service_name_from_image, DrunnerPaths};
use drunner_runtime::runtime::{ContainerRuntime, DockerCli};
use drunner_runtime::service::Service;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "drunner",
    about = "drunner: instala e mantém dServices (aplicações em containers)"
)]
struct Args {
    /// Mostra mensagens de depuração
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Mostra só erros
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    silent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Instala um dService a partir de uma imagem
    Install {
        image: String,
        /// Nome do serviço (padrão: derivado da imagem)
        name: Option<String>,
        /// Modo desenvolvimento: nunca baixa imagens
        #[arg(long)]
        dev: bool,
    },
    /// Atualiza o serviço para a versão atual da imagem
    Update { name: String },
    /// Remove o serviço mantendo volumes e host volume
    Uninstall { name: String },
    /// Remove o serviço e todos os seus dados
    Obliterate { name: String },
    /// Reinstala a partir da imagem registrada
    Recover { name: String },
    /// Gera um backup cifrado (senha na variável PASS)
    Backup { name: String, file: PathBuf },
    /// Restaura um backup como um novo serviço
    Restore { file: PathBuf, name: String },
    /// Lista ou altera configurações (do serviço ou globais)
    Configure {
        #[arg(long)]
        service: Option<String>,
        args: Vec<String>,
    },
    /// Lista os serviços instalados
    List,
    /// Ponto de entrada do script bin/<serviço>
    #[command(hide = true)]
    Servicecmd {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else if args.silent {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn open_context(runtime: Arc<dyn ContainerRuntime>) -> anyhow::Result<OperationContext> {
    let paths = DrunnerPaths::from_env().context("não foi possível localizar o diretório do drunner")?;
    let ctx = OperationContext::new(paths, runtime).context("falha ao carregar as configurações globais")?;
    Ok(ctx)
}

fn backup(
    ctx: &mut OperationContext,
    runtime: Arc<dyn ContainerRuntime>,
    name: &str,
    file: &Path,
) -> anyhow::Result<Outcome> {
    let archiver = ArchiveCodec::new(runtime, &ctx.utils_image());
    let outcome = BackupRestore::new(ctx, &archiver, passphrase())
        .backup(name, file)
        .with_context(|| format!("backup de {name} falhou"))?;
    Ok(outcome)
}

fn restore(
    ctx: &mut OperationContext,
    runtime: Arc<dyn ContainerRuntime>,
    file: &Path,
    name: &str,
) -> anyhow::Result<Outcome> {
    let archiver = ArchiveCodec::new(runtime, &ctx.utils_image());
    let outcome = BackupRestore::new(ctx, &archiver, passphrase())
        .restore(file, name)
        .with_context(|| format!("restore de {} falhou", file.display()))?;
    Ok(outcome)
}

fn passphrase() -> Passphrase {
    let pass = Passphrase::from_env();
    if pass.expose().is_empty() {
        warn!("{PASS_ENV} não definida; usando senha vazia.");
    }
    pass
}

fn configure(ctx: &mut OperationContext, service: Option<&str>, args: &[String]) -> anyhow::Result<Outcome> {
    let Some(name) = service else {
        let outcome = ctx.settings_mut().store_mut().handle_configure(args)?;
        return Ok(outcome);
    };

    let mut service = Service::load(ctx.paths(), name)?;
    let outcome = service.vars_mut().store_mut().handle_configure(args)?;
    if let Err(e) = service.vars().store().check_required() {
        warn!("{e}");
    }
    Ok(outcome)
}

fn list_services(ctx: &OperationContext) -> anyhow::Result<Outcome> {
    let paths = ctx.paths();
    let services = paths.installed_services()?;

    println!("Serviços instalados em \"{}\":", paths.services().to_string_lossy());
    for name in &services {
        let image = ServiceVars::read_identity(&paths.service(name))
            .map(|(image, _)| image)
            .unwrap_or_else(|_| "?".to_string());
        println!("- {name:<30} {image}");
    }

    Ok(if services.is_empty() {
        Outcome::NoChange
    } else {
        Outcome::Success
    })
}

/// `bin/<serviço> <comando> ...` cai aqui.
fn service_command(
    ctx: &mut OperationContext,
    runtime: Arc<dyn ContainerRuntime>,
    name: &str,
    args: &[String],
) -> anyhow::Result<Outcome> {
    let Some((command, rest)) = args.split_first() else {
        println!("Uso: {name} COMANDO [ARGS...]");
        println!("Comandos: configure, update, uninstall, obliterate, recover, backup ARQUIVO");
        return Ok(Outcome::NoChange);
    };

    match (command.as_str(), rest) {
        ("configure", rest) => configure(ctx, Some(name), rest),
        ("update", []) => Ok(Lifecycle::new(ctx).update(name)?),
        ("uninstall", []) => Ok(Lifecycle::new(ctx).uninstall(name)?),
        ("obliterate", []) => Ok(Lifecycle::new(ctx).obliterate(name)),
        ("recover", []) => Ok(Lifecycle::new(ctx).recover(name)?),
        ("backup", [file]) => backup(ctx, runtime, name, Path::new(file)),
        _ => anyhow::bail!("comando desconhecido para {name}: {}", args.join(" ")),
    }
}

fn run(args: Args) -> anyhow::Result<Outcome> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new());
    let mut ctx = open_context(runtime.clone())?;

    let outcome = match args.command {
        Command::Install { image, name, dev } => {
            let name = name.unwrap_or_else(|| service_name_from_image(&image));
            Lifecycle::new(&mut ctx)
                .install(&name, &image, dev)
                .with_context(|| format!("instalação de {name} falhou"))?
        }
        Command::Update { name } => Lifecycle::new(&mut ctx)
            .update(&name)
            .with_context(|| format!("atualização de {name} falhou"))?,
        Command::Uninstall { name } => Lifecycle::new(&mut ctx)
            .uninstall(&name)
            .with_context(|| format!("desinstalação de {name} falhou"))?,
        Command::Obliterate { name } => Lifecycle::new(&mut ctx).obliterate(&name),
        Command::Recover { name } => Lifecycle::new(&mut ctx)
            .recover(&name)
            .with_context(|| format!("recuperação de {name} falhou"))?,
        Command::Backup { name, file } => backup(&mut ctx, runtime, &name, &file)?,
        Command::Restore { file, name } => restore(&mut ctx, runtime, &file, &name)?,
        Command::Configure { service, args } => configure(&mut ctx, service.as_deref(), &args)?,
        Command::List => list_services(&ctx)?,
        Command::Servicecmd { name, args } => service_command(&mut ctx, runtime, &name, &args)?,
    };

    Ok(outcome)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    let outcome = match run(args) {
        Ok(outcome) => outcome,
        Err(e) => {
            // Uma linha por falha fatal.
            error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    if let Some(msg) = outcome.message() {
        error!("{msg}");
    }
    ExitCode::from(outcome.exit_code() as u8)
}
