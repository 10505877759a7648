//! Backup e restore de um dService
//!
//! Layout do pacote antes da camada cifrada:
//!
//! ```text
//! drbackup/<volume>.tar     um tar comprimido por volume com backup
//! containerbackup/          arquivos gerados pelo hook do serviço
//! backupvars.json           imagem e modo dev do serviço original
//! drunner_hostvol.tar       tar comprimido do host volume
//! ```

use crate::archive::{Archiver, Passphrase};
use crate::context::OperationContext;
use crate::error::{DrunnerError, Result};
use crate::lifecycle::Lifecycle;
use crate::manifest::ManagedVolume;
use crate::outcome::Outcome;
use crate::paths::validate_service_name;
use crate::runtime::ContainerRuntime;
use crate::service::Service;
use drunner_sdk::HookKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const VOLUMES_DIR: &str = "drbackup";
const CONTAINER_DIR: &str = "containerbackup";
const VARS_FILE: &str = "backupvars.json";
const HOSTVOL_FILE: &str = "drunner_hostvol.tar";
const ARCHIVE_FILE: &str = "backup.tar.enc";

/// Registro gravado no backup para que o restore saiba o que instalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupVars {
    pub image_name: String,

    #[serde(default)]
    pub dev_mode: bool,

    /// Nome do serviço de origem (informativo).
    #[serde(default)]
    pub service_name: String,
}

impl BackupVars {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| DrunnerError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| DrunnerError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DrunnerError::CorruptBackup(format!(
                "{VARS_FILE} ausente no backup"
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| DrunnerError::fs(path, e))?;
        let vars: BackupVars = serde_json::from_str(&text)
            .map_err(|e| DrunnerError::CorruptBackup(format!("{VARS_FILE}: {e}")))?;
        if vars.image_name.trim().is_empty() {
            return Err(DrunnerError::CorruptBackup(format!(
                "{VARS_FILE} não informa a imagem"
            )));
        }
        Ok(vars)
    }
}

/// Diretórios temporários de uma operação de backup/restore, removidos no drop.
struct Staging {
    archive: TempDir,
    backup: TempDir,
}

impl Staging {
    fn new(temp_root: &Path) -> Result<Self> {
        fs::create_dir_all(temp_root).map_err(|e| DrunnerError::fs(temp_root, e))?;
        let make = |prefix: &str| {
            tempfile::Builder::new()
                .prefix(prefix)
                .tempdir_in(temp_root)
                .map_err(|e| DrunnerError::fs(temp_root, e))
        };
        Ok(Self {
            archive: make("archive-")?,
            backup: make("backup-")?,
        })
    }

    fn archive_dir(&self) -> &Path {
        self.archive.path()
    }

    fn root(&self) -> &Path {
        self.backup.path()
    }

    fn volumes_dir(&self) -> PathBuf {
        self.root().join(VOLUMES_DIR)
    }

    fn container_dir(&self) -> PathBuf {
        self.root().join(CONTAINER_DIR)
    }

    fn vars_file(&self) -> PathBuf {
        self.root().join(VARS_FILE)
    }
}

/// Mede e registra a duração de um passo.
fn timed<T>(step: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    let result = f()?;
    info!("{step} em {:.1?}.", started.elapsed());
    Ok(result)
}

/// Comprime cada volume para `dest_dir`, pulando tars já presentes e volumes ausentes.
pub fn snapshot_volumes(
    runtime: &dyn ContainerRuntime,
    archiver: &dyn Archiver,
    pass: &Passphrase,
    volumes: &[ManagedVolume],
    dest_dir: &Path,
) -> Result<Outcome> {
    fs::create_dir_all(dest_dir).map_err(|e| DrunnerError::fs(dest_dir, e))?;
    let mut outcome = Outcome::NoChange;

    for volume in volumes {
        let target = dest_dir.join(&volume.backup_name);
        if target.exists() {
            warn!(
                "{} já existe; pulando o volume {}.",
                target.display(),
                volume.name
            );
            continue;
        }
        if !runtime.volume_exists(&volume.name)? {
            warn!("Volume {} não existe; pulando.", volume.name);
            continue;
        }

        timed(&format!("Volume {} comprimido", volume.name), || {
            archiver.compress_volume(pass, &volume.name, dest_dir, &volume.backup_name, true)
        })?;
        outcome += Outcome::Success;
    }
    Ok(outcome)
}

/// Diretório de staging entregue ao hook; o container roda com qualquer UID.
fn create_shared_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| DrunnerError::fs(dir, e))?;
    open_to_all(dir)
}

fn open_to_all(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o777))
            .map_err(|e| DrunnerError::fs(dir, e))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn destination_taken(dest: &Path) -> DrunnerError {
    DrunnerError::ValidationFailed(format!(
        "o destino do backup já existe: {}",
        dest.display()
    ))
}

/// Move o arquivo para o destino sem nunca substituir um arquivo existente.
///
/// Usa hard link + remoção da origem; entre sistemas de arquivos, copia para
/// um temporário ao lado do destino e faz o link a partir dele.
fn move_into_place(src: &Path, dest: &Path) -> Result<()> {
    match fs::hard_link(src, dest) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(src) {
                debug!("{} não removido: {e}", src.display());
            }
            return Ok(());
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(destination_taken(dest)),
        Err(e) => debug!("hard link para {} falhou ({e}); copiando.", dest.display()),
    }

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "backup".to_string());
    let partial = dest.with_file_name(format!(".{file_name}.partial"));

    let linked = fs::copy(src, &partial).and_then(|_| fs::hard_link(&partial, dest));
    if let Err(e) = fs::remove_file(&partial) {
        debug!("{} não removido: {e}", partial.display());
    }
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(destination_taken(dest)),
        Err(e) => Err(DrunnerError::fs(dest, e)),
    }
}

/// Orquestrador de backup e restore
pub struct BackupRestore<'a> {
    ctx: &'a mut OperationContext,
    archiver: &'a dyn Archiver,
    pass: Passphrase,
}

impl<'a> BackupRestore<'a> {
    pub fn new(ctx: &'a mut OperationContext, archiver: &'a dyn Archiver, pass: Passphrase) -> Self {
        Self {
            ctx,
            archiver,
            pass,
        }
    }

    /// Gera um backup cifrado de `name` em `dest`.
    pub fn backup(&mut self, name: &str, dest: &Path) -> Result<Outcome> {
        // 1. Pré-condições, antes de qualquer mudança
        if dest.exists() {
            return Err(destination_taken(dest));
        }
        let service = Service::check_valid(self.ctx.paths(), name)?;
        let started = Instant::now();

        // 2. Staging (removido em qualquer saída)
        let staging = Staging::new(&self.ctx.paths().temp())?;
        create_shared_dir(&staging.volumes_dir())?;
        create_shared_dir(&staging.container_dir())?;

        // 3. Dados para o restore
        BackupVars {
            image_name: service.image_name(),
            dev_mode: service.dev_mode(),
            service_name: name.to_string(),
        }
        .save(&staging.vars_file())?;

        // 4. O serviço grava seus próprios dados
        let hook_args = [staging.container_dir()];
        let runtime = self.ctx.runtime();
        let hooks = service.hooks(runtime);
        hooks.start_hook(HookKind::Backup, &hook_args)?;

        // 5. Volumes
        snapshot_volumes(
            runtime,
            self.archiver,
            &self.pass,
            &service.backup_volumes(),
            &staging.volumes_dir(),
        )?;

        // 6. Host volume
        timed("Host volume comprimido", || {
            self.archiver.compress_folder(
                &self.pass,
                service.paths().host_volume(),
                staging.root(),
                HOSTVOL_FILE,
                true,
            )
        })?;

        // 7. Fim do snapshot
        hooks.end_hook(HookKind::Backup, &hook_args);

        // 8. Camada cifrada e rename para o destino
        timed("Pacote comprimido e cifrado", || {
            self.archiver.compress_folder(
                &self.pass,
                staging.root(),
                staging.archive_dir(),
                ARCHIVE_FILE,
                false,
            )
        })?;
        let archive = staging.archive_dir().join(ARCHIVE_FILE);
        if !archive.exists() {
            return Err(DrunnerError::RuntimeCallFailed(format!(
                "{} não foi gerado",
                archive.display()
            )));
        }
        move_into_place(&archive, dest)?;

        info!(
            "Backup de {name} gravado em {} ({:.1?}).",
            dest.display(),
            started.elapsed()
        );
        Ok(Outcome::Success)
    }

    /// Restaura `backup` como um novo serviço `name`.
    pub fn restore(&mut self, backup: &Path, name: &str) -> Result<Outcome> {
        // 1. Backup existe
        if !backup.is_file() {
            return Err(DrunnerError::NoSuchFile(backup.to_path_buf()));
        }
        validate_service_name(name)?;

        // 2. Staging
        let staging = Staging::new(&self.ctx.paths().temp())?;

        // 3. Cópia e abertura da camada cifrada
        let local = staging.archive_dir().join(ARCHIVE_FILE);
        fs::copy(backup, &local).map_err(|e| DrunnerError::fs(&local, e))?;
        timed("Pacote decifrado", || {
            self.archiver.decompress_folder(
                &self.pass,
                staging.root(),
                staging.archive_dir(),
                ARCHIVE_FILE,
                false,
            )
        })?;

        // 4-5. Conteúdo mínimo do pacote
        let vars = BackupVars::load(&staging.vars_file())?;
        if !staging.container_dir().is_dir() {
            return Err(DrunnerError::CorruptBackup(format!(
                "{CONTAINER_DIR} ausente no backup"
            )));
        }

        // 6. Destino livre
        if self.ctx.paths().service(name).is_installed() {
            return Err(DrunnerError::AlreadyExists(name.to_string()));
        }

        // 7. Instalação limpa a partir da imagem do backup
        info!("Restaurando {name} a partir de {} ({}).", backup.display(), vars.image_name);
        Lifecycle::new(self.ctx).install(name, &vars.image_name, vars.dev_mode)?;

        // 8. Manifest do serviço recém-instalado
        let service = Service::load(self.ctx.paths(), name)?;
        let runtime = self.ctx.runtime();

        // 9. Volumes
        for volume in service.backup_volumes() {
            if !runtime.volume_exists(&volume.name)? {
                return Err(DrunnerError::RuntimeCallFailed(format!(
                    "o volume {} deveria ter sido criado pelo install",
                    volume.name
                )));
            }
            if !staging.volumes_dir().join(&volume.backup_name).exists() {
                return Err(DrunnerError::CorruptBackup(format!(
                    "{} ausente no backup",
                    volume.backup_name
                )));
            }
            timed(&format!("Volume {} restaurado", volume.name), || {
                self.archiver.decompress_volume(
                    &self.pass,
                    &volume.name,
                    &staging.volumes_dir(),
                    &volume.backup_name,
                    true,
                )
            })?;
        }

        // 10. Host volume
        if staging.root().join(HOSTVOL_FILE).exists() {
            self.archiver.decompress_folder(
                &self.pass,
                service.paths().host_volume(),
                staging.root(),
                HOSTVOL_FILE,
                true,
            )?;
        } else {
            warn!("{HOSTVOL_FILE} ausente no backup; host volume não restaurado.");
        }

        // 11. O serviço reaplica seus próprios dados
        open_to_all(&staging.container_dir())?;
        service
            .hooks(runtime)
            .end_hook(HookKind::Restore, &[staging.container_dir()]);

        debug!("Staging de restore removido.");
        info!("{name} restaurado.");
        Ok(Outcome::Success)
    }
}
