//! Ciclo de vida de um dService
//!
//! `NotInstalled -> Installed -> (update) -> Uninstalled`, com `Obliterated`
//! como estado terminal. O uninstall só remove os arquivos do serviço e o
//! script de execução; volumes gerenciados e host volume ficam para um
//! `recover` ou reinstalação futura.

use crate::config::ServiceVars;
use crate::context::OperationContext;
use crate::error::{DrunnerError, Result};
use crate::manifest::{ServiceManifest, EMBEDDED_DIR};
use crate::outcome::Outcome;
use crate::paths::{validate_service_name, ServicePaths};
use crate::runtime::{Mount, OneShot};
use crate::service::Service;
use crate::validate::ImageValidator;
use crate::volumes::VolumeManager;
use drunner_sdk::HookKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Ponto de montagem do diretório do serviço durante a cópia dos arquivos da imagem.
const COPY_TARGET: &str = "/dservice";

/// Apaga um diretório ao sair do escopo, a menos que seja desarmado.
struct CleanupGuard {
    path: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            warn!("Desfazendo a instalação parcial em {}.", self.path.display());
            if let Err(e) = fs::remove_dir_all(&self.path) {
                error!("Não foi possível remover {}: {e}", self.path.display());
            }
        }
    }
}

/// Orquestrador das transições de ciclo de vida
pub struct Lifecycle<'a> {
    ctx: &'a mut OperationContext,
}

impl<'a> Lifecycle<'a> {
    pub fn new(ctx: &'a mut OperationContext) -> Self {
        Self { ctx }
    }

    /// Instala `name` a partir de `image`.
    pub fn install(&mut self, name: &str, image: &str, dev_mode: bool) -> Result<Outcome> {
        validate_service_name(name)?;
        let svc = self.ctx.paths().service(name);
        if svc.is_installed() {
            return Err(DrunnerError::AlreadyExists(name.to_string()));
        }
        self.ctx.paths().ensure_layout()?;

        info!("Instalando {name} a partir de {image}.");
        self.ctx.pull(image, dev_mode)?;
        ImageValidator::new(self.ctx.runtime()).validate(image)?;

        let service = self.recreate(&svc, image, dev_mode, false)?;
        service
            .hooks(self.ctx.runtime())
            .end_hook(HookKind::Install, &[]);

        info!("{name} instalado.");
        Ok(Outcome::Success)
    }

    /// Atualiza um serviço instalado para a versão atual da sua imagem.
    pub fn update(&mut self, name: &str) -> Result<Outcome> {
        let service = Service::load(self.ctx.paths(), name)?;
        let image = service.image_name();
        let dev_mode = service.dev_mode();

        service
            .hooks(self.ctx.runtime())
            .start_hook(HookKind::Update, &[])?;

        info!("Atualizando {name} ({image}).");
        self.ctx.pull(&image, dev_mode)?;
        let updated = self.recreate(service.paths(), &image, dev_mode, true)?;
        updated
            .hooks(self.ctx.runtime())
            .end_hook(HookKind::Update, &[]);

        info!("{name} atualizado.");
        Ok(Outcome::Success)
    }

    /// Remove os arquivos do serviço e o script de execução, mantendo os dados.
    pub fn uninstall(&mut self, name: &str) -> Result<Outcome> {
        validate_service_name(name)?;
        let svc = self.ctx.paths().service(name);
        if !svc.is_installed() {
            return Err(DrunnerError::NotInstalled(name.to_string()));
        }

        // Instalação danificada não impede o uninstall.
        match Service::load(self.ctx.paths(), name) {
            Ok(service) => {
                if let Err(e) = service
                    .hooks(self.ctx.runtime())
                    .start_hook(HookKind::Uninstall, &[])
                {
                    warn!("{e}; continuando a desinstalação.");
                }
            }
            Err(e) => warn!("Instalação de {name} danificada ({e}); hooks não executados."),
        }

        let dir = svc.service_dir();
        fs::remove_dir_all(dir).map_err(|e| DrunnerError::fs(dir, e))?;
        remove_launch_script(&svc)?;

        info!("{name} desinstalado. Volumes e host volume foram mantidos.");
        Ok(Outcome::Success)
    }

    /// Destrói o serviço por completo: arquivos, volumes gerenciados e host volume.
    ///
    /// Cada passo é tentado mesmo se um anterior falhar.
    pub fn obliterate(&mut self, name: &str) -> Outcome {
        if let Err(e) = validate_service_name(name) {
            return Outcome::error(e.to_string());
        }
        let svc = self.ctx.paths().service(name);
        let mut outcome = Outcome::NoChange;

        match Service::load(self.ctx.paths(), name) {
            Ok(service) => {
                if let Err(e) = service
                    .hooks(self.ctx.runtime())
                    .start_hook(HookKind::Obliterate, &[])
                {
                    warn!("{e}; continuando.");
                }
                // Container com o nome do serviço prende os volumes.
                outcome += self.remove_container(name);
                for volume in service.managed_volume_names() {
                    outcome += self.remove_volume(&volume);
                }
            }
            Err(DrunnerError::NotInstalled(_)) => debug!("{name} não está instalado."),
            Err(e) => warn!("Manifest de {name} ilegível ({e}); volumes gerenciados não serão removidos."),
        }

        outcome += self.remove_tree(svc.service_dir(), "arquivos do serviço");
        outcome += self.remove_tree(svc.host_volume(), "host volume");
        outcome += match remove_launch_script(&svc) {
            Ok(o) => o,
            Err(e) => {
                error!("{e}");
                Outcome::error(e.to_string())
            }
        };

        match &outcome {
            Outcome::Success => info!("{name} destruído."),
            Outcome::NoChange => info!("Nada a remover para {name}."),
            Outcome::Error(_) => error!("{name} não foi destruído por completo."),
        }
        outcome
    }

    /// Reinstala a partir da imagem registrada, preservando volumes e host volume.
    pub fn recover(&mut self, name: &str) -> Result<Outcome> {
        validate_service_name(name)?;
        let svc = self.ctx.paths().service(name);
        let unknown = |reason: String| {
            DrunnerError::ValidationFailed(format!(
                "não foi possível descobrir a imagem de {name} ({reason}). Use: drunner install IMAGEM {name}"
            ))
        };

        let (image, dev_mode) = ServiceVars::read_identity(&svc).map_err(|e| unknown(e.to_string()))?;
        if image.is_empty() {
            return Err(unknown("IMAGENAME vazio".to_string()));
        }

        match self.uninstall(name) {
            Ok(_) | Err(DrunnerError::NotInstalled(_)) => {}
            Err(e) => return Err(e),
        }
        self.install(name, &image, dev_mode)
    }

    /// Recria a árvore do serviço: tudo ou nada em relação ao diretório de instalação.
    fn recreate(
        &mut self,
        svc: &ServicePaths,
        image: &str,
        dev_mode: bool,
        updating: bool,
    ) -> Result<Service> {
        // 1. No update, baixar os containers enquanto o manifest antigo existe
        if updating {
            match ServiceManifest::load(&svc.manifest_file()) {
                Ok(old) => {
                    for container in &old.containers {
                        self.ctx.pull(&container.name, dev_mode)?;
                    }
                }
                Err(e) => warn!("Manifest anterior ilegível ({e})."),
            }
        }

        // 2. Árvore do serviço do zero
        let dir = svc.service_dir();
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| DrunnerError::fs(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| DrunnerError::fs(dir, e))?;
        let guard = CleanupGuard::new(dir);

        let host = svc.host_volume();
        if host.exists() {
            info!("Reutilizando o host volume existente em {}.", host.display());
        } else {
            fs::create_dir_all(host).map_err(|e| DrunnerError::fs(host, e))?;
        }

        // 3. Arquivos embutidos na imagem
        self.copy_embedded_files(svc, image)?;

        // 4. Manifest e variáveis (configuração anterior é mantida)
        let manifest = ServiceManifest::load(&svc.manifest_file()).map_err(|e| match e {
            DrunnerError::NoSuchFile(path) => DrunnerError::CorruptManifest(format!(
                "a imagem {image} não forneceu {}",
                path.display()
            )),
            other => other,
        })?;

        let mut vars = ServiceVars::new(svc, &manifest.configuration)?;
        if svc.vars_file().exists() {
            vars.store_mut().load()?;
        }
        vars.set_image_name(image)?;
        vars.set_dev_mode(dev_mode)?;
        vars.save()?;

        // 5. Containers declarados
        for container in &manifest.containers {
            self.ctx.pull(&container.name, dev_mode)?;
        }
        if !manifest.lists_image(image) {
            warn!("{image} não está entre os containers declarados no manifest.");
        }
        for entry in manifest.cron_entries() {
            debug!("Tarefa agendada: {} a cada {} min.", entry.function, entry.repeat_minutes);
        }

        // 6. Volumes gerenciados
        let volumes = manifest.managed_volume_names(vars.store());
        let utils_image = self.ctx.utils_image();
        VolumeManager::new(self.ctx.runtime(), &utils_image).ensure_volumes(&volumes)?;

        // 7. Script de execução
        write_launch_script(svc)?;

        let service = Service::load(self.ctx.paths(), svc.name())?;
        guard.disarm();
        Ok(service)
    }

    fn copy_embedded_files(&self, svc: &ServicePaths, image: &str) -> Result<()> {
        let dir = svc.service_dir();
        let mut script = format!("cp -r {EMBEDDED_DIR}/. {COPY_TARGET}/");
        if let Some((uid, gid)) = host_owner(dir) {
            script.push_str(&format!(" && chown -R {uid}:{gid} {COPY_TARGET}"));
        }

        let request = OneShot::new(image)
            .user("root")
            .mount(Mount::bind(dir, COPY_TARGET))
            .command(["sh", "-c", &script]);
        self.ctx
            .runtime()
            .run_checked(&request, &format!("cópia dos arquivos de {image}"))?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Outcome {
        let runtime = self.ctx.runtime();
        match runtime.container_exists(name) {
            Ok(false) => Outcome::NoChange,
            Ok(true) => {
                if runtime.container_running(name).unwrap_or(false) {
                    info!("Parando o container {name}.");
                }
                match runtime.remove_container(name) {
                    Ok(()) => {
                        info!("Container {name} removido.");
                        Outcome::Success
                    }
                    Err(e) => {
                        error!("Falha ao remover o container {name}: {e}");
                        Outcome::error(format!("container {name}: {e}"))
                    }
                }
            }
            Err(e) => {
                error!("Falha ao consultar o container {name}: {e}");
                Outcome::error(format!("container {name}: {e}"))
            }
        }
    }

    fn remove_volume(&self, volume: &str) -> Outcome {
        let runtime = self.ctx.runtime();
        let removed = runtime
            .volume_exists(volume)
            .and_then(|exists| if exists { runtime.remove_volume(volume).map(|_| true) } else { Ok(false) });

        match removed {
            Ok(true) => {
                info!("Volume {volume} removido.");
                Outcome::Success
            }
            Ok(false) => {
                debug!("Volume {volume} não existe.");
                Outcome::NoChange
            }
            Err(e) => {
                error!("Falha ao remover o volume {volume}: {e}");
                Outcome::error(format!("volume {volume}: {e}"))
            }
        }
    }

    /// Remove um diretório; arquivos de root deixados por containers são
    /// apagados via imagem utilitária.
    fn remove_tree(&self, path: &Path, what: &str) -> Outcome {
        if !path.exists() {
            return Outcome::NoChange;
        }
        if fs::remove_dir_all(path).is_err() {
            let request = OneShot::new(&self.ctx.utils_image())
                .user("root")
                .mount(Mount::bind(path, "/purge"))
                .command(["sh", "-c", "rm -rf /purge/* /purge/.[!.]* /purge/..?*"]);
            if let Err(e) = self.ctx.runtime().run_checked(&request, "limpeza como root") {
                warn!("{e}");
            }
        }

        match fs::remove_dir_all(path) {
            Ok(()) => {
                info!("Removido {what} em {}.", path.display());
                Outcome::Success
            }
            Err(e) if !path.exists() => {
                debug!("{}: {e}", path.display());
                Outcome::Success
            }
            Err(e) => {
                error!("Falha ao remover {what} em {}: {e}", path.display());
                Outcome::error(format!("{what}: {e}"))
            }
        }
    }
}

#[cfg(unix)]
fn host_owner(path: &Path) -> Option<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|m| (m.uid(), m.gid()))
}

#[cfg(not(unix))]
fn host_owner(_path: &Path) -> Option<(u32, u32)> {
    None
}

/// Conteúdo de `bin/<nome>`: repassa os argumentos ao drunner com o serviço fixo.
pub fn launch_script_contents(name: &str) -> String {
    format!("#!/bin/bash\ndrunner servicecmd \"{name}\" \"$@\"\n")
}

fn write_launch_script(svc: &ServicePaths) -> Result<()> {
    let path = svc.launch_script();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DrunnerError::fs(parent, e))?;
    }
    fs::write(path, launch_script_contents(svc.name())).map_err(|e| DrunnerError::fs(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| DrunnerError::fs(path, e))?;
    }

    debug!("Script de execução gravado em {}.", path.display());
    Ok(())
}

/// Remove `bin/<nome>`; ausência é `NoChange`.
pub fn remove_launch_script(svc: &ServicePaths) -> Result<Outcome> {
    let path = svc.launch_script();
    if !path.exists() {
        return Ok(Outcome::NoChange);
    }
    fs::remove_file(path).map_err(|e| DrunnerError::fs(path, e))?;
    Ok(Outcome::Success)
}
