//! Fakes para os testes: runtime de containers em diretórios e arquivador tar+gzip

use crate::archive::{Archiver, Passphrase};
use crate::backup::BackupRestore;
use crate::context::OperationContext;
use crate::error::{DrunnerError, Result};
use crate::lifecycle::Lifecycle;
use crate::paths::{DrunnerPaths, MANIFEST_FILE};
use crate::runtime::{CommandOutput, ContainerRuntime, Mount, OneShot};
use drunner_sdk::{HookInvocation, HookKind, HookPhase, ENV_SERVICE_NAME};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

pub const DEMO_IMAGE: &str = "demo/app:1.0";

pub const DEMO_MANIFEST: &str = r#"[hooks]
command = "/drunner/servicehook"

[[containers]]
name = "demo/app:1.0"

[[containers]]
name = "postgres:16"

[[volumes]]
name = "${SERVICENAME}_data"

[[volumes]]
name = "${SERVICENAME}_cache"
backup = false

[[volumes]]
name = "shared_certs"
external = true

[[configuration]]
key = "PORT"
default = "8080"
description = "Porta HTTP"
type = "port"
required = true

[[configuration]]
key = "ADMINPASS"
description = "Senha do administrador"
type = "password"

[[cron]]
repeat_minutes = 60
function = "cleanup"
"#;

/// Arquivo gravado pelo hook `backup_start` do fake.
const DUMP_FILE: &str = "dump.txt";

type Script = Box<dyn Fn(&OneShot) -> Option<(i32, String)> + Send + Sync>;

struct FakeImage {
    dir: PathBuf,
    uid: u32,
}

#[derive(Default)]
struct FakeState {
    pulls: Vec<String>,
    volumes: BTreeSet<String>,
    images: HashMap<String, FakeImage>,
    containers: HashMap<String, bool>,
    one_shots: Vec<OneShot>,
    hook_exits: HashMap<String, i32>,
    failing_volume_removals: HashSet<String>,
    ignored_volume_creations: HashSet<String>,
    restored_dumps: Vec<String>,
    script: Option<Script>,
}

/// Runtime falso: volumes são diretórios e imagens são pastas com o conteúdo de `/drunner`.
pub struct FakeRuntime {
    root: TempDir,
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("tempdir do fake"),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("mutex poisoned")
    }

    /// Registra uma imagem de dService com o manifest em `/drunner/dservice.toml`.
    pub fn add_image(&self, image: &str, manifest: &str) {
        let safe: String = image
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let dir = self.root.path().join("images").join(safe);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        self.state()
            .images
            .insert(image.to_string(), FakeImage { dir, uid: 1000 });
    }

    pub fn set_image_uid(&self, image: &str, uid: u32) {
        if let Some(img) = self.state().images.get_mut(image) {
            img.uid = uid;
        }
    }

    pub fn add_container(&self, name: &str, running: bool) {
        self.state().containers.insert(name.to_string(), running);
    }

    /// Código de saída do hook `event` (ex.: `backup_start`); o padrão é 0.
    pub fn set_hook_exit(&self, event: &str, code: i32) {
        self.state().hook_exits.insert(event.to_string(), code);
    }

    pub fn fail_remove_volume(&self, name: &str) {
        self.state().failing_volume_removals.insert(name.to_string());
    }

    /// `create_volume(name)` passa a retornar Ok sem criar o volume.
    pub fn ignore_volume_creation(&self, name: &str) {
        self.state().ignored_volume_creations.insert(name.to_string());
    }

    /// Intercepta `run_one_shot`; `None` segue o comportamento padrão.
    pub fn script_one_shot<F>(&self, f: F)
    where
        F: Fn(&OneShot) -> Option<(i32, String)> + Send + Sync + 'static,
    {
        self.state().script = Some(Box::new(f));
    }

    pub fn volume_dir(&self, name: &str) -> PathBuf {
        self.root.path().join("volumes").join(name)
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state().pulls.clone()
    }

    pub fn one_shots_matching(&self, needle: &str) -> Vec<OneShot> {
        self.state()
            .one_shots
            .iter()
            .filter(|r| r.command.join(" ").contains(needle))
            .cloned()
            .collect()
    }

    pub fn hook_calls(&self) -> Vec<OneShot> {
        self.state()
            .one_shots
            .iter()
            .filter(|r| hook_invocation(r).is_some())
            .cloned()
            .collect()
    }

    pub fn hook_events(&self) -> Vec<String> {
        self.state()
            .one_shots
            .iter()
            .filter_map(hook_invocation)
            .map(|i| i.event_name())
            .collect()
    }

    /// Conteúdo entregue aos hooks `restore_end`.
    pub fn restored_dumps(&self) -> Vec<String> {
        self.state().restored_dumps.clone()
    }

    fn run_hook(state: &mut FakeState, request: &OneShot, invocation: &HookInvocation) -> (i32, String) {
        let event = invocation.event_name();
        let code = state.hook_exits.get(&event).copied().unwrap_or(0);
        if code != 0 {
            return (code, format!("{event} falhou"));
        }

        let service = request
            .env
            .iter()
            .find(|(k, _)| k == ENV_SERVICE_NAME)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let dir = invocation.args.first().map(PathBuf::from);

        match (invocation.kind, invocation.phase, dir) {
            (HookKind::Backup, HookPhase::Start, Some(dir)) => {
                fs::write(dir.join(DUMP_FILE), format!("dump de {service}")).unwrap();
            }
            (HookKind::Restore, HookPhase::End, Some(dir)) => {
                if let Ok(dump) = fs::read_to_string(dir.join(DUMP_FILE)) {
                    state.restored_dumps.push(dump);
                }
            }
            _ => {}
        }
        (0, format!("{event} ok"))
    }
}

fn hook_invocation(request: &OneShot) -> Option<HookInvocation> {
    if request.command.len() < 2 {
        return None;
    }
    HookInvocation::parse(request.command[1..].iter().cloned()).ok()
}

impl ContainerRuntime for FakeRuntime {
    fn pull(&self, image: &str) -> Result<()> {
        self.state().pulls.push(image.to_string());
        Ok(())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state().images.contains_key(image))
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().volumes.contains(name))
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        if self.state().ignored_volume_creations.contains(name) {
            return Ok(());
        }
        let dir = self.volume_dir(name);
        fs::create_dir_all(&dir).map_err(|e| DrunnerError::fs(&dir, e))?;
        self.state().volumes.insert(name.to_string());
        Ok(())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.failing_volume_removals.contains(name) {
            return Err(DrunnerError::RuntimeCallFailed(format!("volume {name} em uso")));
        }
        if !state.volumes.remove(name) {
            return Err(DrunnerError::RuntimeCallFailed(format!("volume {name} não existe")));
        }
        let dir = self.volume_dir(name);
        fs::remove_dir_all(&dir).map_err(|e| DrunnerError::fs(&dir, e))
    }

    fn container_running(&self, name: &str) -> Result<bool> {
        Ok(self.state().containers.get(name).copied().unwrap_or(false))
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().containers.contains_key(name))
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.state().containers.remove(name);
        Ok(())
    }

    fn run_one_shot(&self, request: &OneShot) -> Result<CommandOutput> {
        let mut state = self.state();
        state.one_shots.push(request.clone());

        if let Some(script) = &state.script {
            if let Some((exit_code, output)) = script(request) {
                return Ok(CommandOutput { exit_code, output });
            }
        }

        let (exit_code, output) = if let Some(invocation) = hook_invocation(request) {
            Self::run_hook(&mut state, request, &invocation)
        } else {
            let line = request.command.join(" ");
            let image = state.images.get(&request.image);
            if line.contains("test -f") {
                match image {
                    Some(img) if img.dir.join(MANIFEST_FILE).exists() => (0, format!("{}\n", img.uid)),
                    _ => (1, String::new()),
                }
            } else if line.contains("cp -r") {
                let target = request.mounts.iter().find_map(|m| match m {
                    Mount::Bind { source, .. } => Some(source.clone()),
                    Mount::Volume { .. } => None,
                });
                match (image, target) {
                    (Some(img), Some(target)) => {
                        copy_dir(&img.dir, &target);
                        (0, String::new())
                    }
                    _ => (125, format!("Unable to find image '{}'", request.image)),
                }
            } else {
                (0, String::new())
            }
        };

        Ok(CommandOutput { exit_code, output })
    }
}

/// Cabeçalho da "cifra" de teste: guarda a senha para conferir no restore.
const FAKE_CIPHER_HEADER: &[u8] = b"DRUNNER-FAKE-CIPHER\n";

/// `Archiver` que trabalha direto nos diretórios do `FakeRuntime`, com tar+gzip reais.
pub struct DirArchiver {
    runtime: Arc<FakeRuntime>,
}

impl DirArchiver {
    pub fn new(runtime: Arc<FakeRuntime>) -> Self {
        Self { runtime }
    }

    fn pack(src: &Path, dest: &Path, cipher: Option<&Passphrase>) -> Result<()> {
        let io = |e| DrunnerError::fs(dest, e);
        let mut file = fs::File::create(dest).map_err(io)?;
        if let Some(pass) = cipher {
            file.write_all(FAKE_CIPHER_HEADER).map_err(io)?;
            file.write_all(format!("{}\n", pass.expose()).as_bytes()).map_err(io)?;
        }

        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.append_dir_all(".", src).map_err(io)?;
        builder.into_inner().map_err(io)?.finish().map_err(io)?;
        Ok(())
    }

    fn unpack(src: &Path, dest: &Path, cipher: Option<&Passphrase>) -> Result<()> {
        if !src.exists() {
            return Err(DrunnerError::NoSuchFile(src.to_path_buf()));
        }
        let io = |e| DrunnerError::fs(src, e);
        let mut reader = BufReader::new(fs::File::open(src).map_err(io)?);

        if let Some(pass) = cipher {
            let mut header = vec![0u8; FAKE_CIPHER_HEADER.len()];
            reader.read_exact(&mut header).map_err(io)?;
            let mut stored = Vec::new();
            reader.read_until(b'\n', &mut stored).map_err(io)?;
            if header != FAKE_CIPHER_HEADER || stored != format!("{}\n", pass.expose()).into_bytes() {
                return Err(DrunnerError::RuntimeCallFailed("bad decrypt".to_string()));
            }
        }

        fs::create_dir_all(dest).map_err(|e| DrunnerError::fs(dest, e))?;
        tar::Archive::new(GzDecoder::new(reader))
            .unpack(dest)
            .map_err(io)?;
        Ok(())
    }

    fn existing_volume(&self, volume: &str) -> Result<PathBuf> {
        if !self.runtime.volume_exists(volume)? {
            return Err(DrunnerError::RuntimeCallFailed(format!("volume {volume} não existe")));
        }
        Ok(self.runtime.volume_dir(volume))
    }
}

impl Archiver for DirArchiver {
    fn compress_volume(&self, pass: &Passphrase, volume: &str, dest_dir: &Path, file_name: &str, per_volume: bool) -> Result<()> {
        let src = self.existing_volume(volume)?;
        Self::pack(&src, &dest_dir.join(file_name), (!per_volume).then_some(pass))
    }

    fn decompress_volume(&self, pass: &Passphrase, volume: &str, src_dir: &Path, file_name: &str, per_volume: bool) -> Result<()> {
        let dest = self.existing_volume(volume)?;
        Self::unpack(&src_dir.join(file_name), &dest, (!per_volume).then_some(pass))
    }

    fn compress_folder(&self, pass: &Passphrase, folder: &Path, dest_dir: &Path, file_name: &str, per_volume: bool) -> Result<()> {
        if !folder.is_dir() {
            return Err(DrunnerError::NoSuchFile(folder.to_path_buf()));
        }
        Self::pack(folder, &dest_dir.join(file_name), (!per_volume).then_some(pass))
    }

    fn decompress_folder(&self, pass: &Passphrase, folder: &Path, src_dir: &Path, file_name: &str, per_volume: bool) -> Result<()> {
        Self::unpack(&src_dir.join(file_name), folder, (!per_volume).then_some(pass))
    }
}

/// Ambiente completo de teste: raiz do drunner, runtime falso e contexto.
pub struct TestEnv {
    pub runtime: Arc<FakeRuntime>,
    pub archiver: DirArchiver,
    pub pass: Passphrase,
    ctx: OperationContext,
    _root: TempDir,
    scratch: TempDir,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        runtime.add_image(DEMO_IMAGE, DEMO_MANIFEST);

        let ctx = OperationContext::new(DrunnerPaths::new(root.path()), runtime.clone()).unwrap();
        Self {
            archiver: DirArchiver::new(runtime.clone()),
            runtime,
            pass: Passphrase::new("s3nha"),
            ctx,
            _root: root,
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn paths(&self) -> &DrunnerPaths {
        self.ctx.paths()
    }

    /// Diretório fora da raiz do drunner, para arquivos de backup.
    pub fn scratch(&self) -> PathBuf {
        self.scratch.path().to_path_buf()
    }

    pub fn context(&mut self) -> &mut OperationContext {
        &mut self.ctx
    }

    pub fn lifecycle(&mut self) -> Lifecycle<'_> {
        Lifecycle::new(&mut self.ctx)
    }

    pub fn backup(&mut self) -> BackupRestore<'_> {
        BackupRestore::new(&mut self.ctx, &self.archiver, self.pass.clone())
    }
}

pub fn copy_dir(src: &Path, dest: &Path) {
    fs::create_dir_all(dest).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dest.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Snapshot de uma árvore: caminho relativo -> conteúdo (`None` para diretórios).
pub fn tree(dir: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(base).unwrap().to_path_buf();
            if path.is_dir() {
                out.insert(rel, None);
                walk(base, &path, out);
            } else {
                out.insert(rel, Some(fs::read(&path).unwrap()));
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_archiver_round_trip_with_cipher() {
        let runtime = Arc::new(FakeRuntime::new());
        let archiver = DirArchiver::new(runtime);
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/c.txt"), "conteúdo").unwrap();

        let out = TempDir::new().unwrap();
        let pass = Passphrase::new("x");
        archiver.compress_folder(&pass, src.path(), out.path(), "t.enc", false).unwrap();

        let dest = TempDir::new().unwrap();
        archiver.decompress_folder(&pass, dest.path(), out.path(), "t.enc", false).unwrap();
        assert_eq!(tree(dest.path()), tree(src.path()));

        let wrong = Passphrase::new("y");
        assert!(archiver
            .decompress_folder(&wrong, dest.path(), out.path(), "t.enc", false)
            .is_err());
    }
}
