//! Armazenamento tipado de configurações, persistido em JSON

use super::definition::ConfigurationDefinition;
use super::variables::Variables;
use crate::error::{DrunnerError, Result};
use crate::outcome::Outcome;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Valor mostrado no lugar de senhas.
const MASK: &str = "xxxxxxxx";

/// Store com duas camadas: persistida (arquivo JSON) e somente em memória.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    owner: String,
    path: PathBuf,
    definitions: Vec<ConfigurationDefinition>,
    persisted: Variables,
    memory: Variables,
}

impl ConfigStore {
    /// Cria o store aplicando os valores padrão das definições.
    pub fn new(
        owner: &str,
        path: impl Into<PathBuf>,
        definitions: Vec<ConfigurationDefinition>,
    ) -> Result<Self> {
        for (i, def) in definitions.iter().enumerate() {
            if definitions[..i].iter().any(|other| other.matches(&def.key)) {
                return Err(DrunnerError::ValidationFailed(format!(
                    "configuração '{}' definida mais de uma vez",
                    def.key
                )));
            }
        }

        let mut persisted = Variables::new();
        for def in &definitions {
            persisted.set(&def.key, &def.default);
        }

        Ok(Self {
            owner: owner.to_string(),
            path: path.into(),
            definitions,
            persisted,
            memory: Variables::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definitions(&self) -> &[ConfigurationDefinition] {
        &self.definitions
    }

    pub fn definition(&self, key: &str) -> Option<&ConfigurationDefinition> {
        self.definitions.iter().find(|d| d.matches(key))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Valor atual (camada persistida primeiro, depois memória); vazio se indefinido.
    pub fn get(&self, key: &str) -> String {
        self.persisted
            .get(key)
            .or_else(|| self.memory.get(key))
            .unwrap_or_default()
            .to_string()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key).chars().next(), Some('y' | 'Y' | 't' | 'T'))
    }

    pub fn is_defined(&self, key: &str) -> bool {
        !self.get(key).is_empty()
    }

    /// Alteração feita pelo usuário: exige definição e permissão de sobrescrita.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let def = self
            .definition(key)
            .ok_or_else(|| DrunnerError::UnrecognisedKey(key.to_string()))?;
        if !def.user_settable {
            return Err(DrunnerError::NotUserSettable(def.key.clone()));
        }
        def.validate(value)?;
        let key = def.key.clone();
        self.persisted.set(&key, value);
        Ok(())
    }

    /// Alteração feita pelo próprio drunner (ex.: IMAGENAME no install).
    pub fn assign(&mut self, key: &str, value: &str) -> Result<()> {
        let def = self
            .definition(key)
            .ok_or_else(|| DrunnerError::UnrecognisedKey(key.to_string()))?;
        def.validate(value)?;
        let key = def.key.clone();
        self.persisted.set(&key, value);
        Ok(())
    }

    /// Valor derivado/transitório, nunca gravado em disco.
    pub fn set_mem(&mut self, key: &str, value: &str) {
        self.memory.set(key, value);
    }

    /// Substitui `$KEY`/`${KEY}`: primeiro a camada de memória, depois a persistida.
    pub fn substitute(&self, text: &str) -> String {
        self.persisted.substitute(&self.memory.substitute(text))
    }

    /// Todas as variáveis; a camada de memória só completa o que não está persistido.
    pub fn all(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .persisted
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in self.memory.iter() {
            if !self.persisted.has_key(k) {
                out.push((k.to_string(), v.to_string()));
            }
        }
        out
    }

    pub fn check_required(&self) -> Result<()> {
        for def in &self.definitions {
            if def.required && !self.is_defined(&def.key) {
                return Err(DrunnerError::ValidationFailed(format!(
                    "a configuração obrigatória {} não está definida",
                    def.key
                )));
            }
        }
        Ok(())
    }

    /// Lê a camada persistida do arquivo.
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Err(DrunnerError::NoSuchFile(self.path.clone()));
        }

        let text = fs::read_to_string(&self.path).map_err(|e| DrunnerError::fs(&self.path, e))?;
        let stored: Variables =
            serde_json::from_str(&text).map_err(|e| DrunnerError::CorruptSettings {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        for (key, value) in stored.iter() {
            match self.definition(key).map(|d| d.key.clone()) {
                Some(def_key) => self.persisted.set(&def_key, value),
                None => warn!(
                    "Ignorando configuração '{}' em {}: não reconhecida.",
                    key,
                    self.path.display()
                ),
            }
        }

        Ok(())
    }

    /// Grava a camada persistida no arquivo.
    pub fn save(&self) -> Result<()> {
        write_variables(&self.path, &self.persisted)
    }

    /// Linhas da listagem de configuração (senhas mascaradas).
    pub fn listing(&self) -> Vec<String> {
        let width = self
            .definitions
            .iter()
            .filter(|d| d.user_settable)
            .map(|d| d.key.len())
            .max()
            .unwrap_or(0);

        let mut lines = vec!["Configuração atual:".to_string(), String::new()];
        let mut user_vars = 0;

        for def in &self.definitions {
            let raw = self.get(&def.key);
            let shown = if def.is_password() { MASK } else { raw.as_str() };

            if def.user_settable {
                lines.push(format!(" {:<width$} = {}", def.key, shown));
                lines.push(format!(" {:<width$}   {}", "", def.description));
                lines.push(String::new());
                user_vars += 1;
            } else {
                debug!("[{}] = {} (não configurável pelo usuário)", def.key, shown);
            }
        }

        if user_vars == 0 {
            lines.push("Não há variáveis configuráveis pelo usuário.".to_string());
        } else {
            lines.push("Altere a configuração com:".to_string());
            lines.push(format!(
                " {} configure VARIAVEL         -- usa a variável de ambiente",
                self.owner
            ));
            lines.push(format!(
                " {} configure VARIAVEL=VALOR   -- usa o valor informado",
                self.owner
            ));
        }
        lines
    }

    /// Comando `configure`: sem argumentos lista; com `K=V` ou `K` altera e grava uma vez.
    pub fn handle_configure(&mut self, args: &[String]) -> Result<Outcome> {
        self.handle_configure_with(args, |key| std::env::var(key).ok())
    }

    pub fn handle_configure_with<F>(&mut self, args: &[String], env: F) -> Result<Outcome>
    where
        F: Fn(&str) -> Option<String>,
    {
        if args.is_empty() {
            for line in self.listing() {
                println!("{line}");
            }
            return Ok(Outcome::Success);
        }

        // Valida tudo antes de tocar no arquivo.
        let mut next = self.persisted.clone();
        for arg in args {
            let (key, value, from_env) = match arg.split_once('=') {
                Some(("", _)) => {
                    return Err(DrunnerError::ValidationFailed(format!(
                        "chave ausente em '{arg}'"
                    )))
                }
                Some((key, value)) => (key.to_string(), value.to_string(), false),
                None => {
                    let value = env(arg).ok_or_else(|| {
                        DrunnerError::ValidationFailed(format!(
                            "variável de ambiente {arg} não encontrada; use CHAVE=VALOR ou exporte {arg}"
                        ))
                    })?;
                    (arg.clone(), value, true)
                }
            };

            let def = self
                .definition(&key)
                .ok_or_else(|| DrunnerError::UnrecognisedKey(key.clone()))?;
            if !def.user_settable {
                return Err(DrunnerError::NotUserSettable(def.key.clone()));
            }
            def.validate(&value)?;

            if value.is_empty() {
                info!("Limpando {}", def.key);
            } else if from_env {
                info!("Definindo {} a partir do ambiente [valor não registrado].", def.key);
            } else if def.is_password() {
                info!("Definindo {} (senha não exibida)", def.key);
            } else {
                info!("Definindo {} = {}", def.key, value);
            }
            next.set(&def.key, &value);
        }

        if next == self.persisted {
            return Ok(Outcome::NoChange);
        }

        write_variables(&self.path, &next)?;
        self.persisted = next;
        Ok(Outcome::Success)
    }
}

fn write_variables(path: &Path, vars: &Variables) -> Result<()> {
    debug!("Gravando {}", path.display());
    let fail = |reason: String| DrunnerError::WriteError {
        path: path.to_path_buf(),
        reason,
    };

    let json = serde_json::to_string_pretty(vars).map_err(|e| fail(e.to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;

    // Temporário no mesmo diretório + rename: o arquivo nunca fica truncado.
    let mut tmp = tempfile::Builder::new()
        .prefix(".vars-")
        .tempfile_in(dir)
        .map_err(|e| fail(e.to_string()))?;
    tmp.write_all(json.as_bytes()).map_err(|e| fail(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| fail(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .map(|m| m.permissions().mode())
            .unwrap_or(0o644);
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
            .map_err(|e| fail(e.to_string()))?;
    }

    tmp.persist(path).map_err(|e| fail(e.error.to_string()))?;
    Ok(())
}
