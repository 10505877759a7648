//! Implementação de `ContainerRuntime` sobre o CLI do docker

use super::{CommandOutput, ContainerRuntime, OneShot};
use crate::error::{DrunnerError, Result};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Chama o executável `docker` e captura a saída.
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Usa outro executável compatível (ex.: `podman`).
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("{} {}", self.program, args.join(" "));
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| {
                DrunnerError::RuntimeCallFailed(format!(
                    "não foi possível executar '{}': {e}",
                    self.program
                ))
            })
    }

    /// Executa e exige sucesso.
    fn checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(DrunnerError::RuntimeCallFailed(format!(
                "{} {}: {}",
                self.program,
                args.join(" "),
                combined(&output).trim()
            )));
        }
        Ok(output)
    }

    /// Executa e interpreta sucesso como "sim".
    fn succeeds(&self, args: &[&str]) -> Result<bool> {
        Ok(self.output(args)?.status.success())
    }

    fn one_shot_args(request: &OneShot) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(user) = &request.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        for mount in &request.mounts {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }
        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        // Só o nome: o valor vem do ambiente do processo docker.
        for (key, _) in &request.secret_env {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        args.push(request.image.clone());
        args.extend(request.command.iter().cloned());
        args
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

impl ContainerRuntime for DockerCli {
    fn pull(&self, image: &str) -> Result<()> {
        info!("Baixando {image}...");
        self.checked(&["pull", image])?;
        Ok(())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        self.succeeds(&["image", "inspect", image])
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        self.succeeds(&["volume", "inspect", name])
    }

    fn create_volume(&self, name: &str) -> Result<()> {
        self.checked(&["volume", "create", name])?;
        Ok(())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.checked(&["volume", "rm", name])?;
        Ok(())
    }

    fn container_running(&self, name: &str) -> Result<bool> {
        let output = self.output(&["inspect", "-f", "{{.State.Running}}", name])?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    fn container_exists(&self, name: &str) -> Result<bool> {
        self.succeeds(&["container", "inspect", name])
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.checked(&["rm", "-f", name])?;
        Ok(())
    }

    fn run_one_shot(&self, request: &OneShot) -> Result<CommandOutput> {
        debug!("docker run {}", request.describe());

        let args = Self::one_shot_args(request);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        for (key, value) in &request.secret_env {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|e| {
            DrunnerError::RuntimeCallFailed(format!(
                "não foi possível executar '{}': {e}",
                self.program
            ))
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined(&output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Mount;

    #[test]
    fn test_one_shot_args_keep_secret_values_off_the_command_line() {
        let req = OneShot::new("drunner/drunner_utils")
            .user("root")
            .mount(Mount::bind("/tmp/stage", "/dst"))
            .env("SERVICENAME", "myapp")
            .secret_env("PASS", "hunter2")
            .command(["tar", "-czf", "/dst/x.tar", "-C", "/src", "."]);

        let args = DockerCli::one_shot_args(&req);
        assert_eq!(&args[..4], &["run", "--rm", "-u", "root"]);
        assert!(args.contains(&"/tmp/stage:/dst".to_string()));
        assert!(args.contains(&"SERVICENAME=myapp".to_string()));
        assert!(args.contains(&"PASS".to_string()));
        assert!(!args.iter().any(|a| a.contains("hunter2")));

        let image_pos = args.iter().position(|a| a == "drunner/drunner_utils").unwrap();
        assert_eq!(args[image_pos + 1], "tar");
    }

    #[test]
    fn test_missing_program_is_runtime_failure() {
        let cli = DockerCli::with_program("/definitely/not/a/docker");
        assert!(matches!(
            cli.volume_exists("x"),
            Err(DrunnerError::RuntimeCallFailed(_))
        ));
    }
}
