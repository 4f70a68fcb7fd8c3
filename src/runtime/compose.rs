// ABOUTME: Compose-project operations and the CLI-backed implementation.
// ABOUTME: Pull, up, stop and list running services for one color's stack.

use async_trait::async_trait;
use snafu::ResultExt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::error::{CommandFailedSnafu, ComposeError, SpawnSnafu};
use super::types::RuntimeType;

/// One compose project on the host: a color's generated file and namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// Project namespace passed as `-p`, e.g. `erp-green`.
    pub name: String,
    pub file: PathBuf,
    pub env_file: Option<PathBuf>,
    /// Relative paths inside the generated file resolve against this.
    pub directory: Option<PathBuf>,
}

/// Operations on a compose project.
///
/// Implementations only report whether the command itself succeeded; they
/// never judge application health.
#[async_trait]
pub trait ComposeOps: Send + Sync {
    /// Pull the latest images for every service.
    async fn pull(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Create and start all services in the background.
    async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Stop all services. Stopping a stopped project succeeds.
    async fn stop(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Names of services that currently have a running container.
    async fn running_services(&self, project: &ComposeProject)
    -> Result<Vec<String>, ComposeError>;
}

/// `ComposeOps` backed by `docker compose` or `podman compose`.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    runtime: RuntimeType,
}

impl ComposeCli {
    pub fn new(runtime: RuntimeType) -> Self {
        Self { runtime }
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime
    }

    fn args(&self, project: &ComposeProject, action: &[&str]) -> Vec<String> {
        let (_, prefix) = self.runtime.compose_command();
        let mut args: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        args.extend(["-p".to_string(), project.name.clone()]);
        args.extend(["-f".to_string(), project.file.display().to_string()]);
        if let Some(ref dir) = project.directory {
            args.extend(["--project-directory".to_string(), dir.display().to_string()]);
        }
        if let Some(ref env_file) = project.env_file {
            args.extend(["--env-file".to_string(), env_file.display().to_string()]);
        }
        args.extend(action.iter().map(|s| s.to_string()));
        args
    }

    async fn run(&self, project: &ComposeProject, action: &[&str]) -> Result<String, ComposeError> {
        let (program, _) = self.runtime.compose_command();
        let args = self.args(project, action);
        let command = format!("{} {}", program, args.join(" "));
        tracing::debug!("Running {}", command);

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context(SpawnSnafu { program })?;

        if !output.status.success() {
            return CommandFailedSnafu {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail();
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ComposeOps for ComposeCli {
    async fn pull(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        self.run(project, &["pull", "--quiet"]).await.map(drop)
    }

    async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        self.run(project, &["up", "-d", "--remove-orphans"])
            .await
            .map(drop)
    }

    async fn stop(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        self.run(project, &["stop"]).await.map(drop)
    }

    async fn running_services(
        &self,
        project: &ComposeProject,
    ) -> Result<Vec<String>, ComposeError> {
        let stdout = self
            .run(project, &["ps", "--services", "--status", "running"])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ComposeProject {
        ComposeProject {
            name: "erp-blue".to_string(),
            file: PathBuf::from("/srv/erp/.bascule/compose.blue.yml"),
            env_file: Some(PathBuf::from("/srv/erp/.env")),
            directory: None,
        }
    }

    #[test]
    fn args_scope_project_and_files() {
        let cli = ComposeCli::new(RuntimeType::Docker);
        let args = cli.args(&project(), &["up", "-d"]);
        assert_eq!(
            args,
            vec![
                "compose",
                "-p",
                "erp-blue",
                "-f",
                "/srv/erp/.bascule/compose.blue.yml",
                "--env-file",
                "/srv/erp/.env",
                "up",
                "-d"
            ]
        );
    }

    #[test]
    fn args_skip_missing_env_file() {
        let cli = ComposeCli::new(RuntimeType::Podman);
        let mut p = project();
        p.env_file = None;
        let args = cli.args(&p, &["stop"]);
        assert!(!args.contains(&"--env-file".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn args_pin_project_directory() {
        let cli = ComposeCli::new(RuntimeType::Docker);
        let mut p = project();
        p.directory = Some(PathBuf::from("/srv/erp"));
        let args = cli.args(&p, &["up", "-d"]);
        let pos = args.iter().position(|a| a == "--project-directory").unwrap();
        assert_eq!(args[pos + 1], "/srv/erp");
    }
}
