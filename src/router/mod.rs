// ABOUTME: Production router: structured config, on-disk file, and proxy control.
// ABOUTME: The config file is only ever replaced atomically and restored byte-for-byte.

mod config;

pub use config::{Location, Route, RouterConfig, Upstream, default_routes};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::atomic::write_atomic;
use crate::health::RetryPolicy;
use crate::topology::Role;

const BACKUP_FILENAME: &str = "router.conf";

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("failed to access router config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("route targets {role}, but the topology publishes no {role} port")]
    MissingPort { role: Role },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("proxy command is empty")]
    EmptyCommand,
}

/// Router section of the project configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    /// The live router config file that `switch` rewrites.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Production URL checked after every reload.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,

    #[serde(default = "default_listen")]
    pub listen: u16,

    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_routes")]
    pub routes: Vec<Route>,

    /// Validates the written config before reload. `None` skips validation.
    #[serde(default = "default_test_command")]
    pub test_command: Option<Vec<String>>,

    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,

    #[serde(default = "default_verify")]
    pub verify: RetryPolicy,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d/bascule.conf")
}

fn default_public_url() -> String {
    "http://127.0.0.1/".to_string()
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen() -> u16 {
    80
}

fn default_server_name() -> String {
    "_".to_string()
}

fn default_test_command() -> Option<Vec<String>> {
    Some(vec!["nginx".to_string(), "-t".to_string()])
}

fn default_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}

fn default_verify() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_secs(2), Duration::from_secs(5))
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            public_url: default_public_url(),
            upstream_host: default_upstream_host(),
            listen: default_listen(),
            server_name: default_server_name(),
            routes: default_routes(),
            test_command: default_test_command(),
            reload_command: default_reload_command(),
            verify: default_verify(),
        }
    }
}

/// Control of the running reverse proxy.
#[async_trait]
pub trait ProxyOps: Send + Sync {
    /// Ask the proxy whether the written config is valid.
    async fn test_config(&self) -> Result<(), RouterError>;

    /// Graceful reload; in-flight connections are not dropped.
    async fn reload(&self) -> Result<(), RouterError>;
}

/// `ProxyOps` that shells out to configured commands.
#[derive(Debug, Clone)]
pub struct ProxyCommand {
    test: Option<Vec<String>>,
    reload: Vec<String>,
}

impl ProxyCommand {
    pub fn new(test: Option<Vec<String>>, reload: Vec<String>) -> Self {
        Self { test, reload }
    }

    pub fn from_settings(settings: &RouterSettings) -> Self {
        Self::new(
            settings.test_command.clone(),
            settings.reload_command.clone(),
        )
    }

    async fn run(argv: &[String]) -> Result<(), RouterError> {
        let (program, args) = argv.split_first().ok_or(RouterError::EmptyCommand)?;
        let command = argv.join(" ");
        tracing::debug!("Running {}", command);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RouterError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RouterError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProxyOps for ProxyCommand {
    async fn test_config(&self) -> Result<(), RouterError> {
        match &self.test {
            Some(argv) => Self::run(argv).await,
            None => Ok(()),
        }
    }

    async fn reload(&self) -> Result<(), RouterError> {
        Self::run(&self.reload).await
    }
}

/// The live router config file.
#[derive(Debug, Clone)]
pub struct RouterFile {
    path: PathBuf,
}

impl RouterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> RouterError {
        RouterError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Current bytes, or `None` when no config has been written yet.
    pub fn read_bytes(&self) -> Result<Option<Vec<u8>>, RouterError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Copy the current bytes into `backup_dir` and return them.
    pub fn backup(&self, backup_dir: &Path) -> Result<Option<Vec<u8>>, RouterError> {
        let current = self.read_bytes()?;
        if let Some(ref bytes) = current {
            let target = backup_dir.join(BACKUP_FILENAME);
            write_atomic(&target, bytes).map_err(|source| RouterError::Io {
                path: target.clone(),
                source,
            })?;
            tracing::debug!("backed up router config to {}", target.display());
        }
        Ok(current)
    }

    pub fn replace(&self, config: &RouterConfig) -> Result<(), RouterError> {
        write_atomic(&self.path, config.render().as_bytes()).map_err(|e| self.io_err(e))
    }

    /// Put back exactly what `backup` saw: the same bytes, or no file.
    pub fn restore(&self, backup: Option<&[u8]>) -> Result<(), RouterError> {
        match backup {
            Some(bytes) => write_atomic(&self.path, bytes).map_err(|e| self.io_err(e)),
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_err(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_puts_back_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = RouterFile::new(dir.path().join("router.conf"));
        std::fs::write(file.path(), b"upstream old {}\n").unwrap();

        let backup = file.backup(&dir.path().join("backups/s1")).unwrap();
        std::fs::write(file.path(), b"something else").unwrap();
        file.restore(backup.as_deref()).unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"upstream old {}\n");
        assert_eq!(
            std::fs::read(dir.path().join("backups/s1/router.conf")).unwrap(),
            b"upstream old {}\n"
        );
    }

    #[test]
    fn restore_of_absent_config_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = RouterFile::new(dir.path().join("router.conf"));

        let backup = file.backup(&dir.path().join("backups/s1")).unwrap();
        assert!(backup.is_none());
        std::fs::write(file.path(), b"new").unwrap();
        file.restore(None).unwrap();

        assert!(!file.path().exists());
        assert!(!dir.path().join("backups/s1/router.conf").exists());
    }

    #[test]
    fn settings_default_from_empty_yaml() {
        let settings: RouterSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.listen, 80);
        assert_eq!(settings.routes, default_routes());
        assert_eq!(settings.reload_command, vec!["nginx", "-s", "reload"]);
    }

    #[tokio::test]
    async fn proxy_command_reports_failure() {
        let proxy = ProxyCommand::new(Some(vec!["true".into()]), vec!["false".into()]);
        assert!(proxy.test_config().await.is_ok());
        assert!(matches!(
            proxy.reload().await,
            Err(RouterError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn empty_command_is_error() {
        let proxy = ProxyCommand::new(None, Vec::new());
        assert!(proxy.test_config().await.is_ok());
        assert!(matches!(proxy.reload().await, Err(RouterError::EmptyCommand)));
    }
}
