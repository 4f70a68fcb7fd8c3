// ABOUTME: Configuration types and parsing for bascule.yml.
// ABOUTME: Every key is optional; environment overrides are applied after parsing.

mod deserialize;
mod health;
mod init;
mod overrides;

pub use health::HealthSettings;
pub use init::init_config;
pub use overrides::{
    ENV_COMPOSE_FILE, ENV_ENV_FILE, ENV_HEALTH_ATTEMPTS, ENV_HEALTH_INTERVAL, ENV_HEALTH_TIMEOUT,
    ENV_RUNTIME, ENV_STATE_DIR, ENV_WEBHOOK_URL, apply_env_overrides, apply_overrides,
};

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hooks::HookCommands;
use crate::notify::NotifySettings;
use crate::router::RouterSettings;
use crate::runtime::{RuntimeType, detect_local};
use crate::topology::{PortPlan, Roles};
use crate::types::ProjectName;

pub const CONFIG_FILENAME: &str = "bascule.yml";
pub const CONFIG_FILENAME_ALT: &str = "bascule.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".bascule/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectName,

    /// Base compose file both colors are generated from.
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    #[serde(default)]
    pub env_file: Option<PathBuf>,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Detected from local sockets when unset.
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub offsets: PortPlan,

    #[serde(default)]
    pub roles: Roles,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub hooks: HookCommands,

    #[serde(default)]
    pub notify: NotifySettings,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".bascule")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            project: ProjectName::default(),
            compose_file: default_compose_file(),
            env_file: None,
            state_dir: default_state_dir(),
            runtime: None,
            offsets: PortPlan::default(),
            roles: Roles::default(),
            health: HealthSettings::default(),
            router: RouterSettings::default(),
            hooks: HookCommands::default(),
            notify: NotifySettings::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config.
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = config_root(path);
        Ok(config)
    }

    /// Find the config file in `dir`; none found means all defaults.
    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("no config file in {}, using defaults", dir.display());
                Ok(Config {
                    base_dir: dir.to_path_buf(),
                    ..Config::default()
                })
            }
        }
    }

    pub fn find(dir: &Path) -> Option<PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load from an explicit path or by discovery, then apply environment
    /// overrides and resolve relative paths.
    pub fn resolve(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::discover(dir)?,
        };
        apply_env_overrides(&mut config)?;
        config.offsets.validate()?;
        Ok(config)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn compose_path(&self) -> PathBuf {
        self.absolute(&self.compose_file)
    }

    pub fn env_file_path(&self) -> Option<PathBuf> {
        self.env_file.as_deref().map(|p| self.absolute(p))
    }

    pub fn state_path(&self) -> PathBuf {
        self.absolute(&self.state_dir)
    }

    /// Router settings with a relative config path resolved.
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            config_path: self.absolute(&self.router.config_path),
            ..self.router.clone()
        }
    }

    /// Configured runtime, else the locally detected one, else Docker.
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime
            .or_else(detect_local)
            .unwrap_or(RuntimeType::Docker)
    }
}

/// `.bascule/config.yml` belongs to the directory above `.bascule`.
fn config_root(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|n| n == ".bascule") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Role;
    use std::time::Duration;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.project.as_str(), "app");
        assert_eq!(config.compose_file, PathBuf::from("docker-compose.yml"));
        assert_eq!(config.offsets, PortPlan::default());
        assert_eq!(config.health.attempts, 3);
        assert_eq!(config.health.endpoints.len(), 3);
    }

    #[test]
    fn parses_full_config() {
        let yaml = r#"
project: erp
compose_file: deploy/compose.yml
runtime: podman
offsets: { blue: 10, green: 20 }
roles:
  frontend: web
  backend: api
  proxy: null
health:
  attempts: 5
  interval: 3s
  timeout: 1s
  endpoints:
    - { name: api, role: backend, path: /healthz }
router:
  config_path: /etc/nginx/conf.d/erp.conf
  public_url: http://erp.example.com/healthz
  test_command: null
hooks:
  pre_deploy: ./scripts/backup.sh
notify:
  webhook: http://hooks.local/deploys
  timeout: 2s
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.project.as_str(), "erp");
        assert_eq!(config.runtime, Some(RuntimeType::Podman));
        assert_eq!(config.offsets.blue, 10);
        assert_eq!(config.roles.proxy, None);
        assert_eq!(config.health.policy().attempts, 5);
        assert_eq!(config.health.interval, Duration::from_secs(3));
        assert_eq!(config.health.endpoints.head.role, Role::Backend);
        assert!(config.router.test_command.is_none());
        assert_eq!(config.hooks.pre_deploy.as_deref(), Some("./scripts/backup.sh"));
        assert_eq!(config.notify.timeout, Duration::from_secs(2));
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let result = Config::from_yaml("health:\n  endpoints: []\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_project_name_is_rejected() {
        assert!(Config::from_yaml("project: Not_Valid\n").is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "project: erp\n").unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.compose_path(), dir.path().join("docker-compose.yml"));
        assert_eq!(config.state_path(), dir.path().join(".bascule"));
    }

    #[test]
    fn dot_dir_config_resolves_against_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".bascule")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), "project: erp\n").unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.base_dir, dir.path());
    }

    #[test]
    fn missing_config_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.project.as_str(), "app");
        assert_eq!(config.base_dir, dir.path());
    }
}
