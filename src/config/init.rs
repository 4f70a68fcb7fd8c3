// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented bascule.yml template next to the compose file.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ProjectName;

use super::CONFIG_FILENAME;

/// Write a starter `bascule.yml` into `dir` and return its path.
pub fn init_config(dir: &Path, project: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project = match project {
        Some(name) => ProjectName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => ProjectName::default(),
    };

    std::fs::write(&config_path, generate_template_yaml(&project))?;
    Ok(config_path)
}

fn generate_template_yaml(project: &ProjectName) -> String {
    format!(
        r#"project: {}
compose_file: docker-compose.yml
state_dir: .bascule
# runtime: docker

# Host port offsets per color (8000 -> 8001 blue, 8002 green)
offsets:
  blue: 1
  green: 2

roles:
  frontend: frontend
  backend: backend
  proxy: nginx

health:
  attempts: 3
  interval: 10s
  timeout: 5s

router:
  config_path: /etc/nginx/conf.d/{}.conf
  public_url: http://127.0.0.1/
  reload_command: ["nginx", "-s", "reload"]

# hooks:
#   pre_deploy: ./scripts/backup.sh
# notify:
#   webhook: http://hooks.example.com/deployments
"#,
        project, project
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses_back() {
        let yaml = generate_template_yaml(&ProjectName::new("erp").unwrap());
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.project.as_str(), "erp");
        assert_eq!(
            config.router.config_path,
            PathBuf::from("/etc/nginx/conf.d/erp.conf")
        );
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("erp"), false).unwrap();
        assert!(matches!(
            init_config(dir.path(), None, false),
            Err(Error::AlreadyExists(_))
        ));
        assert!(init_config(dir.path(), None, true).is_ok());
    }
}
