// ABOUTME: Hooks system for deployment lifecycle events.
// ABOUTME: Runs configured shell commands at pre-deploy, post-deploy, and on-error points.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::types::{Color, ProjectName};

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before anything is started. Failure aborts deployment.
    PreDeploy,
    /// After a committed deployment. Failure logs warning.
    PostDeploy,
    /// After a failed deployment. Failure logs warning.
    OnError,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
            HookPoint::OnError => "on-error",
        }
    }
}

/// Shell commands per hook point, from the `hooks` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookCommands {
    #[serde(default)]
    pub pre_deploy: Option<String>,
    #[serde(default)]
    pub post_deploy: Option<String>,
    #[serde(default)]
    pub on_error: Option<String>,
}

impl HookCommands {
    pub fn get(&self, point: HookPoint) -> Option<&str> {
        match point {
            HookPoint::PreDeploy => self.pre_deploy.as_deref(),
            HookPoint::PostDeploy => self.post_deploy.as_deref(),
            HookPoint::OnError => self.on_error.as_deref(),
        }
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub project: ProjectName,
    pub target: Color,
    pub source: Option<Color>,
    pub deployment_id: String,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("BASCULE_PROJECT".to_string(), self.project.to_string());
        env.insert("BASCULE_TARGET_COLOR".to_string(), self.target.to_string());
        if let Some(source) = self.source {
            env.insert("BASCULE_SOURCE_COLOR".to_string(), source.to_string());
        }
        env.insert(
            "BASCULE_DEPLOYMENT_ID".to_string(),
            self.deployment_id.clone(),
        );
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    /// Last non-empty stdout line. The pre-deploy backup hook reports its
    /// snapshot reference this way.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
    }
}

/// Runs configured hook commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct HookRunner {
    commands: HookCommands,
    working_dir: PathBuf,
}

impl HookRunner {
    /// Hooks run with `working_dir` as their current directory.
    pub fn new(commands: HookCommands, working_dir: &Path) -> Self {
        Self {
            commands,
            working_dir: working_dir.to_path_buf(),
        }
    }

    /// Check if a hook is configured for the given point.
    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.commands.get(point).is_some()
    }

    /// Run a hook if one is configured.
    ///
    /// Returns None if no hook is configured, or Some(HookResult) if it was run.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let command = self.commands.get(point)?;

        tracing::info!("Running {} hook: {}", point.name(), command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .envs(context.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let result = HookResult {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if result.success {
                    tracing::info!("{} hook completed successfully", point.name());
                } else {
                    tracing::warn!(
                        "{} hook failed with exit code {:?}",
                        point.name(),
                        result.exit_code
                    );
                }

                Some(result)
            }
            Err(e) => {
                tracing::error!("Failed to execute {} hook: {}", point.name(), e);
                Some(HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HookContext {
        HookContext {
            project: ProjectName::new("erp").unwrap(),
            target: Color::Green,
            source: Some(Color::Blue),
            deployment_id: "20260101120000-42".to_string(),
        }
    }

    #[test]
    fn hook_context_to_env() {
        let env = context().to_env();
        assert_eq!(env.get("BASCULE_PROJECT"), Some(&"erp".to_string()));
        assert_eq!(env.get("BASCULE_TARGET_COLOR"), Some(&"green".to_string()));
        assert_eq!(env.get("BASCULE_SOURCE_COLOR"), Some(&"blue".to_string()));
        assert_eq!(
            env.get("BASCULE_DEPLOYMENT_ID"),
            Some(&"20260101120000-42".to_string())
        );
    }

    #[test]
    fn bootstrap_context_has_no_source() {
        let mut ctx = context();
        ctx.source = None;
        assert!(!ctx.to_env().contains_key("BASCULE_SOURCE_COLOR"));
    }

    #[test]
    fn last_line_skips_trailing_blanks() {
        let result = HookResult {
            success: true,
            exit_code: Some(0),
            stdout: "dumping...\nsnapshot: erp-20260101.tar.gz\n\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(result.last_line(), Some("snapshot: erp-20260101.tar.gz"));
    }

    #[tokio::test]
    async fn unconfigured_hook_is_skipped() {
        let runner = HookRunner::new(HookCommands::default(), Path::new("."));
        assert!(!runner.hook_exists(HookPoint::PreDeploy));
        assert!(runner.run(HookPoint::PreDeploy, &context()).await.is_none());
    }

    #[tokio::test]
    async fn hook_sees_context_and_reports_stdout() {
        let commands = HookCommands {
            pre_deploy: Some("echo snap-$BASCULE_TARGET_COLOR".to_string()),
            ..HookCommands::default()
        };
        let runner = HookRunner::new(commands, Path::new("."));
        let result = runner.run(HookPoint::PreDeploy, &context()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.last_line(), Some("snap-green"));
    }

    #[tokio::test]
    async fn failing_hook_reports_exit_code() {
        let commands = HookCommands {
            on_error: Some("exit 3".to_string()),
            ..HookCommands::default()
        };
        let runner = HookRunner::new(commands, Path::new("."));
        let result = runner.run(HookPoint::OnError, &context()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }
}
