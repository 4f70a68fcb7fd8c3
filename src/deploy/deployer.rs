// ABOUTME: Deployer bringing one color's compose stack up or down.
// ABOUTME: Start is idempotent; only command success or failure is reported.

use std::path::PathBuf;

use crate::runtime::{ComposeOps, ComposeProject};
use crate::topology::color_compose_path;
use crate::types::{Color, ProjectName};

use super::DeployError;

/// What `start` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Every expected service was already running; nothing was touched.
    AlreadyRunning,
    Started,
}

/// Drives color stacks through a `ComposeOps` runtime.
#[derive(Debug, Clone)]
pub struct Deployer<R> {
    runtime: R,
    project: ProjectName,
    compose_dir: PathBuf,
    env_file: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    services: Vec<String>,
}

impl<R: ComposeOps> Deployer<R> {
    /// `compose_dir` holds the generated `compose.<color>.yml` files.
    pub fn new(runtime: R, project: ProjectName, compose_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            project,
            compose_dir: compose_dir.into(),
            env_file: None,
            project_dir: None,
            services: Vec::new(),
        }
    }

    pub fn with_env_file(mut self, env_file: Option<PathBuf>) -> Self {
        self.env_file = env_file;
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Services a fully started stack must have running.
    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn compose_project(&self, color: Color) -> ComposeProject {
        ComposeProject {
            name: self.project.scoped(color),
            file: color_compose_path(&self.compose_dir, color),
            env_file: self.env_file.clone(),
            directory: self.project_dir.clone(),
        }
    }

    pub async fn pull_latest(&self, color: Color) -> Result<(), DeployError> {
        tracing::info!(%color, "pulling images");
        self.runtime.pull(&self.compose_project(color)).await?;
        Ok(())
    }

    pub async fn running_services(&self, color: Color) -> Result<Vec<String>, DeployError> {
        Ok(self
            .runtime
            .running_services(&self.compose_project(color))
            .await?)
    }

    /// Whether any container of `color` is running.
    pub async fn is_running(&self, color: Color) -> Result<bool, DeployError> {
        Ok(!self.running_services(color).await?.is_empty())
    }

    pub async fn start(&self, color: Color) -> Result<StartOutcome, DeployError> {
        let running = self.running_services(color).await?;
        let complete = if self.services.is_empty() {
            !running.is_empty()
        } else {
            self.services.iter().all(|s| running.contains(s))
        };

        if complete {
            tracing::info!(%color, "stack already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        tracing::info!(%color, "starting stack");
        self.runtime.up(&self.compose_project(color)).await?;
        Ok(StartOutcome::Started)
    }

    /// Bring `color` up unconditionally so freshly pulled images replace
    /// whatever containers are already there.
    pub async fn refresh(&self, color: Color) -> Result<(), DeployError> {
        tracing::info!(%color, "updating stack");
        self.runtime.up(&self.compose_project(color)).await?;
        Ok(())
    }

    /// Stop `color`. Returns `false` when nothing was running.
    pub async fn stop(&self, color: Color) -> Result<bool, DeployError> {
        if !self.is_running(color).await? {
            tracing::debug!(%color, "stack already stopped");
            return Ok(false);
        }

        tracing::info!(%color, "stopping stack");
        self.runtime.stop(&self.compose_project(color)).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ComposeError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        running: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ComposeOps for Recorder {
        async fn pull(&self, project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.lock().unwrap().push(format!("pull {}", project.name));
            Ok(())
        }

        async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.lock().unwrap().push(format!("up {}", project.name));
            *self.running.lock().unwrap() = vec!["backend".into(), "frontend".into()];
            Ok(())
        }

        async fn stop(&self, project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.lock().unwrap().push(format!("stop {}", project.name));
            self.running.lock().unwrap().clear();
            Ok(())
        }

        async fn running_services(
            &self,
            _project: &ComposeProject,
        ) -> Result<Vec<String>, ComposeError> {
            Ok(self.running.lock().unwrap().clone())
        }
    }

    fn deployer(recorder: Recorder) -> Deployer<Recorder> {
        Deployer::new(recorder, ProjectName::new("erp").unwrap(), "/srv/state")
            .with_services(vec!["backend".into(), "frontend".into()])
    }

    #[test]
    fn compose_project_is_color_scoped() {
        let project = deployer(Recorder::default()).compose_project(Color::Green);
        assert_eq!(project.name, "erp-green");
        assert_eq!(project.file, PathBuf::from("/srv/state/compose.green.yml"));
    }

    #[tokio::test]
    async fn start_is_noop_when_running() {
        let recorder = Recorder::default();
        let d = deployer(recorder.clone());

        assert_eq!(d.start(Color::Blue).await.unwrap(), StartOutcome::Started);
        assert_eq!(
            d.start(Color::Blue).await.unwrap(),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["up erp-blue"]);
    }

    #[tokio::test]
    async fn partial_stack_is_started() {
        let recorder = Recorder::default();
        *recorder.running.lock().unwrap() = vec!["backend".into()];
        let d = deployer(recorder.clone());

        assert_eq!(d.start(Color::Blue).await.unwrap(), StartOutcome::Started);
    }

    #[tokio::test]
    async fn stop_tolerates_stopped_stack() {
        let recorder = Recorder::default();
        let d = deployer(recorder.clone());

        assert!(!d.stop(Color::Green).await.unwrap());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }
}
