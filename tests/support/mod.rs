// ABOUTME: Shared in-memory fakes for integration tests.
// ABOUTME: A simulated host where compose, the proxy and HTTP probes see the same world.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bascule::config::Config;
use bascule::deploy::Orchestrator;
use bascule::health::{Probe, ProbeStatus};
use bascule::router::{ProxyOps, RouterError};
use bascule::runtime::{ComposeError, ComposeOps, ComposeProject};
use bascule::types::Color;

pub const PUBLIC_PORT: u16 = 9080;

pub const COMPOSE: &str = r#"
services:
  backend:
    image: registry.local/erp-api:1.4
    ports:
      - "8000:8000"
  frontend:
    image: registry.local/erp-web:1.4
    ports:
      - "3000:80"
  db:
    image: postgres:16
"#;

pub const CONFIG: &str = r#"
project: erp
state_dir: state
roles:
  proxy: null
health:
  attempts: 3
  interval: 10ms
  timeout: 200ms
  endpoints:
    - { name: api, role: backend, path: /health/live }
    - { name: web, role: frontend, path: / }
router:
  config_path: router/erp.conf
  public_url: http://127.0.0.1:9080/health
  test_command: null
  reload_command: ["true"]
  verify:
    attempts: 2
    interval: 10ms
    timeout: 200ms
"#;

#[derive(Debug, Default)]
pub struct WorldState {
    pub running: HashMap<Color, Vec<String>>,
    pub unhealthy: Vec<Color>,
    /// Public URL fails while this color is live.
    pub broken_public: Option<Color>,
    /// Public URL hangs until timeout while this color is live.
    pub slow_public: Option<Color>,
    pub live: Option<Color>,
    /// Proxy config test fails while the router file names this color.
    pub reject_config: Option<Color>,
    pub calls: Vec<String>,
    pub probes: HashMap<String, u32>,
}

/// The simulated host. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct World {
    pub state: Arc<Mutex<WorldState>>,
    router_path: PathBuf,
    reloaded: Arc<tokio::sync::Notify>,
}

impl World {
    pub fn new(router_path: PathBuf) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState::default())),
            router_path,
            reloaded: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut WorldState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn probe_count(&self, url: &str) -> u32 {
        self.with(|s| s.probes.get(url).copied().unwrap_or(0))
    }

    /// Resolves after the next proxy reload.
    pub async fn reloaded(&self) {
        self.reloaded.notified().await
    }

    pub fn router_path(&self) -> &Path {
        &self.router_path
    }

    fn router_color(&self) -> Option<Color> {
        std::fs::read_to_string(&self.router_path)
            .ok()
            .and_then(|text| {
                text.lines()
                    .find_map(|l| l.strip_prefix("# Live color: "))
                    .and_then(|c| c.trim().parse().ok())
            })
    }

    fn color_of(project: &ComposeProject) -> Color {
        project
            .name
            .rsplit('-')
            .next()
            .and_then(|c| c.parse().ok())
            .expect("compose project is color scoped")
    }

    fn color_of_port(port: u16) -> Option<Color> {
        match port {
            8001 | 3001 => Some(Color::Blue),
            8002 | 3002 => Some(Color::Green),
            _ => None,
        }
    }
}

#[async_trait]
impl ComposeOps for World {
    async fn pull(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        self.with(|s| s.calls.push(format!("pull {}", project.name)));
        Ok(())
    }

    async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        let color = Self::color_of(project);
        self.with(|s| {
            s.calls.push(format!("up {}", project.name));
            s.running.insert(
                color,
                vec!["backend".into(), "db".into(), "frontend".into()],
            );
        });
        Ok(())
    }

    async fn stop(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        let color = Self::color_of(project);
        self.with(|s| {
            s.calls.push(format!("stop {}", project.name));
            s.running.remove(&color);
        });
        Ok(())
    }

    async fn running_services(
        &self,
        project: &ComposeProject,
    ) -> Result<Vec<String>, ComposeError> {
        let color = Self::color_of(project);
        Ok(self.with(|s| s.running.get(&color).cloned().unwrap_or_default()))
    }
}

#[async_trait]
impl ProxyOps for World {
    async fn test_config(&self) -> Result<(), RouterError> {
        let named = self.router_color();
        if named.is_some() && self.with(|s| s.reject_config) == named {
            return Err(RouterError::CommandFailed {
                command: "nginx -t".into(),
                status: "exit status: 1".into(),
                stderr: "unexpected \"}\"".into(),
            });
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), RouterError> {
        let live = self.router_color();
        self.with(|s| {
            s.calls.push(format!("reload {:?}", live));
            s.live = live;
        });
        self.reloaded.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Probe for World {
    async fn get(&self, url: &str, timeout: Duration) -> ProbeStatus {
        let port = url
            .parse::<hyper::Uri>()
            .ok()
            .and_then(|u| u.port_u16())
            .unwrap_or(80);

        let (status, hang) = self.with(|s| {
            *s.probes.entry(url.to_string()).or_default() += 1;
            if port == PUBLIC_PORT {
                match s.live {
                    Some(c) if s.slow_public == Some(c) => (ProbeStatus::Timeout, true),
                    Some(c) if s.broken_public == Some(c) => (ProbeStatus::Http(502), false),
                    Some(c) if s.running.contains_key(&c) && !s.unhealthy.contains(&c) => {
                        (ProbeStatus::Http(200), false)
                    }
                    Some(_) => (ProbeStatus::Http(502), false),
                    None => (ProbeStatus::Error("connection refused".into()), false),
                }
            } else {
                match World::color_of_port(port) {
                    Some(c) if s.running.contains_key(&c) && !s.unhealthy.contains(&c) => {
                        (ProbeStatus::Http(200), false)
                    }
                    Some(c) if s.running.contains_key(&c) => (ProbeStatus::Http(503), false),
                    _ => (ProbeStatus::Error("connection refused".into()), false),
                }
            }
        });

        if hang {
            tokio::time::sleep(timeout).await;
        }
        status
    }
}

/// A project directory with a compose file and config, plus a world.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub world: World,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CONFIG)
    }

    pub fn with_config(yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), COMPOSE).unwrap();

        let mut config = Config::from_yaml(yaml).unwrap();
        config.base_dir = dir.path().to_path_buf();
        let world = World::new(config.router_settings().config_path);

        Self { dir, config, world }
    }

    pub fn orchestrator(&self) -> Orchestrator<World, World, World> {
        Orchestrator::new(
            &self.config,
            self.world.clone(),
            self.world.clone(),
            self.world.clone(),
        )
        .unwrap()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_path()
    }

    pub fn router_bytes(&self) -> Option<Vec<u8>> {
        std::fs::read(self.world.router_path()).ok()
    }

    pub fn state_bytes(&self) -> Option<Vec<u8>> {
        std::fs::read(self.state_dir().join("state.json")).ok()
    }
}
