// ABOUTME: Base service topology loaded from a compose file.
// ABOUTME: Derives color-scoped topologies and per-color port maps from it.

mod generate;
mod ports;

pub use generate::{
    ColorTopology, color_compose_path, generate, write_color_config, write_color_configs,
};
pub use ports::{PortMapping, PortPlan};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::Color;

/// Errors raised while loading or deriving topologies.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("base topology not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid compose file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("base topology defines no services")]
    NoServices,

    #[error("unknown service '{0}' referenced by role mapping")]
    UnknownService(String),

    #[error("invalid port mapping: {0}")]
    InvalidPort(String),

    #[error("invalid color offsets: {0}")]
    InvalidOffsets(String),

    #[error("port {port} cannot be shifted for {color}")]
    PortOverflow { port: u16, color: Color },

    #[error(
        "service '{service}' publishes port {port}, which lies in the {color} reserved range"
    )]
    PortCollision {
        service: String,
        port: u16,
        color: Color,
    },

    #[error("port {0} would be published by both blue and green")]
    ColorOverlap(u16),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Compose file contents. Keys other than `services` are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ServiceDef>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One compose service. Only the fields the generator rewrites are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ServiceDef {
    fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().filter_map(|p| p.host_port)
    }
}

/// The single base topology both colors are derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTopology {
    compose: ComposeFile,
}

impl BaseTopology {
    pub fn from_yaml(yaml: &str) -> Result<Self, TopologyError> {
        let compose: ComposeFile = serde_yaml::from_str(yaml)?;
        if compose.services.is_empty() {
            return Err(TopologyError::NoServices);
        }
        Ok(Self { compose })
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        if !path.is_file() {
            return Err(TopologyError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| TopologyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn compose(&self) -> &ComposeFile {
        &self.compose
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDef> {
        self.compose.services.get(name)
    }

    /// Every published host port, paired with the owning service.
    pub fn host_ports(&self) -> Vec<(&str, u16)> {
        self.compose
            .services
            .iter()
            .flat_map(|(name, svc)| svc.host_ports().map(move |p| (name.as_str(), p)))
            .collect()
    }

    /// Check that blue, green and the base topology can never publish the
    /// same host port.
    pub fn validate(&self, plan: &PortPlan) -> Result<(), TopologyError> {
        plan.validate()?;

        let base = self.host_ports();
        let mut reserved: BTreeMap<Color, BTreeSet<u16>> = BTreeMap::new();
        for color in Color::ALL {
            let set = base
                .iter()
                .map(|(_, port)| plan.shift(color, *port))
                .collect::<Result<BTreeSet<_>, _>>()?;
            reserved.insert(color, set);
        }

        for (service, port) in &base {
            for color in Color::ALL {
                if reserved[&color].contains(port) {
                    return Err(TopologyError::PortCollision {
                        service: (*service).to_string(),
                        port: *port,
                        color,
                    });
                }
            }
        }

        if let Some(port) = reserved[&Color::Blue]
            .intersection(&reserved[&Color::Green])
            .next()
        {
            return Err(TopologyError::ColorOverlap(*port));
        }

        Ok(())
    }

    /// Host ports of one color for the roles the orchestrator cares about.
    pub fn port_map(
        &self,
        roles: &Roles,
        plan: &PortPlan,
        color: Color,
    ) -> Result<PortMap, TopologyError> {
        let shifted = |port: Option<u16>| port.map(|p| plan.shift(color, p)).transpose();

        let first_port = |service: &Option<String>| -> Result<Option<u16>, TopologyError> {
            match service {
                Some(name) => {
                    let svc = self
                        .service(name)
                        .ok_or_else(|| TopologyError::UnknownService(name.clone()))?;
                    Ok(svc.host_ports().next())
                }
                None => Ok(None),
            }
        };

        let (proxy_http, proxy_https) = match &roles.proxy {
            Some(name) => {
                let svc = self
                    .service(name)
                    .ok_or_else(|| TopologyError::UnknownService(name.clone()))?;
                proxy_ports(svc)
            }
            None => (None, None),
        };

        Ok(PortMap {
            frontend: shifted(first_port(&roles.frontend)?)?,
            backend: shifted(first_port(&roles.backend)?)?,
            proxy_http: shifted(proxy_http)?,
            proxy_https: shifted(proxy_https)?,
        })
    }

    /// Port maps for both colors.
    pub fn color_ports(
        &self,
        roles: &Roles,
        plan: &PortPlan,
    ) -> Result<ColorPorts, TopologyError> {
        Ok(ColorPorts {
            blue: self.port_map(roles, plan, Color::Blue)?,
            green: self.port_map(roles, plan, Color::Green)?,
        })
    }
}

/// Pick the proxy's HTTP and HTTPS host ports, preferring container ports
/// 80 and 443 and falling back to publication order.
fn proxy_ports(svc: &ServiceDef) -> (Option<u16>, Option<u16>) {
    let by_container = |target: u16| {
        svc.ports
            .iter()
            .find(|p| p.container_port == target)
            .and_then(|p| p.host_port)
    };
    let mut published = svc.host_ports();
    let http = by_container(80).or_else(|| published.next());
    let https = by_container(443).or_else(|| published.find(|p| Some(*p) != http));
    (http, https)
}

/// Which compose services play which part in the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    #[serde(default = "default_frontend")]
    pub frontend: Option<String>,
    #[serde(default = "default_backend")]
    pub backend: Option<String>,
    #[serde(default = "default_proxy")]
    pub proxy: Option<String>,
}

fn default_frontend() -> Option<String> {
    Some("frontend".to_string())
}

fn default_backend() -> Option<String> {
    Some("backend".to_string())
}

fn default_proxy() -> Option<String> {
    Some("nginx".to_string())
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            frontend: default_frontend(),
            backend: default_backend(),
            proxy: default_proxy(),
        }
    }
}

/// A port role within one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Frontend,
    Backend,
    ProxyHttp,
    ProxyHttps,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Frontend => "frontend",
            Role::Backend => "backend",
            Role::ProxyHttp => "proxy-http",
            Role::ProxyHttps => "proxy-https",
        };
        f.write_str(s)
    }
}

/// Host ports assigned to one color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortMap {
    pub frontend: Option<u16>,
    pub backend: Option<u16>,
    pub proxy_http: Option<u16>,
    pub proxy_https: Option<u16>,
}

impl PortMap {
    pub fn get(&self, role: Role) -> Option<u16> {
        match role {
            Role::Frontend => self.frontend,
            Role::Backend => self.backend,
            Role::ProxyHttp => self.proxy_http,
            Role::ProxyHttps => self.proxy_https,
        }
    }
}

/// Port maps of both colors side by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColorPorts {
    pub blue: PortMap,
    pub green: PortMap,
}

impl ColorPorts {
    pub fn get(&self, color: Color) -> &PortMap {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }
}
