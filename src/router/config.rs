// ABOUTME: Structured production router configuration and its nginx rendering.
// ABOUTME: Built in memory from a color's ports, serialized once, written atomically.

use serde::Deserialize;
use std::fmt;

use super::{RouterError, RouterSettings};
use crate::topology::{PortMap, Role};
use crate::types::{Color, ProjectName};

/// A path routed to one role of the live color.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    pub path: String,
    pub role: Role,
}

pub fn default_routes() -> Vec<Route> {
    vec![
        Route {
            path: "/api/".to_string(),
            role: Role::Backend,
        },
        Route {
            path: "/".to_string(),
            role: Role::Frontend,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub name: String,
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub upstream: String,
}

/// The production-facing router configuration for one live color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub color: Color,
    pub listen: u16,
    pub server_name: String,
    pub upstreams: Vec<Upstream>,
    pub locations: Vec<Location>,
}

impl RouterConfig {
    /// Build the config that sends every route to `color`'s ports.
    pub fn for_color(
        project: &ProjectName,
        color: Color,
        ports: &PortMap,
        settings: &RouterSettings,
    ) -> Result<Self, RouterError> {
        let mut upstreams: Vec<Upstream> = Vec::new();
        let mut locations = Vec::with_capacity(settings.routes.len());

        for route in &settings.routes {
            let port = ports
                .get(route.role)
                .ok_or(RouterError::MissingPort { role: route.role })?;
            let name = format!("{}_{}", project.as_str().replace('-', "_"), route.role)
                .replace('-', "_");

            if !upstreams.iter().any(|u| u.name == name) {
                upstreams.push(Upstream {
                    name: name.clone(),
                    servers: vec![format!("{}:{}", settings.upstream_host, port)],
                });
            }
            locations.push(Location {
                path: route.path.clone(),
                upstream: name,
            });
        }

        Ok(Self {
            color,
            listen: settings.listen,
            server_name: settings.server_name.clone(),
            upstreams,
            locations,
        })
    }

    /// Render as an nginx `conf.d` snippet. Output depends only on the
    /// structure, so the same color always renders the same bytes.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Managed by bascule; do not edit.")?;
        writeln!(f, "# Live color: {}", self.color)?;
        writeln!(f)?;

        for upstream in &self.upstreams {
            writeln!(f, "upstream {} {{", upstream.name)?;
            for server in &upstream.servers {
                writeln!(f, "    server {};", server)?;
            }
            writeln!(f, "}}")?;
            writeln!(f)?;
        }

        writeln!(f, "server {{")?;
        writeln!(f, "    listen {};", self.listen)?;
        writeln!(f, "    server_name {};", self.server_name)?;
        for location in &self.locations {
            writeln!(f)?;
            writeln!(f, "    location {} {{", location.path)?;
            writeln!(f, "        proxy_pass http://{};", location.upstream)?;
            writeln!(f, "        proxy_set_header Host $host;")?;
            writeln!(f, "        proxy_set_header X-Real-IP $remote_addr;")?;
            writeln!(
                f,
                "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"
            )?;
            writeln!(f, "        proxy_set_header X-Forwarded-Proto $scheme;")?;
            writeln!(f, "        proxy_set_header X-Deployment-Color {};", self.color)?;
            writeln!(f, "    }}")?;
        }
        writeln!(f, "}}")
    }
}
