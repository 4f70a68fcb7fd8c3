// ABOUTME: Color-scoped topology generation from the base compose file.
// ABOUTME: Suffixes container names and shifts host ports per color.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{BaseTopology, ComposeFile, PortPlan, TopologyError};
use crate::atomic::write_atomic;
use crate::types::{Color, ProjectName};

/// A runnable topology for one color.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTopology {
    pub color: Color,
    /// Compose project namespace, e.g. `erp-blue`.
    pub project: String,
    pub compose: ComposeFile,
}

impl ColorTopology {
    pub fn to_yaml(&self) -> Result<String, TopologyError> {
        Ok(serde_yaml::to_string(&self.compose)?)
    }

    /// Image reference per service, for deployment records.
    pub fn images(&self) -> BTreeMap<String, String> {
        self.compose
            .services
            .iter()
            .filter_map(|(name, svc)| svc.image.clone().map(|img| (name.clone(), img)))
            .collect()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.compose
            .services
            .values()
            .filter_map(|svc| svc.container_name.clone())
            .collect()
    }
}

/// Derive the topology for `color` from the base topology.
///
/// Fails if the base topology publishes a port inside either color's
/// reserved range, so a generated topology never reuses a port.
pub fn generate(
    base: &BaseTopology,
    project: &ProjectName,
    color: Color,
    plan: &PortPlan,
) -> Result<ColorTopology, TopologyError> {
    base.validate(plan)?;

    let mut compose = base.compose().clone();
    for (name, svc) in compose.services.iter_mut() {
        svc.container_name = Some(match &svc.container_name {
            Some(existing) => format!("{}-{}", existing, color),
            None => format!("{}-{}-{}", project, name, color),
        });
        svc.ports = svc
            .ports
            .iter()
            .map(|p| p.shifted(plan, color))
            .collect::<Result<_, _>>()?;
    }

    Ok(ColorTopology {
        color,
        project: project.scoped(color),
        compose,
    })
}

/// Path of the generated compose file for a color.
pub fn color_compose_path(dir: &Path, color: Color) -> PathBuf {
    dir.join(format!("compose.{}.yml", color))
}

/// Generate and write both colors' compose files. Safe to re-run: the same
/// base topology always yields byte-identical files.
pub fn write_color_configs(
    base: &BaseTopology,
    project: &ProjectName,
    plan: &PortPlan,
    dir: &Path,
) -> Result<Vec<(Color, PathBuf)>, TopologyError> {
    // Generate both before writing either, so a failure leaves nothing behind.
    let topologies = Color::ALL
        .iter()
        .map(|color| generate(base, project, *color, plan))
        .collect::<Result<Vec<_>, _>>()?;

    topologies
        .iter()
        .map(|topology| write_color_config(topology, dir).map(|path| (topology.color, path)))
        .collect()
}

/// Atomically write one color's compose file into `dir`.
pub fn write_color_config(topology: &ColorTopology, dir: &Path) -> Result<PathBuf, TopologyError> {
    let path = color_compose_path(dir, topology.color);
    let yaml = topology.to_yaml()?;
    write_atomic(&path, yaml.as_bytes()).map_err(|source| TopologyError::Write {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(color = %topology.color, path = %path.display(), "wrote color topology");
    Ok(path)
}
