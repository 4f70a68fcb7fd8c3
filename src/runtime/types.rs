// ABOUTME: Container runtime selection for Docker and Podman.
// ABOUTME: Maps each runtime to the compose command it is driven through.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    /// Program and leading arguments for compose invocations.
    pub fn compose_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            RuntimeType::Docker => ("docker", &["compose"]),
            RuntimeType::Podman => ("podman", &["compose"]),
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "docker"),
            RuntimeType::Podman => write!(f, "podman"),
        }
    }
}

impl FromStr for RuntimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeType::Docker),
            "podman" => Ok(RuntimeType::Podman),
            other => Err(format!("unknown container runtime: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_runtime_names() {
        assert_eq!("docker".parse::<RuntimeType>().unwrap(), RuntimeType::Docker);
        assert_eq!("Podman".parse::<RuntimeType>().unwrap(), RuntimeType::Podman);
        assert!("containerd".parse::<RuntimeType>().is_err());
    }

    #[test]
    fn compose_command_per_runtime() {
        assert_eq!(RuntimeType::Docker.compose_command(), ("docker", &["compose"][..]));
        assert_eq!(RuntimeType::Podman.compose_command().0, "podman");
    }
}
