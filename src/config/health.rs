// ABOUTME: Health check configuration: endpoints per role and the retry policy.
// ABOUTME: Defaults probe backend liveness and readiness plus the color's router.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::time::Duration;

use super::deserialize::deserialize_endpoints;
use crate::health::{EndpointSpec, HealthPlan, RetryPolicy};
use crate::topology::{ColorPorts, Role};

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    #[serde(
        default = "default_endpoints",
        deserialize_with = "deserialize_endpoints"
    )]
    pub endpoints: NonEmpty<EndpointSpec>,

    /// Host the color's published ports are reached on.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_endpoints() -> NonEmpty<EndpointSpec> {
    NonEmpty::from((
        EndpointSpec {
            name: "backend-live".to_string(),
            role: Role::Backend,
            path: "/health/live".to_string(),
        },
        vec![
            EndpointSpec {
                name: "backend-ready".to_string(),
                role: Role::Backend,
                path: "/health/ready".to_string(),
            },
            EndpointSpec {
                name: "router".to_string(),
                role: Role::ProxyHttp,
                path: "/health".to_string(),
            },
        ],
    ))
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_attempts() -> u32 {
    3
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            host: default_host(),
            attempts: default_attempts(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

impl HealthSettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, self.interval, self.timeout)
    }

    pub fn plan(&self, ports: ColorPorts) -> HealthPlan {
        HealthPlan {
            specs: self.endpoints.iter().cloned().collect(),
            host: self.host.clone(),
            ports,
            policy: self.policy(),
        }
    }
}
