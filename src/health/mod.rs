// ABOUTME: Health check engine judging whether a color's whole stack is serving.
// ABOUTME: Every endpoint must pass within one attempt; attempts follow a RetryPolicy.

mod probe;
mod retry;

pub use probe::{HttpProbe, Probe, ProbeStatus};
pub use retry::{RetryOutcome, RetryPolicy};

use futures::future::join_all;
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::topology::{ColorPorts, PortMap, Role};
use crate::types::Color;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("endpoint '{endpoint}' needs a {role} port, but the topology publishes none")]
    MissingPort { endpoint: String, role: Role },

    #[error("no health endpoints configured")]
    NoEndpoints,
}

/// Configured endpoint, independent of color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    pub role: Role,
    pub path: String,
}

/// Endpoint resolved to a concrete URL for one color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Resolve endpoint specs against one color's ports.
pub fn resolve_endpoints(
    specs: &[EndpointSpec],
    ports: &PortMap,
    host: &str,
) -> Result<NonEmpty<Endpoint>, HealthError> {
    let endpoints = specs
        .iter()
        .map(|spec| {
            let port = ports.get(spec.role).ok_or_else(|| HealthError::MissingPort {
                endpoint: spec.name.clone(),
                role: spec.role,
            })?;
            let path = if spec.path.starts_with('/') {
                spec.path.clone()
            } else {
                format!("/{}", spec.path)
            };
            Ok(Endpoint::new(
                spec.name.clone(),
                format!("http://{}:{}{}", host, port, path),
            ))
        })
        .collect::<Result<Vec<_>, HealthError>>()?;

    NonEmpty::from_vec(endpoints).ok_or(HealthError::NoEndpoints)
}

/// Everything needed to health check either color.
#[derive(Debug, Clone)]
pub struct HealthPlan {
    pub specs: Vec<EndpointSpec>,
    pub host: String,
    pub ports: ColorPorts,
    pub policy: RetryPolicy,
}

impl HealthPlan {
    pub fn endpoints(&self, color: Color) -> Result<NonEmpty<Endpoint>, HealthError> {
        resolve_endpoints(&self.specs, self.ports.get(color), &self.host)
    }
}

/// One request within one attempt. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub color: Color,
    pub endpoint: String,
    pub url: String,
    pub attempt: u32,
    pub status: ProbeStatus,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Aggregate of all attempts against one color.
#[derive(Debug, Clone, Serialize)]
pub struct HealthVerdict {
    pub color: Color,
    pub verdict: Verdict,
    pub attempts: u32,
    pub results: Vec<HealthCheckResult>,
}

impl HealthVerdict {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Human summary of what failed in the last attempt.
    pub fn failure_summary(&self) -> String {
        let failing: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.attempt == self.attempts && !r.passed)
            .map(|r| format!("{} ({})", r.endpoint, r.status))
            .collect();
        if failing.is_empty() {
            "all endpoints passed".to_string()
        } else {
            format!(
                "{} after {} attempt(s): {}",
                self.color,
                self.attempts,
                failing.join(", ")
            )
        }
    }
}

/// Runs health checks through a `Probe`.
#[derive(Debug, Clone)]
pub struct HealthChecker<P> {
    probe: P,
}

impl<P: Probe> HealthChecker<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Poll every endpoint until one attempt passes them all, or the
    /// policy's attempt budget is spent.
    pub async fn check(
        &self,
        color: Color,
        endpoints: &NonEmpty<Endpoint>,
        policy: &RetryPolicy,
    ) -> HealthVerdict {
        tracing::debug!(
            %color,
            endpoints = endpoints.len(),
            max_wait = ?policy.max_wait(),
            "health checking"
        );
        let outcome = policy
            .run(|attempt| async move {
                let results = self.attempt(color, endpoints, attempt, policy.timeout).await;
                if results.iter().all(|r| r.passed) {
                    Ok(results)
                } else {
                    Err(results)
                }
            })
            .await;

        let attempts = outcome.attempts();
        let verdict = if outcome.succeeded() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        let mut results: Vec<HealthCheckResult> = outcome.failures.into_iter().flatten().collect();
        results.extend(outcome.value.into_iter().flatten());

        match verdict {
            Verdict::Pass => tracing::info!(%color, attempts, "health check passed"),
            Verdict::Fail => tracing::warn!(%color, attempts, "health check failed"),
        }

        HealthVerdict {
            color,
            verdict,
            attempts,
            results,
        }
    }

    /// Resolve `color`'s endpoints from `plan` and check them.
    pub async fn check_plan(
        &self,
        color: Color,
        plan: &HealthPlan,
    ) -> Result<HealthVerdict, HealthError> {
        let endpoints = plan.endpoints(color)?;
        Ok(self.check(color, &endpoints, &plan.policy).await)
    }

    async fn attempt(
        &self,
        color: Color,
        endpoints: &NonEmpty<Endpoint>,
        attempt: u32,
        timeout: Duration,
    ) -> Vec<HealthCheckResult> {
        let probes = endpoints.iter().map(|endpoint| async move {
            let started = Instant::now();
            let status = self.probe.get(&endpoint.url, timeout).await;
            let passed = status.is_success();
            tracing::debug!(
                %color,
                endpoint = %endpoint.name,
                attempt,
                %status,
                "probed {}",
                endpoint.url
            );
            HealthCheckResult {
                color,
                endpoint: endpoint.name.clone(),
                url: endpoint.url.clone(),
                attempt,
                status,
                elapsed: started.elapsed(),
                passed,
            }
        });
        join_all(probes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<EndpointSpec> {
        vec![
            EndpointSpec {
                name: "backend-live".into(),
                role: Role::Backend,
                path: "/health/live".into(),
            },
            EndpointSpec {
                name: "router".into(),
                role: Role::ProxyHttp,
                path: "health".into(),
            },
        ]
    }

    #[test]
    fn resolves_urls_from_port_map() {
        let ports = PortMap {
            backend: Some(8001),
            proxy_http: Some(81),
            ..PortMap::default()
        };
        let endpoints = resolve_endpoints(&specs(), &ports, "127.0.0.1").unwrap();
        assert_eq!(endpoints.head.url, "http://127.0.0.1:8001/health/live");
        assert_eq!(endpoints.tail[0].url, "http://127.0.0.1:81/health");
    }

    #[test]
    fn missing_role_port_is_error() {
        let ports = PortMap {
            backend: Some(8001),
            ..PortMap::default()
        };
        assert!(matches!(
            resolve_endpoints(&specs(), &ports, "localhost"),
            Err(HealthError::MissingPort { role: Role::ProxyHttp, .. })
        ));
    }

    #[test]
    fn empty_specs_are_error() {
        assert!(matches!(
            resolve_endpoints(&[], &PortMap::default(), "localhost"),
            Err(HealthError::NoEndpoints)
        ));
    }

    #[test]
    fn plan_resolves_per_color() {
        let plan = HealthPlan {
            specs: specs(),
            host: "127.0.0.1".into(),
            ports: ColorPorts {
                blue: PortMap {
                    backend: Some(8001),
                    proxy_http: Some(81),
                    ..PortMap::default()
                },
                green: PortMap {
                    backend: Some(8002),
                    proxy_http: Some(82),
                    ..PortMap::default()
                },
            },
            policy: RetryPolicy::default(),
        };
        let green = plan.endpoints(Color::Green).unwrap();
        assert_eq!(green.head.url, "http://127.0.0.1:8002/health/live");
    }
}
