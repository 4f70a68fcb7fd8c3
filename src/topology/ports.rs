// ABOUTME: Compose port mapping parsing and per-color port shifting.
// ABOUTME: PortPlan maps base host ports into disjoint blue and green ranges.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::TopologyError;
use crate::types::Color;

/// A published port, as written in a compose `ports:` list.
///
/// Accepts `"8000"`, `"8000:8000"`, `"127.0.0.1:8000:8000"` and an optional
/// `/tcp` or `/udp` suffix. Bare integers are container-only ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Option<String>,
}

impl PortMapping {
    pub fn parse(spec: &str) -> Result<Self, TopologyError> {
        let invalid = || TopologyError::InvalidPort(spec.to_string());
        let spec = spec.trim();

        let (port_part, protocol) = match spec.split_once('/') {
            Some((ports, proto @ ("tcp" | "udp"))) => (ports, Some(proto.to_string())),
            Some(_) => return Err(invalid()),
            None => (spec, None),
        };

        let parts: Vec<&str> = port_part.split(':').collect();
        let parse = |s: &str| s.parse::<u16>().map_err(|_| invalid());

        let (host_ip, host_port, container_port) = match parts.as_slice() {
            [container] => (None, None, parse(container)?),
            [host, container] => (None, Some(parse(host)?), parse(container)?),
            [ip, host, container] => (
                Some((*ip).to_string()),
                Some(parse(host)?),
                parse(container)?,
            ),
            _ => return Err(invalid()),
        };

        Ok(Self {
            host_ip,
            host_port,
            container_port,
            protocol,
        })
    }

    /// Copy of this mapping with the host port moved by the color's offset.
    pub fn shifted(&self, plan: &PortPlan, color: Color) -> Result<Self, TopologyError> {
        let host_port = match self.host_port {
            Some(port) => Some(plan.shift(color, port)?),
            None => None,
        };
        Ok(Self {
            host_port,
            ..self.clone()
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref ip) = self.host_ip {
            write!(f, "{}:", ip)?;
        }
        if let Some(host) = self.host_port {
            write!(f, "{}:", host)?;
        }
        write!(f, "{}", self.container_port)?;
        if let Some(ref proto) = self.protocol {
            write!(f, "/{}", proto)?;
        }
        Ok(())
    }
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PortMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PortVisitor;

        impl Visitor<'_> for PortVisitor {
            type Value = PortMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a port number or a \"host:container\" string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                let port = u16::try_from(v).map_err(|_| E::custom(format!("invalid port: {v}")))?;
                Ok(PortMapping {
                    host_ip: None,
                    host_port: None,
                    container_port: port,
                    protocol: None,
                })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let v = u64::try_from(v).map_err(|_| E::custom(format!("invalid port: {v}")))?;
                self.visit_u64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                PortMapping::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(PortVisitor)
    }
}

/// Fixed per-color host port offsets.
///
/// `shift` and `unshift` are exact inverses, so any component can compute a
/// color's ports from the base topology on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlan {
    #[serde(default = "default_blue_offset")]
    pub blue: u16,
    #[serde(default = "default_green_offset")]
    pub green: u16,
}

fn default_blue_offset() -> u16 {
    1
}

fn default_green_offset() -> u16 {
    2
}

impl Default for PortPlan {
    fn default() -> Self {
        Self {
            blue: default_blue_offset(),
            green: default_green_offset(),
        }
    }
}

impl PortPlan {
    pub fn offset(&self, color: Color) -> u16 {
        match color {
            Color::Blue => self.blue,
            Color::Green => self.green,
        }
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.blue == 0 || self.green == 0 {
            return Err(TopologyError::InvalidOffsets(
                "color offsets must be non-zero".to_string(),
            ));
        }
        if self.blue == self.green {
            return Err(TopologyError::InvalidOffsets(format!(
                "blue and green share offset {}",
                self.blue
            )));
        }
        Ok(())
    }

    pub fn shift(&self, color: Color, base: u16) -> Result<u16, TopologyError> {
        base.checked_add(self.offset(color))
            .ok_or(TopologyError::PortOverflow { port: base, color })
    }

    pub fn unshift(&self, color: Color, port: u16) -> Result<u16, TopologyError> {
        port.checked_sub(self.offset(color))
            .ok_or(TopologyError::PortOverflow { port, color })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_container_only() {
        let p = PortMapping::parse("8080").unwrap();
        assert_eq!(p.host_port, None);
        assert_eq!(p.container_port, 8080);
    }

    #[test]
    fn parse_host_and_container() {
        let p = PortMapping::parse("8000:80/tcp").unwrap();
        assert_eq!(p.host_port, Some(8000));
        assert_eq!(p.container_port, 80);
        assert_eq!(p.protocol.as_deref(), Some("tcp"));
    }

    #[test]
    fn parse_with_host_ip() {
        let p = PortMapping::parse("127.0.0.1:5432:5432").unwrap();
        assert_eq!(p.host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(p.to_string(), "127.0.0.1:5432:5432");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PortMapping::parse("abc").is_err());
        assert!(PortMapping::parse("80:80/sctp").is_err());
        assert!(PortMapping::parse("1:2:3:4").is_err());
    }

    #[test]
    fn shifted_leaves_container_port() {
        let p = PortMapping::parse("8000:8000").unwrap();
        let shifted = p.shifted(&PortPlan::default(), Color::Green).unwrap();
        assert_eq!(shifted.to_string(), "8002:8000");
    }

    #[test]
    fn shift_and_unshift_are_inverse() {
        let plan = PortPlan { blue: 100, green: 200 };
        for color in Color::ALL {
            let shifted = plan.shift(color, 3000).unwrap();
            assert_eq!(plan.unshift(color, shifted).unwrap(), 3000);
        }
    }

    #[test]
    fn shift_overflow_is_error() {
        let plan = PortPlan::default();
        assert!(matches!(
            plan.shift(Color::Green, u16::MAX),
            Err(TopologyError::PortOverflow { .. })
        ));
    }

    #[test]
    fn equal_offsets_are_rejected() {
        let plan = PortPlan { blue: 5, green: 5 };
        assert!(plan.validate().is_err());
        assert!(PortPlan { blue: 0, green: 1 }.validate().is_err());
    }
}
