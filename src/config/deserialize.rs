// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Rejects empty endpoint lists at parse time.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::health::EndpointSpec;

pub fn deserialize_endpoints<'de, D>(deserializer: D) -> Result<NonEmpty<EndpointSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<EndpointSpec> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one health endpoint is required"))
}
