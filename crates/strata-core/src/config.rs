//! Runtime configuration.
//!
//! Loaded from camelCase JSON. Only the consistency horizon is required;
//! everything else falls back to defaults sized for a small cluster.

use crate::{
    STATEMENT_LIMIT,
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

pub const DEFAULT_SYSTEM_KEYSPACE: &str = "strata_meta";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid config document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("config value '{field}' must be greater than zero")]
    Zero { field: &'static str },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Invalid, ErrorOrigin::Config, err.to_string())
    }
}

///
/// StrataConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrataConfig {
    #[serde(default)]
    pub contact_points: Vec<String>,

    #[serde(default)]
    pub local_datacenter: Option<String>,

    #[serde(default)]
    pub keyspace: Option<String>,

    #[serde(default = "default_system_keyspace")]
    pub system_keyspace: String,

    #[serde(default = "default_connections_local")]
    pub max_connection_per_host_local: u32,

    #[serde(default = "default_connections_remote")]
    pub max_connection_per_host_remote: u32,

    #[serde(default = "default_requests_per_connection")]
    pub max_simultaneous_requests_per_connection: u32,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_millis: u64,

    #[serde(default = "default_node_timeout")]
    pub individual_node_connection_timeout_millis: u64,

    #[serde(default = "default_node_timeout")]
    pub driver_read_timeout_millis: u64,

    pub consistency_horizon_millis: u64,

    #[serde(default)]
    pub log_cql: bool,

    #[serde(default = "default_true")]
    pub execute_async: bool,

    #[serde(default)]
    pub use_logged_batches: bool,

    #[serde(default = "default_statement_limit")]
    pub statement_limit: usize,
}

impl StrataConfig {
    /// Defaults for everything except the consistency horizon.
    #[must_use]
    pub fn new(consistency_horizon: Duration) -> Self {
        Self {
            contact_points: Vec::new(),
            local_datacenter: None,
            keyspace: None,
            system_keyspace: default_system_keyspace(),
            max_connection_per_host_local: default_connections_local(),
            max_connection_per_host_remote: default_connections_remote(),
            max_simultaneous_requests_per_connection: default_requests_per_connection(),
            batch_timeout_millis: default_batch_timeout(),
            individual_node_connection_timeout_millis: default_node_timeout(),
            driver_read_timeout_millis: default_node_timeout(),
            consistency_horizon_millis: u64::try_from(consistency_horizon.as_millis())
                .unwrap_or(u64::MAX),
            log_cql: false,
            execute_async: true,
            use_logged_batches: false,
            statement_limit: default_statement_limit(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("consistencyHorizonMillis", self.consistency_horizon_millis),
            ("batchTimeoutMillis", self.batch_timeout_millis),
            (
                "maxConnectionPerHostLocal",
                u64::from(self.max_connection_per_host_local),
            ),
            (
                "maxConnectionPerHostRemote",
                u64::from(self.max_connection_per_host_remote),
            ),
            (
                "maxSimultaneousRequestsPerConnection",
                u64::from(self.max_simultaneous_requests_per_connection),
            ),
            (
                "statementLimit",
                u64::try_from(self.statement_limit).unwrap_or(u64::MAX),
            ),
        ];

        match checks.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::Zero { field }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn consistency_horizon(&self) -> Duration {
        Duration::from_millis(self.consistency_horizon_millis)
    }

    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_millis)
    }

    #[must_use]
    pub const fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            max_connections_local: self.max_connection_per_host_local,
            max_connections_remote: self.max_connection_per_host_remote,
            max_requests_per_connection: self.max_simultaneous_requests_per_connection,
            connect_timeout: Duration::from_millis(self.individual_node_connection_timeout_millis),
            read_timeout: Duration::from_millis(self.driver_read_timeout_millis),
        }
    }
}

///
/// PoolLimits
///
/// Connection pool ceilings handed to a session implementation. Local and
/// remote datacenters are sized independently.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolLimits {
    pub max_connections_local: u32,
    pub max_connections_remote: u32,
    pub max_requests_per_connection: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl PoolLimits {
    /// Requests that may be in flight against one local host.
    #[must_use]
    pub fn max_in_flight_local(&self) -> u64 {
        u64::from(self.max_connections_local) * u64::from(self.max_requests_per_connection)
    }
}

fn default_system_keyspace() -> String {
    DEFAULT_SYSTEM_KEYSPACE.to_string()
}

const fn default_connections_local() -> u32 {
    16
}

const fn default_connections_remote() -> u32 {
    4
}

const fn default_requests_per_connection() -> u32 {
    128
}

const fn default_batch_timeout() -> u64 {
    10_000
}

const fn default_node_timeout() -> u64 {
    2_000
}

const fn default_true() -> bool {
    true
}

const fn default_statement_limit() -> usize {
    STATEMENT_LIMIT
}

///
/// TESTS
///
