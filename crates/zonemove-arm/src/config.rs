//! Settings for the Resource Manager client.
//!
//! Every field has a default so an `[arm]` table in the zonemove config file
//! only needs the values it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zonemove_common::{MigrateError, MigrateResult};

/// Resource Manager endpoint and polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    /// Resource Manager base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// OAuth2 authority used for client-credential tokens
    #[serde(default = "default_authority")]
    pub authority: String,

    /// API version for virtual machine calls
    #[serde(default = "default_compute_api_version")]
    pub compute_api_version: String,

    /// API version for disk and snapshot calls
    #[serde(default = "default_disk_api_version")]
    pub disk_api_version: String,

    /// API version for subscription calls
    #[serde(default = "default_subscription_api_version")]
    pub subscription_api_version: String,

    /// Delay between long-running operation polls when the service sends no
    /// Retry-After
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound on waiting for one long-running operation
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_compute_api_version() -> String {
    "2024-03-01".to_string()
}

fn default_disk_api_version() -> String {
    "2023-10-02".to_string()
}

fn default_subscription_api_version() -> String {
    "2022-12-01".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_operation_timeout() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            authority: default_authority(),
            compute_api_version: default_compute_api_version(),
            disk_api_version: default_disk_api_version(),
            subscription_api_version: default_subscription_api_version(),
            poll_interval_secs: default_poll_interval(),
            operation_timeout_secs: default_operation_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ArmConfig {
    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// OAuth2 scope for Resource Manager tokens.
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.base_url())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> MigrateResult<()> {
        for (field, value) in [("endpoint", &self.endpoint), ("authority", &self.authority)] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(MigrateError::invalid_config(
                    field,
                    format!("'{}' is not an http(s) URL", value),
                ));
            }
        }

        if self.operation_timeout_secs == 0 {
            return Err(MigrateError::invalid_config(
                "operation_timeout_secs",
                "must be > 0",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(MigrateError::invalid_config(
                "request_timeout_secs",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
