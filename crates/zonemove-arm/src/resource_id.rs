//! Resource Manager paths.
//!
//! A [`ResourcePath`] keeps its segments raw; they are percent-encoded only
//! when joined onto the endpoint, so a name can never add or split a segment.

use std::fmt;

use reqwest::Url;
use zonemove_common::{MigrateError, MigrateResult, ResourceScope};

/// Compute resource provider namespace.
pub const COMPUTE_PROVIDER: &str = "Microsoft.Compute";

/// Path of a Resource Manager resource, as unencoded segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// `/subscriptions/{id}`
    pub fn subscription(subscription_id: &str) -> Self {
        Self {
            segments: vec!["subscriptions".to_string(), subscription_id.to_string()],
        }
    }

    /// Compute resource of `kind` named `name` in `scope`.
    pub fn compute(scope: &ResourceScope, kind: &str, name: &str) -> Self {
        let mut path = Self::subscription(&scope.subscription_id);
        path.segments.extend(
            [
                "resourceGroups",
                scope.resource_group.as_str(),
                "providers",
                COMPUTE_PROVIDER,
                kind,
                name,
            ]
            .map(str::to_string),
        );
        path
    }

    pub fn vm(scope: &ResourceScope, name: &str) -> Self {
        Self::compute(scope, "virtualMachines", name)
    }

    pub fn disk(scope: &ResourceScope, name: &str) -> Self {
        Self::compute(scope, "disks", name)
    }

    pub fn snapshot(scope: &ResourceScope, name: &str) -> Self {
        Self::compute(scope, "snapshots", name)
    }

    /// Appends an action or child segment, e.g. `powerOff`.
    pub fn child(mut self, segment: &str) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Joins the path onto `endpoint` and adds `api-version` plus `extra`
    /// query parameters.
    pub fn to_url(
        &self,
        endpoint: &str,
        api_version: &str,
        extra: &[(&str, &str)],
    ) -> MigrateResult<Url> {
        let mut url = Url::parse(endpoint).map_err(|e| {
            MigrateError::invalid_config("endpoint", format!("'{}': {}", endpoint, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                MigrateError::invalid_config(
                    "endpoint",
                    format!("'{}' cannot carry a path", endpoint),
                )
            })?
            .pop_if_empty()
            .extend(&self.segments);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
