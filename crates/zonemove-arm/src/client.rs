//! [`ComputeApi`] over the Resource Manager REST API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use zonemove_common::{
    ComputeApi, DiskDescriptor, DiskSpec, MigrateError, MigrateResult, ResourceScope,
    SnapshotDescriptor, SnapshotSpec, SubscriptionInfo, VmConfig, VmDescriptor,
};

use crate::auth::{Credential, TokenProvider};
use crate::config::ArmConfig;
use crate::models::{
    detach_on_delete_patch, AsyncOperationStatus, Disk, ErrorResponse, Subscription,
    VirtualMachine,
};
use crate::resource_id::ResourcePath;

/// Header carrying the status URL of an asynchronous operation.
pub const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Resource Manager client
pub struct ArmClient {
    http: Client,
    config: ArmConfig,
    tokens: TokenProvider,
}

impl ArmClient {
    /// Creates a client; no request is made until the first call.
    pub fn new(config: ArmConfig, credential: Credential) -> MigrateResult<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("zonemove/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrateError::http("build_client", e.to_string()))?;
        let tokens = TokenProvider::new(credential, config.authority.clone(), config.token_scope());

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    fn url(
        &self,
        path: &ResourcePath,
        api_version: &str,
        extra: &[(&str, &str)],
    ) -> MigrateResult<Url> {
        path.to_url(self.config.base_url(), api_version, extra)
    }

    /// Sends one request; non-success statuses become errors.
    async fn send<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> MigrateResult<Response> {
        let token = self.tokens.token(&self.http).await?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| MigrateError::auth(format!("unusable token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        debug!(%operation, %method, %url, "Sending request");
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MigrateError::http(operation, e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(operation, response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, url: &str) -> MigrateResult<T> {
        let response = self.send::<()>(operation, Method::GET, url, None).await?;
        response
            .json()
            .await
            .map_err(|e| MigrateError::http(operation, format!("invalid response body: {}", e)))
    }

    /// Sends a mutating request and waits for it to reach a terminal state.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> MigrateResult<()> {
        let response = self.send(operation, method, url, body).await?;
        self.wait_for_completion(operation, response).await
    }

    /// Polls a long-running operation until it finishes.
    ///
    /// `Azure-AsyncOperation` is preferred over `Location` when both are
    /// present. A synchronous response without either header is complete.
    async fn wait_for_completion(&self, operation: &str, response: Response) -> MigrateResult<()> {
        let status = response.status();
        let headers = response.headers().clone();

        let async_url = header_str(&headers, ASYNC_OPERATION_HEADER);
        let location_url = if status == StatusCode::ACCEPTED {
            header_str(&headers, LOCATION.as_str())
        } else {
            None
        };

        if async_url.is_none() && location_url.is_none() {
            return Ok(());
        }

        let started = Instant::now();
        let timeout = self.config.operation_timeout();
        let mut delay = retry_after(&headers).unwrap_or_else(|| self.config.poll_interval());

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(MigrateError::OperationTimeout {
                    operation: operation.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            tokio::time::sleep(delay.min(remaining)).await;

            if let Some(url) = &async_url {
                let poll = self.send::<()>(operation, Method::GET, url, None).await?;
                let next_delay = retry_after(poll.headers());
                let op_status: AsyncOperationStatus = poll.json().await.map_err(|e| {
                    MigrateError::http(operation, format!("invalid operation status: {}", e))
                })?;
                debug!(%operation, status = %op_status.status, "Polled operation status");

                if op_status.is_terminal() {
                    if op_status.succeeded() {
                        return Ok(());
                    }
                    let message = op_status
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_default();
                    return Err(MigrateError::OperationFailed {
                        operation: operation.to_string(),
                        status: op_status.status,
                        message,
                    });
                }
                delay = next_delay.unwrap_or_else(|| self.config.poll_interval());
            } else if let Some(url) = &location_url {
                let poll = self.send::<()>(operation, Method::GET, url, None).await?;
                if poll.status() != StatusCode::ACCEPTED {
                    return Ok(());
                }
                delay = retry_after(poll.headers()).unwrap_or_else(|| self.config.poll_interval());
            }
        }
    }

    /// Issues a DELETE; an already absent resource counts as deleted.
    async fn delete(&self, operation: &str, kind: &str, name: &str, url: &str) -> MigrateResult<()> {
        match self.execute::<()>(operation, Method::DELETE, url, None).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(%kind, %name, "Resource already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a failed response onto [`MigrateError`].
async fn error_from_response(operation: &str, response: Response) -> MigrateError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&text)
        .map(|r| r.error)
        .unwrap_or_default();
    let message = if detail.message.is_empty() {
        text
    } else {
        detail.message
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return MigrateError::auth(format!("{} returned {}: {}", operation, status, message));
    }

    MigrateError::Api {
        operation: operation.to_string(),
        status: status.as_u16(),
        code: detail.code,
        message,
    }
}

fn not_found_as(err: MigrateError, kind: &str, name: &str) -> MigrateError {
    if err.is_not_found() {
        MigrateError::not_found(kind, name)
    } else {
        err
    }
}

#[async_trait]
impl ComputeApi for ArmClient {
    #[instrument(skip(self))]
    async fn select_subscription(&self, subscription_id: &str) -> MigrateResult<SubscriptionInfo> {
        let url = self.url(
            &ResourcePath::subscription(subscription_id),
            &self.config.subscription_api_version,
            &[],
        )?;
        let sub: Subscription = self
            .get_json("select_subscription", url.as_str())
            .await
            .map_err(|e| not_found_as(e, "subscription", subscription_id))?;

        if sub.state != "Enabled" {
            return Err(MigrateError::auth(format!(
                "subscription {} is {}",
                subscription_id, sub.state
            )));
        }
        info!(subscription = %sub.subscription_id, name = %sub.display_name, "Subscription selected");
        Ok(sub.into())
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn get_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<VmDescriptor> {
        let url = self.url(
            &ResourcePath::vm(scope, name),
            &self.config.compute_api_version,
            &[],
        )?;
        let vm: VirtualMachine = self
            .get_json("get_vm", url.as_str())
            .await
            .map_err(|e| not_found_as(e, "virtual machine", name))?;
        VmDescriptor::try_from(vm)
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn power_off_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let url = self.url(
            &ResourcePath::vm(scope, name).child("powerOff"),
            &self.config.compute_api_version,
            &[("skipShutdown", "true")],
        )?;
        self.execute::<()>("power_off_vm", Method::POST, url.as_str(), None)
            .await
            .map_err(|e| not_found_as(e, "virtual machine", name))
    }

    #[instrument(skip(self, scope, vm), fields(rg = %scope.resource_group, vm = %vm.name))]
    async fn detach_on_delete(&self, scope: &ResourceScope, vm: &VmDescriptor) -> MigrateResult<()> {
        let body = detach_on_delete_patch(vm);
        let url = self.url(
            &ResourcePath::vm(scope, &vm.name),
            &self.config.compute_api_version,
            &[],
        )?;
        self.execute("detach_on_delete", Method::PATCH, url.as_str(), Some(&body))
            .await
            .map_err(|e| not_found_as(e, "virtual machine", &vm.name))
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn delete_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let url = self.url(
            &ResourcePath::vm(scope, name),
            &self.config.compute_api_version,
            &[],
        )?;
        self.delete("delete_vm", "virtual machine", name, url.as_str()).await
    }

    #[instrument(skip(self, scope, config), fields(rg = %scope.resource_group, vm = %config.name))]
    async fn create_vm(
        &self,
        scope: &ResourceScope,
        config: &VmConfig,
    ) -> MigrateResult<VmDescriptor> {
        let body = VirtualMachine::try_from(config)?;
        let url = self.url(
            &ResourcePath::vm(scope, &config.name),
            &self.config.compute_api_version,
            &[],
        )?;
        self.execute("create_vm", Method::PUT, url.as_str(), Some(&body)).await?;
        self.get_vm(scope, &config.name).await
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn get_disk(&self, scope: &ResourceScope, name: &str) -> MigrateResult<DiskDescriptor> {
        let url = self.url(
            &ResourcePath::disk(scope, name),
            &self.config.disk_api_version,
            &[],
        )?;
        let disk: Disk = self
            .get_json("get_disk", url.as_str())
            .await
            .map_err(|e| not_found_as(e, "disk", name))?;
        Ok(disk.into())
    }

    #[instrument(skip(self, scope, spec), fields(rg = %scope.resource_group, disk = %spec.name, zone = %spec.zone))]
    async fn create_disk(
        &self,
        scope: &ResourceScope,
        spec: &DiskSpec,
    ) -> MigrateResult<DiskDescriptor> {
        let body = Disk::from_spec(spec);
        let url = self.url(
            &ResourcePath::disk(scope, &spec.name),
            &self.config.disk_api_version,
            &[],
        )?;
        self.execute("create_disk", Method::PUT, url.as_str(), Some(&body)).await?;
        self.get_disk(scope, &spec.name).await
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn delete_disk(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let url = self.url(
            &ResourcePath::disk(scope, name),
            &self.config.disk_api_version,
            &[],
        )?;
        self.delete("delete_disk", "disk", name, url.as_str()).await
    }

    #[instrument(skip(self, scope, spec), fields(rg = %scope.resource_group, snapshot = %spec.name))]
    async fn create_snapshot(
        &self,
        scope: &ResourceScope,
        spec: &SnapshotSpec,
    ) -> MigrateResult<SnapshotDescriptor> {
        let body = Disk::snapshot_from_spec(spec);
        let url = self.url(
            &ResourcePath::snapshot(scope, &spec.name),
            &self.config.disk_api_version,
            &[],
        )?;
        self.execute("create_snapshot", Method::PUT, url.as_str(), Some(&body))
            .await?;

        let snapshot: Disk = self
            .get_json("get_snapshot", url.as_str())
            .await
            .map_err(|e| not_found_as(e, "snapshot", &spec.name))?;
        Ok(snapshot.into())
    }

    #[instrument(skip(self, scope), fields(rg = %scope.resource_group))]
    async fn delete_snapshot(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let url = self.url(
            &ResourcePath::snapshot(scope, name),
            &self.config.disk_api_version,
            &[],
        )?;
        self.delete("delete_snapshot", "snapshot", name, url.as_str()).await
    }
}
