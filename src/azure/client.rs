//! Azure Resource Manager REST client.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use super::auth::Authenticator;
use super::extension::{ExtensionRecord, ExtensionRequest};
use super::models::{
    ErrorResponse, InstanceView, Page, SharedKeys, Subscription, VirtualMachine,
    VirtualMachineExtension, Workspace, WorkspaceInfo,
};
use super::vm::{PowerState, VmReference};
use super::AzureApi;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

const SUBSCRIPTION_API_VERSION: &str = "2022-12-01";
const COMPUTE_API_VERSION: &str = "2023-03-01";
const WORKSPACE_API_VERSION: &str = "2022-10-01";
const SHARED_KEYS_API_VERSION: &str = "2020-08-01";

/// Resource Manager client bound to one subscription.
///
/// Cheap to clone; clones share the HTTP connection pool and token cache.
#[derive(Clone)]
pub struct ArmClient {
    inner: Arc<Inner>,
}

struct Inner {
    auth: Authenticator,
    base: Url,
    subscription_id: String,
    retry: RetryPolicy,
}

impl ArmClient {
    pub fn new(
        auth: Authenticator,
        subscription_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base = Url::parse(auth.environment().resource_manager())?;
        Ok(Self {
            inner: Arc::new(Inner {
                auth,
                base,
                subscription_id: subscription_id.into(),
                retry,
            }),
        })
    }

    /// Build `{base}/subscriptions/{id}/{segments...}?api-version=...`.
    fn endpoint(&self, segments: &[&str], api_version: &str) -> Result<Url> {
        let mut url = self.inner.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal("resource manager URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("subscriptions")
            .push(&self.inner.subscription_id)
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn vm_endpoint(&self, resource_group: &str, name: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec![
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.Compute",
            "virtualMachines",
            name,
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments, COMPUTE_API_VERSION)
    }

    fn workspace_endpoint(
        &self,
        resource_group: &str,
        name: &str,
        rest: &[&str],
        api_version: &str,
    ) -> Result<Url> {
        let mut segments = vec![
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.OperationalInsights",
            "workspaces",
            name,
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments, api_version)
    }

    /// Issue one request, retrying transient failures, and decode the body.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T> {
        self.call_retrying(method, url, body, Error::is_transient).await
    }

    async fn call_retrying<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        retry_on: fn(&Error) -> bool,
    ) -> Result<T> {
        let operation = format!("{} {}", method, url.path());
        self.inner
            .retry
            .execute_when(&operation, retry_on, || {
                self.send_once(method.clone(), url.clone(), body)
            })
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T> {
        let token = self.inner.auth.token().await?;
        trace!("{} {}", method, url);

        let mut builder = self
            .inner
            .auth
            .http()
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(api_error(response).await)
        }
    }

    /// Follow `nextLink` until the listing is exhausted.
    async fn list_all<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.call(Method::GET, url, None).await?;
            items.extend(page.value);
            next = page.next_link.as_deref().map(Url::parse).transpose()?;
        }

        Ok(items)
    }

    async fn list_references(&self, url: Url) -> Result<Vec<VmReference>> {
        self.list_all::<VirtualMachine>(url)
            .await?
            .into_iter()
            .map(VirtualMachine::into_reference)
            .collect()
    }
}

/// Turn a non-success response into [`Error::Api`].
async fn api_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let text = response.text().await.unwrap_or_default();

    let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(parsed) => (
            parsed.error.code,
            parsed.error.message.unwrap_or_else(|| text.clone()),
        ),
        Err(_) if text.is_empty() => (None, "empty response body".to_string()),
        Err(_) => (None, text),
    };

    Error::Api {
        status,
        code,
        message,
        retry_after,
    }
}

#[async_trait]
impl AzureApi for ArmClient {
    async fn get_subscription(&self) -> Result<Subscription> {
        let url = self.endpoint(&[], SUBSCRIPTION_API_VERSION)?;
        self.call(Method::GET, url, None).await
    }

    async fn list_vms(&self) -> Result<Vec<VmReference>> {
        let url = self.endpoint(
            &["providers", "Microsoft.Compute", "virtualMachines"],
            COMPUTE_API_VERSION,
        )?;
        self.list_references(url).await
    }

    async fn list_vms_in_group(&self, resource_group: &str) -> Result<Vec<VmReference>> {
        let url = self.endpoint(
            &[
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.Compute",
                "virtualMachines",
            ],
            COMPUTE_API_VERSION,
        )?;
        self.list_references(url).await
    }

    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VmReference> {
        let mut url = self.vm_endpoint(resource_group, name, &[])?;
        url.query_pairs_mut().append_pair("$expand", "instanceView");
        let vm: VirtualMachine = self.call(Method::GET, url, None).await?;
        vm.into_reference()
    }

    async fn power_state(&self, resource_group: &str, name: &str) -> Result<PowerState> {
        let url = self.vm_endpoint(resource_group, name, &["instanceView"])?;
        let view: InstanceView = self.call(Method::GET, url, None).await?;
        Ok(view.power_state())
    }

    async fn get_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionRecord>> {
        let url = self.vm_endpoint(resource_group, vm_name, &["extensions", extension_name])?;
        match self.call::<VirtualMachineExtension>(Method::GET, url, None).await {
            Ok(ext) => Ok(Some(ext.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_extension(&self, request: &ExtensionRequest) -> Result<ExtensionRecord> {
        let url = self.vm_endpoint(
            &request.resource_group,
            &request.vm_name,
            &["extensions", request.spec.name],
        )?;
        let body = request.body();
        // A 5xx may arrive after the install was accepted.
        let ext: VirtualMachineExtension = self
            .call_retrying(Method::PUT, url, Some(&body), Error::is_throttled)
            .await?;
        debug!(
            "{} on {}/{} reported {:?}",
            request.spec.name,
            request.resource_group,
            request.vm_name,
            ext.properties.provisioning_state
        );
        Ok(ext.into())
    }

    async fn get_workspace(&self, resource_group: &str, name: &str) -> Result<WorkspaceInfo> {
        let url = self.workspace_endpoint(resource_group, name, &[], WORKSPACE_API_VERSION)?;
        let workspace: Workspace = self.call(Method::GET, url, None).await?;
        Ok(workspace.into())
    }

    async fn get_shared_keys(&self, resource_group: &str, name: &str) -> Result<SharedKeys> {
        let url = self.workspace_endpoint(
            resource_group,
            name,
            &["sharedKeys"],
            SHARED_KEYS_API_VERSION,
        )?;
        self.call(Method::POST, url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::Credential;
    use crate::azure::environment::CloudEnvironment;
    use crate::secret::SecretString;

    fn client() -> ArmClient {
        let credential = Credential {
            name: "test".into(),
            tenant_id: "tenant".into(),
            application_id: "app".into(),
            certificate_thumbprint: None,
            certificate_path: None,
            client_secret: Some(SecretString::new("secret")),
        };
        let auth = Authenticator::new(CloudEnvironment::AzureCloud, &credential).unwrap();
        ArmClient::new(auth, "sub-1", RetryPolicy::no_retry()).unwrap()
    }

    #[test]
    fn test_vm_endpoint() {
        let url = client().vm_endpoint("rg-web", "web01", &["extensions", "OmsAgentForLinux"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web01/extensions/OmsAgentForLinux?api-version=2023-03-01"
        );
    }

    #[test]
    fn test_workspace_endpoint() {
        let url = client()
            .workspace_endpoint("rg-ops", "la-prod", &["sharedKeys"], SHARED_KEYS_API_VERSION)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-ops/providers/Microsoft.OperationalInsights/workspaces/la-prod/sharedKeys?api-version=2020-08-01"
        );
    }

    #[test]
    fn test_subscription_endpoint() {
        let url = client().endpoint(&[], SUBSCRIPTION_API_VERSION).unwrap();
        assert_eq!(
            url.as_str(),
            "https://management.azure.com/subscriptions/sub-1?api-version=2022-12-01"
        );
    }
}
