//! Shared test utilities and fixtures for the omsdeploy test suite.
//!
//! This module provides:
//! - [`FakeAzureApi`], an in-memory subscription implementing `AzureApi`
//! - VM and record builders
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use omsdeploy::azure::{
    AzureApi, ExtensionRecord, ExtensionRequest, ExtensionState, OsFamily, PowerState,
    SharedKeys, Subscription, VmReference, WorkspaceInfo,
};
use omsdeploy::error::{Error, Result};
use omsdeploy::provisioner::{Provisioner, ProvisionerOptions};
use omsdeploy::secret::SecretString;
use omsdeploy::workspace::WorkspaceSettings;

// ============================================================================
// Builders
// ============================================================================

/// A VM reference in `resource_group` with a synthetic ARM ID.
pub fn vm(resource_group: &str, name: &str, os_family: OsFamily, power_state: PowerState) -> VmReference {
    VmReference {
        id: format!(
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
            resource_group, name
        ),
        resource_group: resource_group.to_string(),
        name: name.to_string(),
        os_family,
        power_state,
        location: "westeurope".to_string(),
    }
}

pub fn running_linux(resource_group: &str, name: &str) -> VmReference {
    vm(resource_group, name, OsFamily::Linux, PowerState::Running)
}

pub fn running_windows(resource_group: &str, name: &str) -> VmReference {
    vm(resource_group, name, OsFamily::Windows, PowerState::Running)
}

pub fn workspace_settings() -> Arc<WorkspaceSettings> {
    Arc::new(WorkspaceSettings::new(
        "11111111-2222-3333-4444-555555555555",
        SecretString::new("c2hhcmVkLWtleQ=="),
    ))
}

/// Provisioner over `api` that does not wait between polls.
pub fn provisioner(api: Arc<FakeAzureApi>, options: ProvisionerOptions) -> Provisioner {
    Provisioner::new(api, workspace_settings(), options)
}

// ============================================================================
// Fake Azure
// ============================================================================

fn key(resource_group: &str, name: &str) -> (String, String) {
    (resource_group.to_lowercase(), name.to_lowercase())
}

/// In-memory subscription.
///
/// Extensions written by `set_extension` become visible to `get_extension`,
/// so repeated runs observe earlier installs.
pub struct FakeAzureApi {
    subscription: Subscription,
    vms: Vec<VmReference>,
    power: HashMap<(String, String), PowerState>,
    extensions: RwLock<HashMap<(String, String, String), ExtensionRecord>>,
    requests: RwLock<Vec<ExtensionRequest>>,
    workspace: Option<WorkspaceInfo>,
    primary_key: Option<String>,
    failing_groups: HashSet<String>,
    failing_installs: HashSet<String>,
    panicking: HashSet<String>,
    install_delay: Duration,
    install_calls: AtomicUsize,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeAzureApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAzureApi {
    pub fn new() -> Self {
        Self {
            subscription: Subscription {
                subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
                display_name: Some("Test Subscription".to_string()),
                state: Some("Enabled".to_string()),
            },
            vms: Vec::new(),
            power: HashMap::new(),
            extensions: RwLock::new(HashMap::new()),
            requests: RwLock::new(Vec::new()),
            workspace: Some(WorkspaceInfo {
                id: "/subscriptions/0000/resourceGroups/rg-ops/providers/Microsoft.OperationalInsights/workspaces/la-prod".to_string(),
                name: "la-prod".to_string(),
                customer_id: Some("11111111-2222-3333-4444-555555555555".to_string()),
            }),
            primary_key: Some("c2hhcmVkLWtleQ==".to_string()),
            failing_groups: HashSet::new(),
            failing_installs: HashSet::new(),
            panicking: HashSet::new(),
            install_delay: Duration::ZERO,
            install_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_vm(mut self, vm: VmReference) -> Self {
        self.power
            .insert(key(&vm.resource_group, &vm.name), vm.power_state.clone());
        self.vms.push(vm);
        self
    }

    pub fn with_vms(self, vms: impl IntoIterator<Item = VmReference>) -> Self {
        vms.into_iter().fold(self, Self::with_vm)
    }

    /// Pre-install an extension.
    pub fn with_extension(self, resource_group: &str, vm_name: &str, extension: &str) -> Self {
        self.extensions.write().insert(
            (
                resource_group.to_lowercase(),
                vm_name.to_lowercase(),
                extension.to_string(),
            ),
            record(extension, ExtensionState::Succeeded),
        );
        self
    }

    pub fn with_subscription_state(mut self, state: &str) -> Self {
        self.subscription.state = Some(state.to_string());
        self
    }

    pub fn with_workspace_customer_id(mut self, customer_id: Option<&str>) -> Self {
        if let Some(ws) = self.workspace.as_mut() {
            ws.customer_id = customer_id.map(String::from);
        }
        self
    }

    pub fn without_workspace(mut self) -> Self {
        self.workspace = None;
        self
    }

    pub fn with_primary_key(mut self, key: Option<&str>) -> Self {
        self.primary_key = key.map(String::from);
        self
    }

    /// Listing this resource group returns an error.
    pub fn fail_group(mut self, resource_group: &str) -> Self {
        self.failing_groups.insert(resource_group.to_lowercase());
        self
    }

    /// Installing on this VM returns an error.
    pub fn fail_install(mut self, vm_name: &str) -> Self {
        self.failing_installs.insert(vm_name.to_lowercase());
        self
    }

    /// Installing on this VM panics.
    pub fn panic_on_install(mut self, vm_name: &str) -> Self {
        self.panicking.insert(vm_name.to_lowercase());
        self
    }

    /// Each install takes this long.
    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = delay;
        self
    }

    pub fn install_calls(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }

    /// Subscription-wide listings served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every install request seen so far.
    pub fn requests(&self) -> Vec<ExtensionRequest> {
        self.requests.read().clone()
    }
}

pub fn record(name: &str, state: ExtensionState) -> ExtensionRecord {
    ExtensionRecord {
        name: name.to_string(),
        publisher: Some("Microsoft.EnterpriseCloud.Monitoring".to_string()),
        extension_type: Some(name.to_string()),
        type_handler_version: Some("1.0".to_string()),
        state,
    }
}

fn not_found(what: &str) -> Error {
    Error::Api {
        status: 404,
        code: Some("ResourceNotFound".to_string()),
        message: format!("{} was not found", what),
        retry_after: None,
    }
}

#[async_trait]
impl AzureApi for FakeAzureApi {
    async fn get_subscription(&self) -> Result<Subscription> {
        Ok(self.subscription.clone())
    }

    async fn list_vms(&self) -> Result<Vec<VmReference>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vms.clone())
    }

    async fn list_vms_in_group(&self, resource_group: &str) -> Result<Vec<VmReference>> {
        if self.failing_groups.contains(&resource_group.to_lowercase()) {
            return Err(not_found(&format!("resource group '{}'", resource_group)));
        }
        Ok(self
            .vms
            .iter()
            .filter(|vm| vm.resource_group.eq_ignore_ascii_case(resource_group))
            .cloned()
            .collect())
    }

    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VmReference> {
        self.vms
            .iter()
            .find(|vm| vm.key() == key(resource_group, name))
            .cloned()
            .ok_or_else(|| not_found(&format!("VM '{}/{}'", resource_group, name)))
    }

    async fn power_state(&self, resource_group: &str, name: &str) -> Result<PowerState> {
        self.power
            .get(&key(resource_group, name))
            .cloned()
            .ok_or_else(|| not_found(&format!("VM '{}/{}'", resource_group, name)))
    }

    async fn get_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionRecord>> {
        let (rg, vm) = key(resource_group, vm_name);
        Ok(self
            .extensions
            .read()
            .get(&(rg, vm, extension_name.to_string()))
            .cloned())
    }

    async fn set_extension(&self, request: &ExtensionRequest) -> Result<ExtensionRecord> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.install_delay.is_zero() {
            tokio::time::sleep(self.install_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.requests.write().push(request.clone());

        let vm_name = request.vm_name.to_lowercase();
        if self.panicking.contains(&vm_name) {
            panic!("simulated crash installing on {}", request.vm_name);
        }
        if self.failing_installs.contains(&vm_name) {
            return Err(Error::api(409, "Another operation is in progress"));
        }

        let installed = record(request.spec.name, ExtensionState::Succeeded);
        let (rg, vm) = key(&request.resource_group, &request.vm_name);
        self.extensions
            .write()
            .insert((rg, vm, request.spec.name.to_string()), installed.clone());
        Ok(installed)
    }

    async fn get_workspace(&self, resource_group: &str, name: &str) -> Result<WorkspaceInfo> {
        match &self.workspace {
            Some(ws) if ws.name.eq_ignore_ascii_case(name) => Ok(ws.clone()),
            _ => Err(not_found(&format!("workspace '{}/{}'", resource_group, name))),
        }
    }

    async fn get_shared_keys(&self, resource_group: &str, name: &str) -> Result<SharedKeys> {
        self.get_workspace(resource_group, name).await?;
        Ok(SharedKeys {
            primary_shared_key: self.primary_key.clone().map(SecretString::new),
        })
    }
}
