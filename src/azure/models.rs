//! Wire models for the Azure Resource Manager responses we read.
//!
//! Only the fields the rollout uses are modelled; everything else in the
//! payloads is ignored.

use serde::Deserialize;

use super::extension::{ExtensionRecord, ExtensionState};
use super::vm::{resource_group_from_id, OsFamily, PowerState, VmReference};
use crate::error::{Error, Result};
use crate::secret::SecretString;

/// One page of an ARM list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    pub next_link: Option<String>,
}

/// ARM error envelope.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// `GET /subscriptions/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    pub os_profile: Option<OsProfile>,
    pub storage_profile: Option<StorageProfile>,
    pub instance_view: Option<InstanceView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    pub linux_configuration: Option<serde_json::Value>,
    pub windows_configuration: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub os_disk: Option<OsDisk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub os_type: Option<String>,
}

/// `GET .../virtualMachines/{name}/instanceView`
#[derive(Debug, Default, Deserialize)]
pub struct InstanceView {
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceViewStatus {
    pub code: Option<String>,
}

impl InstanceView {
    pub fn power_state(&self) -> PowerState {
        PowerState::from_status_codes(self.statuses.iter().filter_map(|s| s.code.as_deref()))
    }
}

impl VirtualMachine {
    /// Linux when the VM carries a Linux guest configuration. VMs created
    /// from a specialized disk have no OS profile; for those the OS disk type
    /// decides. Everything else is treated as Windows.
    pub fn os_family(&self) -> OsFamily {
        let props = &self.properties;
        match &props.os_profile {
            Some(profile) if profile.linux_configuration.is_some() => OsFamily::Linux,
            Some(_) => OsFamily::Windows,
            None => {
                let disk_type = props
                    .storage_profile
                    .as_ref()
                    .and_then(|s| s.os_disk.as_ref())
                    .and_then(|d| d.os_type.as_deref());
                match disk_type {
                    Some(t) if t.eq_ignore_ascii_case("linux") => OsFamily::Linux,
                    _ => OsFamily::Windows,
                }
            }
        }
    }

    pub fn into_reference(self) -> Result<VmReference> {
        let os_family = self.os_family();
        let resource_group = resource_group_from_id(&self.id)
            .ok_or_else(|| Error::Internal(format!("VM ID without resource group: {}", self.id)))?
            .to_string();
        let power_state = self
            .properties
            .instance_view
            .as_ref()
            .map(InstanceView::power_state)
            .unwrap_or_else(|| PowerState::Unknown(String::new()));

        Ok(VmReference {
            id: self.id,
            resource_group,
            name: self.name,
            os_family,
            power_state,
            location: self.location,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VirtualMachineExtension {
    pub name: String,
    #[serde(default)]
    pub properties: ExtensionProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionProperties {
    pub publisher: Option<String>,
    #[serde(rename = "type")]
    pub extension_type: Option<String>,
    pub type_handler_version: Option<String>,
    pub provisioning_state: Option<String>,
}

impl From<VirtualMachineExtension> for ExtensionRecord {
    fn from(ext: VirtualMachineExtension) -> Self {
        let state = ext
            .properties
            .provisioning_state
            .as_deref()
            .map(ExtensionState::from_api_state)
            .unwrap_or(ExtensionState::Succeeded);
        Self {
            name: ext.name,
            publisher: ext.properties.publisher,
            extension_type: ext.properties.extension_type,
            type_handler_version: ext.properties.type_handler_version,
            state,
        }
    }
}

/// `GET .../Microsoft.OperationalInsights/workspaces/{name}`
#[derive(Debug, Clone, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: WorkspaceProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceProperties {
    pub customer_id: Option<String>,
    pub provisioning_state: Option<String>,
}

/// Workspace identity as the resolver consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    pub customer_id: Option<String>,
}

impl From<Workspace> for WorkspaceInfo {
    fn from(ws: Workspace) -> Self {
        Self {
            id: ws.id,
            name: ws.name,
            customer_id: ws.properties.customer_id,
        }
    }
}

/// `POST .../workspaces/{name}/sharedKeys`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedKeys {
    pub primary_shared_key: Option<SecretString>,
}
