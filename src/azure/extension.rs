//! The monitoring agent extension and its per-OS variants.

use serde::Serialize;
use std::sync::Arc;

use super::vm::{OsFamily, VmReference};
use crate::workspace::WorkspaceSettings;

/// Publisher shared by both agent variants.
pub const MONITORING_PUBLISHER: &str = "Microsoft.EnterpriseCloud.Monitoring";

/// Which extension to install for a guest OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtensionSpec {
    /// Extension resource name on the VM
    pub name: &'static str,
    /// Extension publisher
    pub publisher: &'static str,
    /// Extension type
    pub extension_type: &'static str,
    /// Handler version
    pub type_handler_version: &'static str,
}

impl ExtensionSpec {
    /// Microsoft Monitoring Agent for Windows guests.
    pub const WINDOWS: Self = Self {
        name: "Microsoft.EnterpriseCloud.Monitoring",
        publisher: MONITORING_PUBLISHER,
        extension_type: "MicrosoftMonitoringAgent",
        type_handler_version: "1.0",
    };

    /// OMS agent for Linux guests.
    pub const LINUX: Self = Self {
        name: "OmsAgentForLinux",
        publisher: MONITORING_PUBLISHER,
        extension_type: "OmsAgentForLinux",
        type_handler_version: "1.0",
    };

    /// The variant matching a guest OS family.
    pub fn for_os(os: OsFamily) -> Self {
        match os {
            OsFamily::Windows => Self::WINDOWS,
            OsFamily::Linux => Self::LINUX,
        }
    }
}

/// Provisioning state of an extension resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionState {
    Creating,
    Updating,
    Succeeded,
    Failed,
    Other(String),
}

impl ExtensionState {
    pub fn from_api_state(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "creating" => Self::Creating,
            "updating" => Self::Updating,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Succeeded and Failed are final; everything else is still moving.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// An extension found on a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub name: String,
    pub publisher: Option<String>,
    pub extension_type: Option<String>,
    pub type_handler_version: Option<String>,
    pub state: ExtensionState,
}

/// Everything needed to PUT the extension onto one VM.
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    pub resource_group: String,
    pub vm_name: String,
    pub location: String,
    pub spec: ExtensionSpec,
    pub workspace: Arc<WorkspaceSettings>,
}

impl ExtensionRequest {
    /// Request for the variant matching the VM's guest OS, at the VM's location.
    pub fn for_vm(vm: &VmReference, workspace: Arc<WorkspaceSettings>) -> Self {
        Self {
            resource_group: vm.resource_group.clone(),
            vm_name: vm.name.clone(),
            location: vm.location.clone(),
            spec: ExtensionSpec::for_os(vm.os_family),
            workspace,
        }
    }

    /// ARM request body. Contains the workspace key; never log it.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "location": self.location,
            "properties": {
                "publisher": self.spec.publisher,
                "type": self.spec.extension_type,
                "typeHandlerVersion": self.spec.type_handler_version,
                "autoUpgradeMinorVersion": true,
                "settings": self.workspace.public_settings(),
                "protectedSettings": self.workspace.protected_settings(),
            }
        })
    }
}
