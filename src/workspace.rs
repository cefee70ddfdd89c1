//! Log Analytics workspace resolution.
//!
//! The workspace customer ID and primary shared key are fetched exactly once
//! per run and handed, read-only, to every provisioning unit. Failing to read
//! either is fatal: no VM can be onboarded without them.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::azure::AzureApi;
use crate::error::{Error, Result};
use crate::secret::SecretString;

/// Settings payload shared by every extension install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    /// Workspace customer ID (public)
    pub workspace_id: String,
    /// Primary shared key (protected)
    pub workspace_key: SecretString,
}

impl WorkspaceSettings {
    pub fn new(workspace_id: impl Into<String>, workspace_key: SecretString) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            workspace_key,
        }
    }

    /// The extension's public `settings` object.
    pub fn public_settings(&self) -> Value {
        json!({ "workspaceId": self.workspace_id })
    }

    /// The extension's `protectedSettings` object.
    pub fn protected_settings(&self) -> Value {
        json!({ "workspaceKey": self.workspace_key.expose() })
    }
}

/// Fetch the workspace identity and shared key.
pub async fn resolve<A>(api: &A, workspace: &str, resource_group: &str) -> Result<WorkspaceSettings>
where
    A: AzureApi + ?Sized,
{
    let lookup_failed = |message: String| Error::WorkspaceLookup {
        workspace: workspace.to_string(),
        resource_group: resource_group.to_string(),
        message,
    };

    let info = api
        .get_workspace(resource_group, workspace)
        .await
        .map_err(|e| lookup_failed(e.to_string()))?;

    let workspace_id = info
        .customer_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| lookup_failed("workspace has no customer ID".to_string()))?;
    debug!("Workspace '{}' has customer ID {}", workspace, workspace_id);

    let keys = api
        .get_shared_keys(resource_group, workspace)
        .await
        .map_err(|e| Error::SharedKeys {
            workspace: workspace.to_string(),
            message: e.to_string(),
        })?;

    let workspace_key = keys
        .primary_shared_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::SharedKeys {
            workspace: workspace.to_string(),
            message: "primary shared key is empty".to_string(),
        })?;

    info!("Resolved workspace '{}' ({})", workspace, workspace_id);
    Ok(WorkspaceSettings::new(workspace_id, workspace_key))
}
