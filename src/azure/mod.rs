//! Azure control plane access.
//!
//! The rollout talks to Azure through the [`AzureApi`] trait. [`ArmClient`]
//! implements it over the Resource Manager REST API; tests substitute fakes.
//!
//! ## Authentication
//!
//! A service principal [`Credential`] is exchanged for a Resource Manager
//! token by the [`Authenticator`], either with a certificate-signed client
//! assertion or a client secret. [`select_subscription`] then binds the
//! session to one subscription and produces the [`AuthenticatedContext`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use omsdeploy::azure::{ArmClient, Authenticator, CloudEnvironment, select_subscription};
//!
//! let env: CloudEnvironment = "AzureCloud".parse()?;
//! let auth = Authenticator::new(env.clone(), &credential)?;
//! let client = ArmClient::new(auth, subscription_id, RetryPolicy::default())?;
//! let context = select_subscription(&client, env, subscription_id).await?;
//! ```

pub mod auth;
pub mod client;
pub mod environment;
pub mod extension;
pub mod models;
pub mod vm;

pub use auth::{select_subscription, AuthenticatedContext, Authenticator, Credential};
pub use client::ArmClient;
pub use environment::CloudEnvironment;
pub use extension::{ExtensionRecord, ExtensionRequest, ExtensionSpec, ExtensionState};
pub use models::{SharedKeys, Subscription, WorkspaceInfo};
pub use vm::{OsFamily, PowerState, VmReference};

use async_trait::async_trait;

use crate::error::Result;

/// The slice of the Azure control plane the rollout consumes.
#[async_trait]
pub trait AzureApi: Send + Sync {
    /// Read the subscription the client is bound to.
    async fn get_subscription(&self) -> Result<Subscription>;

    /// Every VM in the subscription.
    async fn list_vms(&self) -> Result<Vec<VmReference>>;

    /// Every VM in one resource group.
    async fn list_vms_in_group(&self, resource_group: &str) -> Result<Vec<VmReference>>;

    /// One VM, including its instance view.
    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VmReference>;

    /// Current power state of a VM.
    async fn power_state(&self, resource_group: &str, name: &str) -> Result<PowerState>;

    /// A named extension on a VM, or `None` if it is not installed.
    async fn get_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionRecord>>;

    /// Create or update an extension on a VM.
    async fn set_extension(&self, request: &ExtensionRequest) -> Result<ExtensionRecord>;

    /// Read a Log Analytics workspace.
    async fn get_workspace(&self, resource_group: &str, name: &str) -> Result<WorkspaceInfo>;

    /// Read a Log Analytics workspace's shared keys.
    async fn get_shared_keys(&self, resource_group: &str, name: &str) -> Result<SharedKeys>;
}
