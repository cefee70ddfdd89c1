//! # omsdeploy - Monitoring agent rollout for Azure VMs
//!
//! omsdeploy onboards Azure virtual machines to a Log Analytics workspace by
//! installing the monitoring agent VM extension across a subscription, a set
//! of resource groups, or a list of named VMs.
//!
//! ## Core Concepts
//!
//! - **Credential**: a service principal, stored by name in configuration
//! - **Workspace**: the Log Analytics destination, identified by its customer
//!   ID and authenticated with its primary shared key
//! - **Selector**: which VMs the run targets
//! - **Unit**: provisioning one VM; units run concurrently and independently
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CLI (clap)                            │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │  Authenticator   │  │   VM selector    │  │    Workspace     │
//! │ (token + subs)   │  │ (all/rg/names)   │  │ (id + key, once) │
//! └──────────────────┘  └──────────────────┘  └──────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │          Dispatcher (bounded fan-out, join as done)          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │      Provisioner (power state, OS branch, get/set ext)       │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │         Azure Resource Manager (reqwest + retries)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use omsdeploy::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Config::load(None)?;
//! let environment = config.environment("AzureCloud")?;
//! let credential = config.credential("AzureRunAsConnection")?;
//!
//! let auth = Authenticator::new(environment.clone(), &credential)?;
//! let client = ArmClient::new(auth, subscription_id, config.retry_policy())?;
//! select_subscription(&client, environment, subscription_id).await?;
//!
//! let workspace = workspace::resolve(&client, "la-prod", "rg-ops").await?;
//! let selection = selector::resolve(&client, &TargetSelector::AllVms).await?;
//!
//! let api: Arc<dyn AzureApi> = Arc::new(client);
//! let provisioner = Provisioner::new(api, Arc::new(workspace), config.provisioner_options());
//! let summary = Dispatcher::new(provisioner, 16)
//!     .run(selection.vms, |report| println!("{}: {}", report.vm, report.outcome))
//!     .await;
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::azure::{
        select_subscription, ArmClient, AuthenticatedContext, Authenticator, AzureApi,
        CloudEnvironment, Credential, ExtensionSpec, OsFamily, PowerState, VmReference,
    };
    pub use crate::config::Config;
    pub use crate::dispatcher::{Dispatcher, RunSummary};
    pub use crate::error::{Error, Result};
    pub use crate::provisioner::{Provisioner, ProvisionerOptions, ProvisioningOutcome, UnitReport};
    pub use crate::selector::{Selection, TargetSelector};
    pub use crate::workspace::WorkspaceSettings;
    pub use crate::{selector, workspace};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Configuration loading and merging.
pub mod config;

/// Retry with backoff for throttled and transient provider errors.
pub mod retry;

/// Redacting wrapper for secret strings.
pub mod secret;

// ============================================================================
// Azure
// ============================================================================

/// Authentication, the Resource Manager client, and the resource models.
pub mod azure;

// ============================================================================
// Rollout
// ============================================================================

/// Target VM selection.
pub mod selector;

/// Workspace ID and key resolution.
pub mod workspace;

/// Per-VM extension provisioning.
pub mod provisioner;

/// Bounded concurrent fan-out of provisioning units.
pub mod dispatcher;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
