//! Error types for omsdeploy.
//!
//! Errors fall into two classes. Fatal errors (authentication, subscription
//! selection, workspace lookup, credential and configuration problems) abort
//! the whole run. Per-target errors (a VM name that resolves to nothing or to
//! several VMs, a failed extension install) are reported and the run moves on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for omsdeploy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for omsdeploy.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Fatal Errors
    // ========================================================================
    /// Token acquisition for the service principal failed.
    #[error("Authentication failed for application '{application_id}' in tenant '{tenant_id}': {message}")]
    Authentication {
        /// Tenant the principal belongs to
        tenant_id: String,
        /// Application (client) ID
        application_id: String,
        /// Error message
        message: String,
    },

    /// The subscription could not be selected.
    #[error("Failed to select subscription '{subscription_id}': {message}")]
    SubscriptionSelection {
        /// Subscription ID
        subscription_id: String,
        /// Error message
        message: String,
    },

    /// The Log Analytics workspace could not be read.
    #[error("Failed to look up workspace '{workspace}' in resource group '{resource_group}': {message}")]
    WorkspaceLookup {
        /// Workspace name
        workspace: String,
        /// Workspace resource group
        resource_group: String,
        /// Error message
        message: String,
    },

    /// The workspace shared keys could not be retrieved.
    #[error("Failed to retrieve shared keys for workspace '{workspace}': {message}")]
    SharedKeys {
        /// Workspace name
        workspace: String,
        /// Error message
        message: String,
    },

    /// A named credential is missing or its key material is unusable.
    #[error("Credential '{name}': {message}")]
    Credential {
        /// Credential name
        name: String,
        /// Error message
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParse {
        /// Path to the config file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Per-target Errors
    // ========================================================================
    /// No VM carries the requested name.
    #[error("Could not find VM '{0}' in the subscription")]
    VmNotFound(String),

    /// More than one VM carries the requested name.
    #[error("VM name '{name}' is ambiguous: found in resource groups {}", resource_groups.join(", "))]
    AmbiguousVmName {
        /// Requested VM name
        name: String,
        /// Resource groups that contain a VM with this name
        resource_groups: Vec<String>,
    },

    /// Installing the extension on a VM failed.
    #[error("Extension install on '{vm}' failed: {message}")]
    ExtensionInstall {
        /// VM in `resource_group/name` form
        vm: String,
        /// Error message
        message: String,
    },

    /// Waiting for the extension to settle exceeded the timeout.
    #[error("Extension on '{vm}' did not finish provisioning within {timeout_secs} seconds")]
    ExtensionTimeout {
        /// VM in `resource_group/name` form
        vm: String,
        /// Timeout in seconds
        timeout_secs: u64,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Azure Resource Manager returned a non-success status.
    #[error("Azure API returned {status}{}: {message}", code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        /// HTTP status code
        status: u16,
        /// ARM error code, when the body carried one
        code: Option<String>,
        /// Error message
        message: String,
        /// Server supplied `Retry-After`
        retry_after: Option<Duration>,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Serialization and IO Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a new credential error.
    pub fn credential(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Credential {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new extension install error.
    pub fn extension_install(vm: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtensionInstall {
            vm: vm.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Authentication { .. }
                | Error::SubscriptionSelection { .. }
                | Error::WorkspaceLookup { .. }
                | Error::SharedKeys { .. }
                | Error::Credential { .. }
                | Error::Config(_)
                | Error::ConfigParse { .. }
        )
    }

    /// Returns true if the provider asked us to slow down.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Error::Api { status: 429 | 503, .. })
    }

    /// Returns true if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// The delay the server asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            2
        }
    }
}
