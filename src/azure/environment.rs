//! Azure cloud environments and their endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A sovereign or public Azure cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudEnvironment {
    /// Global Azure
    AzureCloud,
    /// Azure operated by 21Vianet
    AzureChinaCloud,
    /// Azure Government
    AzureUSGovernment,
    /// Azure Germany
    AzureGermanCloud,
    /// Explicit endpoints (Azure Stack, test servers)
    Custom {
        /// Entra ID authority host, e.g. `https://login.microsoftonline.com`
        authority_host: String,
        /// Resource Manager endpoint, e.g. `https://management.azure.com`
        resource_manager: String,
    },
}

impl CloudEnvironment {
    /// The Entra ID authority host, without a trailing slash.
    pub fn authority_host(&self) -> &str {
        match self {
            Self::AzureCloud => "https://login.microsoftonline.com",
            Self::AzureChinaCloud => "https://login.chinacloudapi.cn",
            Self::AzureUSGovernment => "https://login.microsoftonline.us",
            Self::AzureGermanCloud => "https://login.microsoftonline.de",
            Self::Custom { authority_host, .. } => authority_host.trim_end_matches('/'),
        }
    }

    /// The Resource Manager endpoint, without a trailing slash.
    pub fn resource_manager(&self) -> &str {
        match self {
            Self::AzureCloud => "https://management.azure.com",
            Self::AzureChinaCloud => "https://management.chinacloudapi.cn",
            Self::AzureUSGovernment => "https://management.usgovcloudapi.net",
            Self::AzureGermanCloud => "https://management.microsoftazure.de",
            Self::Custom {
                resource_manager, ..
            } => resource_manager.trim_end_matches('/'),
        }
    }

    /// OAuth scope for Resource Manager tokens.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.resource_manager())
    }

    /// Replace either endpoint, turning this into a custom environment.
    pub fn with_overrides(
        self,
        authority_host: Option<&str>,
        resource_manager: Option<&str>,
    ) -> Self {
        if authority_host.is_none() && resource_manager.is_none() {
            return self;
        }
        Self::Custom {
            authority_host: authority_host
                .map(String::from)
                .unwrap_or_else(|| self.authority_host().to_string()),
            resource_manager: resource_manager
                .map(String::from)
                .unwrap_or_else(|| self.resource_manager().to_string()),
        }
    }
}

impl FromStr for CloudEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azurecloud" | "azurepubliccloud" | "public" => Ok(Self::AzureCloud),
            "azurechinacloud" | "china" => Ok(Self::AzureChinaCloud),
            "azureusgovernment" | "azureusgovernmentcloud" | "usgovernment" => {
                Ok(Self::AzureUSGovernment)
            }
            "azuregermancloud" | "germany" => Ok(Self::AzureGermanCloud),
            _ => Err(Error::Config(format!(
                "Unknown cloud environment '{}'. Valid environments: AzureCloud, AzureChinaCloud, AzureUSGovernment, AzureGermanCloud",
                s
            ))),
        }
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AzureCloud => f.write_str("AzureCloud"),
            Self::AzureChinaCloud => f.write_str("AzureChinaCloud"),
            Self::AzureUSGovernment => f.write_str("AzureUSGovernment"),
            Self::AzureGermanCloud => f.write_str("AzureGermanCloud"),
            Self::Custom {
                resource_manager, ..
            } => write!(f, "Custom({})", resource_manager),
        }
    }
}
