//! Virtual machine references as seen by the rollout.
//!
//! A [`VmReference`] is what the selector produces and what each provisioning
//! unit consumes: where the VM lives, which guest OS it runs, and the power
//! state observed when it was fetched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Guest operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    /// Windows guest
    Windows,
    /// Linux guest
    Linux,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => f.write_str("Windows"),
            Self::Linux => f.write_str("Linux"),
        }
    }
}

/// Azure VM power state as reported by the instance view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
    Unknown(String),
}

impl PowerState {
    /// Parse the suffix of a `PowerState/<state>` status code.
    pub fn from_api_state(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "deallocating" => Self::Deallocating,
            "deallocated" => Self::Deallocated,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Pick the power state out of instance view status codes.
    ///
    /// Returns `Unknown("")` when no `PowerState/` code is present, which is
    /// what list calls without an instance view produce.
    pub fn from_status_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        codes
            .into_iter()
            .find_map(|code| code.strip_prefix("PowerState/"))
            .map(Self::from_api_state)
            .unwrap_or_else(|| Self::Unknown(String::new()))
    }

    /// Returns true only for a VM that is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Deallocating => f.write_str("deallocating"),
            Self::Deallocated => f.write_str("deallocated"),
            Self::Unknown(s) if s.is_empty() => f.write_str("unknown"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// A VM resolved from the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmReference {
    /// Full ARM resource ID
    pub id: String,
    /// Resource group name
    pub resource_group: String,
    /// VM name
    pub name: String,
    /// Guest OS family
    pub os_family: OsFamily,
    /// Power state at fetch time
    pub power_state: PowerState,
    /// Azure region
    pub location: String,
}

impl VmReference {
    /// Case-insensitive identity used for de-duplication.
    pub fn key(&self) -> (String, String) {
        (self.resource_group.to_lowercase(), self.name.to_lowercase())
    }
}

impl fmt::Display for VmReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

/// Extract the resource group segment from an ARM resource ID.
pub fn resource_group_from_id(id: &str) -> Option<&str> {
    let mut segments = id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next();
        }
    }
    None
}
