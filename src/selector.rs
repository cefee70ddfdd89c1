//! VM selection.
//!
//! Resolves the rollout's target set from one of three mutually exclusive
//! modes: every VM in the subscription, every VM in a list of resource
//! groups, or an explicit list of VM names.
//!
//! Per-name and per-group problems are recorded as issues and logged; they
//! never stop the remaining names or groups from being resolved. Only a
//! failure to list the subscription itself is returned as an error.

use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::azure::{AzureApi, VmReference};
use crate::error::{Error, Result};

/// How the target VMs are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Every VM in the subscription
    AllVms,
    /// Every VM in the named resource groups, in the given order
    ResourceGroups(Vec<String>),
    /// VMs looked up by name across the subscription
    VmNames(Vec<String>),
}

impl TargetSelector {
    /// Pick the mode from the optional lists.
    ///
    /// VM names win over resource groups; with neither, every VM is targeted.
    /// Blank entries are dropped and repeated entries collapsed.
    pub fn from_lists(resource_groups: Vec<String>, vm_names: Vec<String>) -> Self {
        let vm_names = normalize(vm_names);
        if !vm_names.is_empty() {
            return Self::VmNames(vm_names);
        }
        let resource_groups = normalize(resource_groups);
        if !resource_groups.is_empty() {
            return Self::ResourceGroups(resource_groups);
        }
        Self::AllVms
    }

    /// Short description for log lines and banners.
    pub fn describe(&self) -> String {
        match self {
            Self::AllVms => "all VMs in the subscription".to_string(),
            Self::ResourceGroups(groups) => format!("resource groups: {}", groups.join(", ")),
            Self::VmNames(names) => format!("VM names: {}", names.join(", ")),
        }
    }
}

fn normalize(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .collect()
}

/// Result of resolving a [`TargetSelector`].
#[derive(Debug, Default)]
pub struct Selection {
    /// VMs to provision, de-duplicated
    pub vms: Vec<VmReference>,
    /// Names or groups that could not be resolved
    pub issues: Vec<Error>,
}

impl Selection {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Resolve a selector against the subscription.
pub async fn resolve<A>(api: &A, selector: &TargetSelector) -> Result<Selection>
where
    A: AzureApi + ?Sized,
{
    let mut selection = Selection::default();

    match selector {
        TargetSelector::AllVms => {
            selection.vms = api.list_vms().await?;
        }
        TargetSelector::ResourceGroups(groups) => {
            for group in groups {
                match api.list_vms_in_group(group).await {
                    Ok(vms) => {
                        debug!("Resource group '{}' contributed {} VM(s)", group, vms.len());
                        selection.vms.extend(vms);
                    }
                    Err(e) => {
                        error!("Could not list VMs in resource group '{}': {}", group, e);
                        selection.issues.push(e);
                    }
                }
            }
        }
        TargetSelector::VmNames(names) => {
            let listed = api.list_vms().await?;
            for name in names {
                match resolve_name(api, &listed, name).await {
                    Ok(vm) => selection.vms.push(vm),
                    Err(e) => {
                        error!("{}", e);
                        selection.issues.push(e);
                    }
                }
            }
        }
    }

    selection.vms = dedupe(selection.vms);
    info!(
        "Selected {} VM(s) from {}",
        selection.vms.len(),
        selector.describe()
    );
    Ok(selection)
}

async fn resolve_name<A>(api: &A, listed: &[VmReference], name: &str) -> Result<VmReference>
where
    A: AzureApi + ?Sized,
{
    let matches: Vec<&VmReference> = listed
        .iter()
        .filter(|vm| vm.name.eq_ignore_ascii_case(name))
        .collect();
    debug!("VM name '{}' matched {} resource(s)", name, matches.len());
    match matches.as_slice() {
        [] => Err(Error::VmNotFound(name.to_string())),
        [single] => api.get_vm(&single.resource_group, &single.name).await,
        many => Err(Error::AmbiguousVmName {
            name: name.to_string(),
            resource_groups: many.iter().map(|vm| vm.resource_group.clone()).collect(),
        }),
    }
}

/// Drop repeated VMs, keyed by resource group and name; first one wins.
pub fn dedupe(vms: Vec<VmReference>) -> Vec<VmReference> {
    let mut seen = HashSet::new();
    vms.into_iter()
        .filter(|vm| {
            let fresh = seen.insert(vm.key());
            if !fresh {
                debug!("Skipping duplicate selection of {}", vm);
            }
            fresh
        })
        .collect()
}
