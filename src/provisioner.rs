//! Per-VM extension provisioning.
//!
//! One [`Provisioner::provision`] call is one unit of work: check the VM's
//! power state, pick the agent variant for its guest OS, and install the
//! extension unless it is already there. Every failure is folded into the
//! returned [`UnitReport`]; a unit never aborts the run.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::azure::{AzureApi, ExtensionRequest, ExtensionSpec, ExtensionState, PowerState, VmReference};
use crate::error::{Error, Result};
use crate::workspace::WorkspaceSettings;

/// Default time to wait for an install to reach a terminal state.
pub const DEFAULT_EXTENSION_TIMEOUT: Duration = Duration::from_secs(900);

/// Default interval between provisioning state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Knobs for a provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    /// Skip VMs that are not running instead of installing anyway
    pub skip_not_running: bool,
    /// Report what would be installed without changing anything
    pub check_mode: bool,
    /// Poll the extension until it reaches a terminal state
    pub wait: bool,
    /// Upper bound on the wait; zero means do not wait
    pub timeout: Duration,
    /// Delay between polls
    pub poll_interval: Duration,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            skip_not_running: true,
            check_mode: false,
            wait: true,
            timeout: DEFAULT_EXTENSION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What happened to one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    /// The extension was installed by this run
    Installed,
    /// The extension was already on the VM
    AlreadyPresent,
    /// The VM was not running and was left alone
    SkippedNotRunning,
    /// Check mode: the extension would have been installed
    WouldInstall,
    /// Something went wrong
    Failed(String),
}

impl ProvisioningOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::AlreadyPresent => "present",
            Self::SkippedNotRunning => "skipped",
            Self::WouldInstall => "would install",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ProvisioningOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of one provisioning unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// The VM this unit worked on
    pub vm: VmReference,
    /// Extension resource name that was targeted
    pub extension: &'static str,
    /// Final outcome
    pub outcome: ProvisioningOutcome,
    /// Non-fatal observations, such as installing onto a stopped VM
    pub warnings: Vec<String>,
    /// Wall time spent on the unit
    pub elapsed: Duration,
}

impl UnitReport {
    pub fn failed(vm: VmReference, reason: impl Into<String>) -> Self {
        Self {
            extension: ExtensionSpec::for_os(vm.os_family).name,
            vm,
            outcome: ProvisioningOutcome::Failed(reason.into()),
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Installs the monitoring agent on VMs.
///
/// Clones share the API handle and the workspace settings; nothing in here
/// is mutated once constructed.
#[derive(Clone)]
pub struct Provisioner {
    api: Arc<dyn AzureApi>,
    workspace: Arc<WorkspaceSettings>,
    options: ProvisionerOptions,
}

impl Provisioner {
    pub fn new(
        api: Arc<dyn AzureApi>,
        workspace: Arc<WorkspaceSettings>,
        options: ProvisionerOptions,
    ) -> Self {
        Self {
            api,
            workspace,
            options,
        }
    }

    /// Run one unit of work against `vm`.
    pub async fn provision(&self, vm: &VmReference) -> UnitReport {
        let started = Instant::now();
        let request = ExtensionRequest::for_vm(vm, Arc::clone(&self.workspace));
        let mut warnings = Vec::new();

        let outcome = match self.provision_inner(vm, &request, &mut warnings).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Provisioning {} failed: {}", vm, e);
                ProvisioningOutcome::Failed(e.to_string())
            }
        };

        UnitReport {
            vm: vm.clone(),
            extension: request.spec.name,
            outcome,
            warnings,
            elapsed: started.elapsed(),
        }
    }

    async fn provision_inner(
        &self,
        vm: &VmReference,
        request: &ExtensionRequest,
        warnings: &mut Vec<String>,
    ) -> Result<ProvisioningOutcome> {
        let power = self.api.power_state(&vm.resource_group, &vm.name).await?;
        if !power.is_running() {
            if self.options.skip_not_running {
                warn!("{} is {}; skipping", vm, power);
                return Ok(ProvisioningOutcome::SkippedNotRunning);
            }
            warn!("{} is {}; installing anyway", vm, power);
            warnings.push(not_running_warning(&power));
        }

        let spec = request.spec;
        debug!("{} runs {}; target extension {}", vm, vm.os_family, spec.name);

        if let Some(existing) = self
            .api
            .get_extension(&vm.resource_group, &vm.name, spec.name)
            .await?
        {
            if existing.state == ExtensionState::Failed {
                warnings.push(format!("existing {} extension is in Failed state", spec.name));
            }
            info!("{} already has {}", vm, spec.name);
            return Ok(ProvisioningOutcome::AlreadyPresent);
        }

        if self.options.check_mode {
            info!("{} would get {}", vm, spec.name);
            return Ok(ProvisioningOutcome::WouldInstall);
        }

        info!("Installing {} on {}", spec.name, vm);
        let record = self
            .api
            .set_extension(request)
            .await
            .map_err(|e| Error::extension_install(vm.to_string(), e.to_string()))?;

        let waits = self.options.wait && !self.options.timeout.is_zero();
        let state = if !waits || record.state.is_terminal() {
            record.state
        } else {
            self.wait_for_extension(vm, spec).await?
        };

        match state {
            ExtensionState::Failed => Err(Error::extension_install(
                vm.to_string(),
                "extension provisioning state is Failed",
            )),
            _ => {
                info!("Installed {} on {}", spec.name, vm);
                Ok(ProvisioningOutcome::Installed)
            }
        }
    }

    /// Poll the extension until it reaches a terminal provisioning state.
    async fn wait_for_extension(
        &self,
        vm: &VmReference,
        spec: ExtensionSpec,
    ) -> Result<ExtensionState> {
        let start = Instant::now();
        debug!(
            "Waiting for {} on {} (timeout: {:?})",
            spec.name, vm, self.options.timeout
        );

        loop {
            if start.elapsed() >= self.options.timeout {
                return Err(Error::ExtensionTimeout {
                    vm: vm.to_string(),
                    timeout_secs: self.options.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.options.poll_interval).await;

            let current = self
                .api
                .get_extension(&vm.resource_group, &vm.name, spec.name)
                .await?;
            match current {
                Some(record) if record.state.is_terminal() => return Ok(record.state),
                Some(record) => debug!("{} on {} is {:?}", spec.name, vm, record.state),
                None => debug!("{} on {} not visible yet", spec.name, vm),
            }
        }
    }
}

fn not_running_warning(power: &PowerState) -> String {
    format!("VM was {} when the extension was installed", power)
}
