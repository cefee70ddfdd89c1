//! Fan-out of provisioning units.
//!
//! Each selected VM gets its own task. A semaphore caps how many tasks talk
//! to Azure at once (`forks`, 0 = no cap) and the dispatcher joins tasks as
//! they complete, forwarding each [`UnitReport`] to the caller immediately.
//! Units share nothing mutable, so one failing or panicking unit never
//! affects the others.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

use crate::azure::VmReference;
use crate::provisioner::{Provisioner, ProvisioningOutcome, UnitReport};

/// Default number of units allowed to run at once.
pub const DEFAULT_FORKS: usize = 16;

/// Per-outcome counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub installed: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub would_install: usize,
    pub failed: usize,
    /// Names or groups the selector could not resolve
    pub unresolved: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, report: &UnitReport) {
        self.total += 1;
        match report.outcome {
            ProvisioningOutcome::Installed => self.installed += 1,
            ProvisioningOutcome::AlreadyPresent => self.already_present += 1,
            ProvisioningOutcome::SkippedNotRunning => self.skipped += 1,
            ProvisioningOutcome::WouldInstall => self.would_install += 1,
            ProvisioningOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// True if any unit failed or any target could not be resolved.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.unresolved > 0
    }
}

/// Runs one [`Provisioner`] unit per VM with bounded concurrency.
pub struct Dispatcher {
    provisioner: Provisioner,
    forks: usize,
}

impl Dispatcher {
    pub fn new(provisioner: Provisioner, forks: usize) -> Self {
        Self { provisioner, forks }
    }

    pub fn forks(&self) -> usize {
        self.forks
    }

    /// Provision every VM, calling `on_report` as each unit finishes.
    ///
    /// Reports arrive in completion order. Returns once every unit has
    /// reported.
    pub async fn run<F>(&self, vms: Vec<VmReference>, mut on_report: F) -> RunSummary
    where
        F: FnMut(&UnitReport),
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        if vms.is_empty() {
            info!("No VMs to provision");
            return summary;
        }

        let permits = (self.forks > 0).then(|| Arc::new(Semaphore::new(self.forks)));
        info!(
            "Dispatching {} unit(s) (forks: {})",
            vms.len(),
            if self.forks == 0 { "unbounded".to_string() } else { self.forks.to_string() }
        );

        let mut units = JoinSet::new();
        for vm in vms {
            let provisioner = self.provisioner.clone();
            let permits = permits.clone();
            let span = info_span!("unit", vm = %vm, os = %vm.os_family);

            units.spawn(
                async move {
                    let _permit = match permits {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    debug!("Unit started");

                    let result = AssertUnwindSafe(provisioner.provision(&vm))
                        .catch_unwind()
                        .await;
                    match result {
                        Ok(report) => report,
                        Err(panic) => {
                            let reason = panic_message(panic.as_ref());
                            error!("Unit panicked: {}", reason);
                            UnitReport::failed(vm, format!("unit panicked: {}", reason))
                        }
                    }
                }
                .instrument(span),
            );
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(report) => {
                    summary.record(&report);
                    on_report(&report);
                }
                Err(e) => {
                    // Only reachable if the runtime cancels the task.
                    error!("Provisioning unit did not complete: {}", e);
                    summary.total += 1;
                    summary.failed += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            "All {} unit(s) finished in {:.1}s",
            summary.total,
            summary.elapsed.as_secs_f64()
        );
        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::{OsFamily, PowerState};

    fn report(outcome: ProvisioningOutcome) -> UnitReport {
        UnitReport {
            vm: VmReference {
                id: String::new(),
                resource_group: "rg".into(),
                name: "vm".into(),
                os_family: OsFamily::Linux,
                power_state: PowerState::Running,
                location: "eastus".into(),
            },
            extension: "OmsAgentForLinux",
            outcome,
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record(&report(ProvisioningOutcome::Installed));
        summary.record(&report(ProvisioningOutcome::AlreadyPresent));
        summary.record(&report(ProvisioningOutcome::SkippedNotRunning));
        assert_eq!(summary.total, 3);
        assert!(!summary.has_failures());

        summary.record(&report(ProvisioningOutcome::Failed("boom".into())));
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_unresolved_names_count_as_failures() {
        let summary = RunSummary {
            unresolved: 1,
            ..Default::default()
        };
        assert!(summary.has_failures());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("bad state");
        assert_eq!(panic_message(payload.as_ref()), "bad state");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
