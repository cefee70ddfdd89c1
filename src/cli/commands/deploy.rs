//! Deploy command
//!
//! Signs in, resolves the workspace and the VM selection, and installs the
//! monitoring agent on every selected VM.

use super::{CommandContext, EXIT_OK, EXIT_PARTIAL};
use crate::cli::TargetArgs;
use clap::Parser;
use omsdeploy::azure::AzureApi;
use omsdeploy::dispatcher::Dispatcher;
use omsdeploy::error::Result;
use omsdeploy::provisioner::Provisioner;
use omsdeploy::workspace;
use std::sync::Arc;
use std::time::Duration;

/// Arguments for the deploy command
#[derive(Parser, Debug, Clone)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Log Analytics workspace the agents report to
    #[arg(long = "workspace-name", short = 'w')]
    pub workspace_name: String,

    /// Resource group of the workspace
    #[arg(long = "workspace-resource-group")]
    pub workspace_resource_group: String,

    /// Report what would be installed without changing anything
    #[arg(long)]
    pub check: bool,

    /// Install on VMs that are not running instead of skipping them
    #[arg(long)]
    pub include_stopped: bool,

    /// Return as soon as each install request is accepted
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds to wait for each install to finish
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl DeployArgs {
    /// Execute the deploy command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.banner("OMSDEPLOY");

        let (client, context) = ctx.connect(&self.target).await?;
        ctx.output.info(&format!(
            "Subscription {} in {}",
            context.subscription_id, context.environment
        ));

        let settings =
            workspace::resolve(&client, &self.workspace_name, &self.workspace_resource_group)
                .await?;
        ctx.output.info(&format!(
            "Workspace '{}' has ID {}",
            self.workspace_name, settings.workspace_id
        ));

        let selection = ctx.select(&client, &self.target).await?;

        let mut options = ctx.config.provisioner_options();
        options.check_mode = self.check;
        options.wait = !self.no_wait;
        if self.include_stopped {
            options.skip_not_running = false;
        }
        if let Some(secs) = self.timeout {
            options.timeout = Duration::from_secs(secs);
        }

        let api: Arc<dyn AzureApi> = Arc::new(client);
        let provisioner = Provisioner::new(api, Arc::new(settings), options);
        let dispatcher = Dispatcher::new(provisioner, ctx.forks);

        if self.check {
            ctx.output.section("CHECK MODE: no extension will be installed");
        }
        let parallelism = match dispatcher.forks() {
            0 => "unbounded".to_string(),
            forks => format!("forks={}", forks),
        };
        ctx.output.section(&format!(
            "PROVISIONING [{} VM(s), {}]",
            selection.vms.len(),
            parallelism
        ));

        let output = &ctx.output;
        let mut summary = dispatcher
            .run(selection.vms, |report| output.unit_result(report))
            .await;
        summary.unresolved = selection.issues.len();

        ctx.output.recap(&summary);

        Ok(if summary.has_failures() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        })
    }
}
