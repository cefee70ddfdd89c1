//! Subcommands module for the omsdeploy CLI
//!
//! This module contains all the subcommand implementations.

pub mod deploy;
pub mod list;

use crate::cli::output::OutputFormatter;
use crate::cli::{Cli, TargetArgs};
use omsdeploy::azure::{select_subscription, ArmClient, AuthenticatedContext, Authenticator};
use omsdeploy::config::Config;
use omsdeploy::error::Result;
use omsdeploy::selector::{self, Selection, TargetSelector};
use tracing::debug;

/// Every unit succeeded, was already done, or was skipped.
pub const EXIT_OK: i32 = 0;

/// Some unit failed or some name could not be resolved.
pub const EXIT_PARTIAL: i32 = 2;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
    /// Number of concurrent provisioning units
    pub forks: usize,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, config: Config) -> Self {
        let use_color = !cli.no_color && config.logging.color;
        let output = OutputFormatter::new(use_color, cli.is_json(), cli.verbosity());
        let forks = cli.forks.unwrap_or(config.defaults.forks);

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
            forks,
        }
    }

    /// Sign in and bind to the requested subscription.
    pub async fn connect(&self, target: &TargetArgs) -> Result<(ArmClient, AuthenticatedContext)> {
        let environment = self.config.environment(&target.environment)?;
        let credential_name = target
            .credential
            .as_deref()
            .unwrap_or(&self.config.defaults.credential);
        let credential = self.config.credential(credential_name)?;

        self.output.info(&format!(
            "Signing in to {} with credential '{}'",
            environment, credential.name
        ));
        let auth = Authenticator::new(environment.clone(), &credential)?;
        let client = ArmClient::new(auth, &target.subscription_id, self.config.retry_policy())?;
        let context = select_subscription(&client, environment, &target.subscription_id).await?;

        debug!(
            "Connected to subscription {} ({})",
            context.subscription_id,
            context.subscription_name.as_deref().unwrap_or("unnamed")
        );
        Ok((client, context))
    }

    /// Resolve the VM selection and report anything that did not resolve.
    pub async fn select(&self, client: &ArmClient, target: &TargetArgs) -> Result<Selection> {
        let selector =
            TargetSelector::from_lists(target.resource_groups.clone(), target.vm_names.clone());
        self.output.info(&format!("Selecting {}", selector.describe()));

        let selection = selector::resolve(client, &selector).await?;
        for issue in &selection.issues {
            self.output.issue(&issue.to_string());
        }
        Ok(selection)
    }
}
