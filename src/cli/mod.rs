//! CLI module for omsdeploy
//!
//! Argument parsing and subcommand dispatch for the `omsdeploy` binary.

pub mod commands;
pub mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// omsdeploy - Onboard Azure VMs to a Log Analytics workspace
///
/// Installs the monitoring agent VM extension on every selected VM.
#[derive(Parser, Debug, Clone)]
#[command(name = "omsdeploy")]
#[command(version)]
#[command(about = "Roll out the Log Analytics monitoring agent to Azure VMs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "OMSDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Maximum concurrent provisioning units (0 = unbounded)
    #[arg(short = 'f', long, global = true)]
    pub forks: Option<usize>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// One JSON object per line
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Install the monitoring agent on the selected VMs
    Deploy(commands::deploy::DeployArgs),

    /// List the VMs a deploy with the same selection would target
    List(commands::list::ListArgs),
}

/// Where to look for VMs and how to sign in
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Subscription containing the VMs and the workspace
    #[arg(long = "subscription-id", short = 's')]
    pub subscription_id: String,

    /// Azure cloud (AzureCloud, AzureChinaCloud, AzureUSGovernment, AzureGermanCloud)
    #[arg(long, short = 'E')]
    pub environment: String,

    /// Only VMs in these resource groups
    #[arg(long = "resource-group", short = 'g', value_delimiter = ',', action = clap::ArgAction::Append)]
    pub resource_groups: Vec<String>,

    /// Only VMs with these names; takes precedence over --resource-group
    #[arg(long = "vm-name", short = 'n', value_delimiter = ',', action = clap::ArgAction::Append)]
    pub vm_names: Vec<String>,

    /// Name of the stored service principal credential
    #[arg(long)]
    pub credential: Option<String>,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 5] = [
        "omsdeploy",
        "--subscription-id",
        "00000000-0000-0000-0000-000000000000",
        "--environment",
        "AzureCloud",
    ];

    fn deploy(extra: &[&str]) -> Cli {
        let mut args = vec!["omsdeploy", "deploy"];
        args.extend_from_slice(&BASE[1..]);
        args.extend_from_slice(&[
            "--workspace-name",
            "la-prod",
            "--workspace-resource-group",
            "rg-ops",
        ]);
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_deploy_parsing() {
        let cli = deploy(&[]);
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.workspace_name, "la-prod");
                assert!(args.target.resource_groups.is_empty());
                assert!(!args.check);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_resource_groups_are_comma_separated_and_repeatable() {
        let cli = deploy(&["-g", "rg1,rg2", "--resource-group", "rg3"]);
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.target.resource_groups, vec!["rg1", "rg2", "rg3"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut args = vec!["omsdeploy", "deploy"];
        args.extend_from_slice(&BASE[1..]);
        args.extend_from_slice(&[
            "--workspace-name",
            "la-prod",
            "--workspace-resource-group",
            "rg-ops",
            "--timeout",
            "0",
        ]);
        let err = Cli::try_parse_from(args).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        match deploy(&["--timeout", "90"]).command {
            Commands::Deploy(args) => assert_eq!(args.timeout, Some(90)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbosity() {
        let cli = deploy(&["-vvvv"]);
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_workspace_is_required_for_deploy() {
        let mut args = vec!["omsdeploy", "deploy"];
        args.extend_from_slice(&BASE[1..]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_list_needs_no_workspace() {
        let mut args = vec!["omsdeploy", "list"];
        args.extend_from_slice(&BASE[1..]);
        args.extend_from_slice(&["--vm-name", "web01", "--output", "json"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.is_json());
        assert!(matches!(cli.command, Commands::List(_)));
    }
}
