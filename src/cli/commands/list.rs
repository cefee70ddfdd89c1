//! List command
//!
//! Resolves the VM selection without touching any extension.

use super::{CommandContext, EXIT_OK, EXIT_PARTIAL};
use crate::cli::TargetArgs;
use clap::Parser;
use omsdeploy::error::Result;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (client, context) = ctx.connect(&self.target).await?;
        let selection = ctx.select(&client, &self.target).await?;

        ctx.output.section(&format!(
            "VMs in {} ({})",
            context.subscription_name.as_deref().unwrap_or("subscription"),
            context.subscription_id
        ));
        for vm in &selection.vms {
            ctx.output.vm_line(vm);
        }
        if !ctx.output.is_json() {
            println!("\n{} VM(s)", selection.vms.len());
        }

        Ok(if selection.has_issues() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        })
    }
}
