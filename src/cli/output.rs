//! Output formatting for the omsdeploy CLI
//!
//! Human mode prints colored, line-oriented progress; JSON mode prints one
//! object per line so runs can be piped into other tools.

use colored::Colorize;
use omsdeploy::azure::VmReference;
use omsdeploy::dispatcher::RunSummary;
use omsdeploy::provisioner::{ProvisioningOutcome, UnitReport};
use serde_json::json;
use std::time::{Duration, Instant};

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        colored::control::set_override(use_color);

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.json_mode {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print one VM of a listing
    pub fn vm_line(&self, vm: &VmReference) {
        if self.json_mode {
            let line = json!({
                "type": "vm",
                "resource_group": vm.resource_group,
                "name": vm.name,
                "os": vm.os_family,
                "power_state": vm.power_state.to_string(),
                "location": vm.location,
            });
            println!("{}", line);
            return;
        }

        let state = vm.power_state.to_string();
        let state = if !self.use_color {
            state
        } else if vm.power_state.is_running() {
            state.green().to_string()
        } else {
            state.yellow().to_string()
        };
        println!(
            "{:<40} {:<8} {:<14} {}",
            vm.to_string(),
            vm.os_family.to_string(),
            state,
            vm.location
        );
    }

    /// Print the result of one provisioning unit
    pub fn unit_result(&self, report: &UnitReport) {
        if self.json_mode {
            let mut line = json!({
                "type": "result",
                "resource_group": report.vm.resource_group,
                "vm": report.vm.name,
                "os": report.vm.os_family,
                "extension": report.extension,
                "elapsed_ms": report.elapsed.as_millis() as u64,
                "warnings": report.warnings,
            });
            if let (Some(obj), Ok(serde_json::Value::Object(outcome))) =
                (line.as_object_mut(), serde_json::to_value(&report.outcome))
            {
                obj.extend(outcome);
            }
            println!("{}", line);
            return;
        }

        let status = report.outcome.label();
        let status = if self.use_color {
            match report.outcome {
                ProvisioningOutcome::Installed => status.yellow().to_string(),
                ProvisioningOutcome::AlreadyPresent => status.green().to_string(),
                ProvisioningOutcome::SkippedNotRunning | ProvisioningOutcome::WouldInstall => {
                    status.cyan().to_string()
                }
                ProvisioningOutcome::Failed(_) => status.red().bold().to_string(),
            }
        } else {
            status.to_string()
        };

        let vm = if self.use_color {
            report.vm.to_string().bright_white().bold().to_string()
        } else {
            report.vm.to_string()
        };

        print!("{}: [{}] {}", status, vm, report.extension);
        if let ProvisioningOutcome::Failed(reason) = &report.outcome {
            print!(" => {}", reason);
        }
        if self.verbosity >= 1 {
            print!(" ({})", format_duration(report.elapsed));
        }
        println!();

        for warning in &report.warnings {
            self.warning(&format!("{}: {}", report.vm, warning));
        }
    }

    /// Print a target that could not be resolved
    pub fn issue(&self, message: &str) {
        if self.json_mode {
            let line = json!({
                "type": "issue",
                "message": message,
            });
            println!("{}", line);
            return;
        }

        if self.use_color {
            println!("{}: {}", "unresolved".red().bold(), message);
        } else {
            println!("unresolved: {}", message);
        }
    }

    /// Print a recap summary
    pub fn recap(&self, summary: &RunSummary) {
        if self.json_mode {
            let mut line = json!({ "type": "summary" });
            if let (Some(obj), Ok(serde_json::Value::Object(counts))) =
                (line.as_object_mut(), serde_json::to_value(summary))
            {
                obj.extend(counts);
            }
            println!("{}", line);
            return;
        }

        let header = "RECAP";
        let stars = "*".repeat(80 - header.len());
        if self.use_color {
            println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", header, stars);
        }

        let counts = [
            ("installed", summary.installed, colored::Color::Yellow),
            ("present", summary.already_present, colored::Color::Green),
            ("skipped", summary.skipped, colored::Color::Cyan),
            ("would_install", summary.would_install, colored::Color::Cyan),
            ("failed", summary.failed, colored::Color::Red),
            ("unresolved", summary.unresolved, colored::Color::Red),
        ];
        let mut line = format!("{:<12} : ", format!("{} VM(s)", summary.total));
        for (label, value, color) in counts {
            let stat = format!("{}={:<4}", label, value);
            if !self.use_color {
                line.push_str(&stat);
            } else if value > 0 {
                line.push_str(&format!("{}={:<4}", label.color(color), value));
            } else {
                line.push_str(&stat.dimmed().to_string());
            }
            line.push(' ');
        }
        println!("{}", line.trim_end());

        let duration_str = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!("\n{} {}", "Run took".bright_black(), duration_str.bright_white());
            if summary.has_failures() {
                println!("{}", "Rollout finished with failures.".red().bold());
            } else {
                println!("{}", "Rollout completed successfully.".green().bold());
            }
        } else {
            println!("\nRun took {}", duration_str);
            if summary.has_failures() {
                println!("Rollout finished with failures.");
            } else {
                println!("Rollout completed successfully.");
            }
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            eprintln!("{}", json!({ "type": "error", "message": message }));
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            eprintln!("{}", json!({ "type": "warning", "message": message }));
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }
}

/// Format a duration for display
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        format!("{}h {}m {}s", hours, mins, secs)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }
}
