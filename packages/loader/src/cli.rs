//! Command-line interface for the loader.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::loader::JobSchedulingDataLoader;
use crate::model::{BundleRegistry, CalendarBundle};
use crate::scheduler::{MemoryScheduler, SchedulerCalendars, SchedulerCall};

/// Jobsched Loader - Load job scheduling data documents.
#[derive(Parser)]
#[command(name = "jobsched-loader")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Extra directory searched for documents and grammars (repeatable)
    #[arg(short, long = "resource-root", global = true)]
    pub resource_roots: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a document.
    Check {
        /// Document name or path
        file: String,

        /// Skip grammar validation
        #[arg(long)]
        no_validate: bool,

        /// Validate against the DOCTYPE instead of the XML Schema
        #[arg(long)]
        no_schema: bool,

        /// Print the parsed calendars and jobs as YAML
        #[arg(long)]
        dump: bool,
    },

    /// Show what scheduling a document would do.
    Plan {
        /// Document name or path
        file: String,

        /// Document describing jobs that already exist
        #[arg(short, long)]
        existing: Option<String>,

        /// Replace existing jobs (default: the document's setting)
        #[arg(short, long)]
        overwrite: Option<bool>,
    },
}

#[derive(Serialize)]
struct Dump<'a> {
    calendars: &'a [CalendarBundle],
    jobs: &'a BundleRegistry,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LoaderConfig::from_env()?;
    for root in cli.resource_roots {
        config = config.with_resource_root(root);
    }

    match cli.command {
        Commands::Check {
            file,
            no_validate,
            no_schema,
            dump,
        } => check_command(
            config.with_validation(!no_validate, !no_schema),
            &file,
            dump,
        ),
        Commands::Plan {
            file,
            existing,
            overwrite,
        } => plan_command(config, &file, existing.as_deref(), overwrite),
    }
}

/// Execute the check command.
fn check_command(config: LoaderConfig, file: &str, dump: bool) -> Result<()> {
    let mut loader = JobSchedulingDataLoader::new(config);
    let mut calendars: Vec<CalendarBundle> = Vec::new();
    loader.process_file(file, &mut calendars)?;

    if dump {
        let yaml = serde_yaml_ng::to_string(&Dump {
            calendars: &calendars,
            jobs: loader.bundles(),
        })?;
        print!("{yaml}");
        return Ok(());
    }

    let triggers: usize = loader.bundles().bundles().map(|b| b.triggers.len()).sum();
    println!("{} {}", style("Checked").bold(), style(file).cyan());
    println!("  Calendars: {}", calendars.len());
    println!("  Jobs: {}", loader.bundles().len());
    println!("  Triggers: {triggers}");
    println!(
        "  Overwrite existing jobs: {}",
        style(loader.overwrite_existing_jobs()).green()
    );

    Ok(())
}

/// Execute the plan command.
fn plan_command(
    config: LoaderConfig,
    file: &str,
    existing: Option<&str>,
    overwrite: Option<bool>,
) -> Result<()> {
    let mut scheduler = MemoryScheduler::new();

    if let Some(existing) = existing {
        let mut seed = JobSchedulingDataLoader::new(config.clone());
        seed.set_overwrite_existing_jobs(true);
        seed.process_file_and_schedule_jobs(existing, &mut scheduler)?;
        scheduler.clear_history();
    }

    let mut loader = JobSchedulingDataLoader::new(config);
    loader.process_file(file, &mut SchedulerCalendars::new(&mut scheduler))?;
    if let Some(overwrite) = overwrite {
        loader.set_overwrite_existing_jobs(overwrite);
    }
    let report = loader.schedule_jobs(&mut scheduler)?;

    println!("{} {}", style("Plan for").bold(), style(file).cyan());
    println!();
    for call in scheduler.history() {
        println!("  {}", describe(call));
    }
    if scheduler.history().is_empty() {
        println!("  {}", style("nothing to do").dim());
    }

    println!();
    println!(
        "{} {} scheduled, {} skipped",
        style("Jobs:").green().bold(),
        report.scheduled.len(),
        report.skipped.len()
    );
    for key in &report.skipped {
        println!("  {} {}", style("skipped").yellow(), key);
    }

    Ok(())
}

fn describe(call: &SchedulerCall) -> String {
    match call {
        SchedulerCall::AddJob { job, .. } => format!("{} {job}", style("add job").green()),
        SchedulerCall::ScheduleJob { trigger } => {
            format!("{} {trigger}", style("schedule trigger").green())
        }
        SchedulerCall::RescheduleJob { trigger } => {
            format!("{} {trigger}", style("reschedule trigger").yellow())
        }
        SchedulerCall::AddCalendar { name, replace } => {
            let verb = if *replace { "replace calendar" } else { "add calendar" };
            format!("{} {name}", style(verb).green())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::parse_from(["jobsched-loader", "check", "jobs.xml", "--no-schema"]);

        let Commands::Check {
            file,
            no_validate,
            no_schema,
            dump,
        } = cli.command
        else {
            panic!("expected check command");
        };
        assert_eq!(file, "jobs.xml");
        assert!(!no_validate);
        assert!(no_schema);
        assert!(!dump);
    }

    #[test]
    fn test_cli_parse_plan_with_overwrite() {
        let cli = Cli::parse_from([
            "jobsched-loader",
            "plan",
            "jobs.xml",
            "--overwrite",
            "false",
            "--resource-root",
            "/etc/jobs",
        ]);

        let Commands::Plan {
            file,
            existing,
            overwrite,
        } = cli.command
        else {
            panic!("expected plan command");
        };
        assert_eq!(file, "jobs.xml");
        assert!(existing.is_none());
        assert_eq!(overwrite, Some(false));
        assert_eq!(cli.resource_roots, vec![PathBuf::from("/etc/jobs")]);
    }

    #[test]
    fn test_describe_calls() {
        let call = SchedulerCall::AddCalendar {
            name: "holidays".to_string(),
            replace: false,
        };
        assert!(describe(&call).contains("holidays"));
    }
}
