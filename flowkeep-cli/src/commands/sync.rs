//! `flowkeep sync`: run one sweep now.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use flowkeep_core::InstanceName;
use flowkeep_sync::{
    pipeline, ArchiveResult, InstanceOutcome, PushFailure, PushOutcome, SweepOptions,
    SweepReport, WriteResult,
};

use super::load_config;

/// Arguments for `flowkeep sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync only this instance.
    #[arg(long, short = 'i')]
    pub instance: Option<String>,

    /// Show what would change without writing files, state or commits.
    #[arg(long)]
    pub dry_run: bool,

    /// Commit locally but do not push.
    #[arg(long)]
    pub no_push: bool,
}

impl SyncArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let options = SweepOptions {
            dry_run: self.dry_run,
            skip_push: self.no_push,
            only: self.instance.as_deref().map(InstanceName::from),
        };

        let report = pipeline::run(&config, &options).context("sync failed")?;
        print_report(&report);

        let failed = report.failed().count();
        if failed > 0 {
            bail!("{failed} instance(s) failed to sync");
        }
        Ok(())
    }
}

fn print_report(report: &SweepReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    for instance in &report.instances {
        let name = &instance.instance;
        match &instance.outcome {
            InstanceOutcome::Failed { error } => {
                println!("{prefix}{} '{name}' failed: {error}", "✗".red());
            }
            InstanceOutcome::Synced {
                writes,
                archivals,
                skipped,
                ..
            } => {
                if writes.is_empty() && archivals.is_empty() && *skipped == 0 {
                    println!("{prefix}✓ '{name}' — nothing to do");
                    continue;
                }
                println!(
                    "{prefix}✓ '{name}' synced ({} written, {} archived, {} skipped)",
                    writes.len(),
                    archivals.len(),
                    skipped
                );
                for write in writes {
                    match write {
                        WriteResult::Written { path } => println!("  ✎  {}", path.display()),
                        WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
                    }
                }
                for archival in archivals {
                    let marker = match archival {
                        ArchiveResult::Archived { .. } => "→",
                        ArchiveResult::AlreadyAbsent { .. } => "·",
                        ArchiveResult::WouldArchive { .. } => "~",
                    };
                    println!(
                        "  {marker}  {} -> {}",
                        archival.from().display(),
                        archival.to().display()
                    );
                }
            }
        }
    }

    if let Some(message) = &report.commit {
        println!("{} {message}", "committed:".bold());
    } else if !report.dry_run {
        println!("nothing to commit");
    }

    match &report.push {
        None => {}
        Some(PushOutcome::Pushed) => println!("{}", "pushed".green()),
        Some(PushOutcome::NoRemote) => println!("{}", "no remote; commits stay local".yellow()),
        Some(PushOutcome::Rejected {
            kind: PushFailure::Access,
            message,
        }) => println!(
            "{} check remote_url and write credentials; local commits are kept\n  {message}",
            "push rejected:".red()
        ),
        Some(PushOutcome::Rejected {
            kind: PushFailure::Unexpected,
            message,
        }) => println!("{} {message}", "push failed:".red()),
    }
}
