//! `teardown run`: build a plan, dispose it, report what ran and what failed.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use teardown_core::{plan, Plan, PlanReport};

/// Arguments for `teardown run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan YAML file.
    pub plan: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit with an error when any teardown step failed.
    #[arg(long)]
    pub strict: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let plan = Plan::load_at(&self.plan)
            .with_context(|| format!("failed to load plan '{}'", self.plan.display()))?;
        let report = plan::execute(&plan)
            .with_context(|| format!("failed to execute plan '{}'", self.plan.display()))?;

        if self.json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }

        if self.strict && report.has_failures() {
            bail!("{} teardown step(s) failed", failure_count(&report));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct RunReportJson<'a> {
    plan_failed: bool,
    #[serde(flatten)]
    report: &'a PlanReport,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    order: usize,
    #[tabled(rename = "teardown")]
    name: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "phase")]
    phase: &'static str,
    #[tabled(rename = "error")]
    error: String,
}

fn failure_count(report: &PlanReport) -> usize {
    report.predispose_errors.len() + report.errors.len() + report.late_errors.len()
}

fn print_json(report: &PlanReport) -> Result<()> {
    let payload = RunReportJson {
        plan_failed: report.has_failures(),
        report,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

fn print_report(report: &PlanReport) {
    println!(
        "Teardown v{} | {} executed | {} failed",
        env!("CARGO_PKG_VERSION"),
        report.executed.len(),
        failure_count(report),
    );

    if report.executed.is_empty() {
        println!("Nothing ran.");
    } else {
        let rows: Vec<StepRow> = report
            .executed
            .iter()
            .enumerate()
            .map(|(i, name)| StepRow {
                order: i + 1,
                name: display_name(name),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let failures: Vec<FailureRow> = [
        ("predispose", &report.predispose_errors),
        ("dispose", &report.errors),
        ("late add", &report.late_errors),
    ]
    .into_iter()
    .flat_map(|(phase, errors)| {
        errors.iter().map(move |error| FailureRow {
            phase,
            error: error.clone(),
        })
    })
    .collect();

    if failures.is_empty() {
        println!("{} all teardowns succeeded", "✓".green());
    } else {
        let mut table = Table::new(failures);
        table.with(Style::rounded());
        println!("{table}");
    }

    match report.second_dispose_noop {
        Some(true) => println!("{} second dispose was a no-op", "✓".green()),
        Some(false) => println!("{} second dispose had side effects", "✗".red()),
        None => {}
    }
}

fn display_name(name: &str) -> String {
    if name.is_empty() {
        "(unnamed)".to_string()
    } else {
        name.to_string()
    }
}
