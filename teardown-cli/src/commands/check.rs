//! `teardown check`: validate a plan and print its tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use teardown_core::{Plan, PlanNode};

/// Arguments for `teardown check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the plan YAML file.
    pub plan: PathBuf,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let plan = Plan::load_at(&self.plan)
            .with_context(|| format!("invalid plan '{}'", self.plan.display()))?;

        println!("{} {}", "✓".green(), self.plan.display());
        for (depth, node) in plan.walk() {
            println!("{}{}", "  ".repeat(depth), outline(node));
        }
        if !plan.late.is_empty() {
            println!("late:");
            for node in &plan.late {
                println!("  {}", outline(node));
            }
        }
        Ok(())
    }
}

fn outline(node: &PlanNode) -> String {
    let name = if node.name.is_empty() {
        "(unnamed)"
    } else {
        node.name.as_str()
    };
    let mut line = format!("{name} [{}]", node.kind);
    if let Some(msg) = &node.fail {
        line.push_str(&format!(" fails: {msg}"));
    }
    for (set, flag) in [
        (node.detach, "detach"),
        (node.predispose, "predispose"),
        (!node.primary, "no-primary"),
    ] {
        if set {
            line.push_str(&format!(" +{flag}"));
        }
    }
    line
}
