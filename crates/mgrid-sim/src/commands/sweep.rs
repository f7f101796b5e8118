use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use mgrid_engine::{run_sweep, Simulator};
use serde_yaml::from_str;

use crate::plan::{AnalyticSimulator, SweepPlan};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// YAML plan describing the grid, simulator, and sweep options.
    #[arg(long)]
    pub plan: PathBuf,
    /// Output directory, overriding the plan.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Worker count, overriding the plan.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Resume prior output of the same prefix.
    #[arg(long)]
    pub restart: bool,
    /// Discard prior output of the same prefix.
    #[arg(long)]
    pub overwrite: bool,
}

pub fn run(args: &SweepArgs) -> Result<(), Box<dyn Error>> {
    let plan_text = fs::read_to_string(&args.plan)?;
    let mut plan: SweepPlan = from_str(&plan_text)?;
    if let Some(out) = &args.out {
        plan.sweep.output.directory = out.clone();
    }
    if let Some(workers) = args.workers {
        plan.sweep.workers = workers;
    }
    plan.sweep.restart |= args.restart;
    plan.sweep.overwrite |= args.overwrite;

    let space = plan.space()?;
    let simulator: Arc<dyn Simulator> =
        Arc::new(AnalyticSimulator::new(plan.simulator.clone())?);
    let summary = run_sweep(&space, &plan.sweep, |_| Arc::clone(&simulator))?;

    let rendered = serde_json::to_string_pretty(&summary)?;
    let summary_path = plan
        .sweep
        .output
        .directory
        .join(format!("{}.summary.json", plan.sweep.output.prefix));
    fs::write(&summary_path, &rendered)?;
    println!("{rendered}");
    if summary.is_complete() {
        println!(
            "sweep complete: {} points ({} new, {} failed, {} timed out)",
            summary.grid_size, summary.attempted, summary.failed, summary.timed_out
        );
    } else {
        println!(
            "sweep incomplete: {} of {} points have results",
            summary.done_before + summary.attempted,
            summary.grid_size
        );
    }
    Ok(())
}
